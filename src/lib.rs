pub mod display_types;
pub mod engine;
pub mod engine_config;
pub mod error;
pub mod geometry_utils;
pub mod registry;
pub mod sinks;
pub mod systems;
#[cfg(feature = "tether")]
pub mod tether_interface;
pub mod tracking;

pub type Point2D = (f32, f32);
