pub mod accumulator;
pub mod action;
pub mod area;
pub mod capture;
pub mod criteria;
pub mod handler;
pub mod meter;
pub mod trace;
pub mod trigger;
