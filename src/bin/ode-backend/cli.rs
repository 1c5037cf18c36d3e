#[cfg(feature = "tether")]
use std::net::{IpAddr, Ipv4Addr};

use clap::{command, Parser};

// Some defaults; some of which can be overriden via CLI args
const CONFIG_FILE_PATH: &str = "./ode.json";
#[cfg(feature = "tether")]
const TETHER_HOST: std::net::IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Where to load the engine config (display types, areas, triggers, actions...)
    #[arg(long = "config", default_value_t=String::from(CONFIG_FILE_PATH))]
    pub config_path: String,

    /// Frames to evaluate, one JSON document per line; "-" reads stdin
    #[arg(long = "frames", default_value_t=String::from("-"))]
    pub frames_path: String,

    /// Which probe handler receives the frames; defaults to the first one configured
    #[arg(long = "handler")]
    pub handler: Option<String>,

    /// Print the render plan for every frame that has something to draw
    #[arg(long = "render.print")]
    pub render_print: bool,

    /// How often to report frames-per-second, in milliseconds
    #[arg(long = "meter.intervalMs", default_value_t = 5000)]
    pub meter_interval: u64,

    /// Flag to disable the throughput meter
    #[arg(long = "meter.disable")]
    pub meter_disable: bool,

    /// Publish Print records over Tether instead of printing them
    #[cfg(feature = "tether")]
    #[arg(long = "tether.enable")]
    pub tether_enable: bool,

    /// The IP address of the MQTT broker (server)
    #[cfg(feature = "tether")]
    #[arg(long = "tether.host", default_value_t=TETHER_HOST)]
    pub tether_host: std::net::IpAddr,

    /// The Agent Role (type)
    #[cfg(feature = "tether")]
    #[arg(long="tether.role",default_value_t=String::from("odeEngine"))]
    pub agent_role: String,

    /// The Agent Group (ID)
    #[cfg(feature = "tether")]
    #[arg(long="tether.group",default_value_t=String::from("any"))]
    pub agent_group: String,

    #[arg(long = "loglevel",default_value_t=String::from("info"))]
    pub log_level: String,
}
