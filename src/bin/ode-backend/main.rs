use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, Result};
use clap::Parser;
use env_logger::Env;
use log::{debug, error, info, warn};

use tether_ode_engine::{
    engine::OdeEngine,
    engine_config::load_config_from_file,
    sinks::{ConsoleSink, RecordSink},
    systems::meter::ThroughputMeter,
    tracking::Frame,
};

mod cli;
use cli::Cli;

#[cfg(feature = "tether")]
fn build_sink(cli: &Cli) -> Result<Arc<dyn RecordSink>> {
    use tether_agent::TetherAgentOptionsBuilder;
    use tether_ode_engine::tether_interface::TetherSink;

    if !cli.tether_enable {
        return Ok(Arc::new(ConsoleSink));
    }
    let tether_agent = TetherAgentOptionsBuilder::new(&cli.agent_role)
        .id(Some(&cli.agent_group))
        .host(Some(&cli.tether_host.to_string()))
        .build()?;
    info!("Publishing records via Tether");
    Ok(Arc::new(TetherSink::new(tether_agent)?))
}

#[cfg(not(feature = "tether"))]
fn build_sink(_cli: &Cli) -> Result<Arc<dyn RecordSink>> {
    Ok(Arc::new(ConsoleSink))
}

fn open_frames(path: &str) -> Result<Box<dyn BufRead>> {
    if path == "-" {
        info!("Reading frames from stdin");
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        let file = File::open(path).map_err(|e| anyhow!("Failed to open frames file {}: {}", path, e))?;
        info!("Reading frames from \"{}\"", path);
        Ok(Box::new(BufReader::new(file)))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger from the environment

    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level))
        .filter_module("paho_mqtt", log::LevelFilter::Warn)
        .filter_module("tether_agent", log::LevelFilter::Warn)
        .init();

    debug!("Started; args: {:?}", cli);

    let config = load_config_from_file(&cli.config_path)?;
    let handler_id = match (&cli.handler, config.handlers.first()) {
        (Some(h), _) => h.clone(),
        (None, Some(h)) => h.id.clone(),
        (None, None) => return Err(anyhow!("No probe handler configured in {}", cli.config_path)),
    };

    let engine = OdeEngine::from_config(&config, build_sink(&cli)?)?;

    let mut meter = ThroughputMeter::new(
        Duration::from_millis(cli.meter_interval),
        Box::new(|session: &[f64], interval: &[f64]| {
            for (source, (s, i)) in session.iter().zip(interval.iter()).enumerate() {
                info!("Source #{}: {:.2} fps (session {:.2} fps)", source, i, s);
            }
            true
        }),
    );
    meter.set_enabled(!cli.meter_disable);

    let mut frame_count = 0;
    for (line_number, line) in open_frames(&cli.frames_path)?.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: Frame = match serde_json::from_str(&line) {
            Ok(f) => f,
            Err(e) => {
                error!("Skipping line {}: not a valid frame: {}", line_number + 1, e);
                continue;
            }
        };
        meter.record_frame(&frame);

        let report = engine.on_frame(&handler_id, &frame)?;
        frame_count += 1;
        if cli.render_print && !report.render.is_empty() {
            println!("{}", serde_json::to_string(&report.render)?);
        }
        if !report.keep_going {
            warn!(
                "Handler \"{}\" disabled at frame {}; stopping",
                handler_id, report.frame_number
            );
            break;
        }
    }

    info!("Processed {} frames", frame_count);
    Ok(())
}
