use std::sync::Mutex;

use anyhow::Result;
use log::{debug, error};
use tether_agent::{ChannelDefinition, ChannelOptionsBuilder, TetherAgent};

use crate::sinks::{PrintBody, PrintRecord, RecordSink};

pub struct Outputs {
    pub occurrences_output: ChannelDefinition,
    pub metrics_output: ChannelDefinition,
}

impl Outputs {
    pub fn new(tether_agent: &mut TetherAgent) -> Result<Outputs> {
        let occurrences_output = ChannelOptionsBuilder::create_sender("occurrences")
            .qos(Some(0))
            .build(tether_agent)?;
        // Accumulator totals are published every frame, so a late subscriber
        // only needs the last one
        let metrics_output = ChannelOptionsBuilder::create_sender("accumulatorMetrics")
            .qos(Some(0))
            .retain(Some(true))
            .build(tether_agent)?;

        Ok(Outputs {
            occurrences_output,
            metrics_output,
        })
    }
}

/// Publishes Print action records as MessagePack over Tether
pub struct TetherSink {
    inner: Mutex<(TetherAgent, Outputs)>,
}

impl TetherSink {
    pub fn new(mut tether_agent: TetherAgent) -> Result<Self> {
        let outputs = Outputs::new(&mut tether_agent)?;
        Ok(TetherSink {
            inner: Mutex::new((tether_agent, outputs)),
        })
    }
}

impl RecordSink for TetherSink {
    fn emit(&self, record: &PrintRecord, _force_flush: bool) {
        let payload = match rmp_serde::to_vec_named(record) {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to serialize record from \"{}\": {}", record.action_id, e);
                return;
            }
        };
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let (tether_agent, outputs) = &*guard;
        let channel = match record.body {
            PrintBody::Occurrence(_) => &outputs.occurrences_output,
            PrintBody::Metrics { .. } => &outputs.metrics_output,
        };
        match tether_agent.send(channel, Some(&payload)) {
            Ok(_) => debug!("Published record from \"{}\"", record.action_id),
            Err(e) => error!("Failed to publish record from \"{}\": {}", record.action_id, e),
        }
    }
}
