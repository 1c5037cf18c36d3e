use std::{
    io::Write,
    sync::{Arc, Mutex},
};

use indexmap::IndexMap;
use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::systems::trigger::Occurrence;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum PrintBody {
    Occurrence(Occurrence),
    #[serde(rename_all = "camelCase")]
    Metrics {
        accumulator_id: String,
        source_id: u32,
        frame_number: u64,
        counters: IndexMap<String, u64>,
    },
}

/// What a Print action hands to its sink
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrintRecord {
    pub action_id: String,
    #[serde(flatten)]
    pub body: PrintBody,
}

impl PrintRecord {
    pub fn occurrence(&self) -> Option<&Occurrence> {
        match &self.body {
            PrintBody::Occurrence(o) => Some(o),
            PrintBody::Metrics { .. } => None,
        }
    }
}

/// Destination for Print actions. Called on the frame-processing thread,
/// so implementations must not block for long.
pub trait RecordSink: Send + Sync {
    fn emit(&self, record: &PrintRecord, force_flush: bool);
}

/// One JSON document per line on stdout
#[derive(Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    fn write_line<W: Write>(out: &mut W, line: &str, force_flush: bool) -> std::io::Result<()> {
        writeln!(out, "{line}")?;
        if force_flush {
            out.flush()?;
        }
        Ok(())
    }
}

impl RecordSink for ConsoleSink {
    fn emit(&self, record: &PrintRecord, force_flush: bool) {
        match serde_json::to_string(record) {
            Ok(line) => {
                let mut stdout = std::io::stdout().lock();
                if let Err(e) = ConsoleSink::write_line(&mut stdout, &line, force_flush) {
                    error!("Failed to print record: {e}");
                }
            }
            Err(e) => error!("Failed to serialise record: {e}"),
        }
    }
}

/// Routes records through the `log` facade instead
#[derive(Default)]
pub struct LogSink;

impl RecordSink for LogSink {
    fn emit(&self, record: &PrintRecord, _force_flush: bool) {
        info!("{:?}", record);
    }
}

/// Keeps every record; handy for embedding and for tests
#[derive(Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<PrintRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    pub fn records(&self) -> Vec<PrintRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    pub fn take(&self) -> Vec<PrintRecord> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *records)
    }
}

impl RecordSink for MemorySink {
    fn emit(&self, record: &PrintRecord, _force_flush: bool) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PrintRecord {
        PrintRecord {
            action_id: String::from("print"),
            body: PrintBody::Occurrence(Occurrence {
                trigger_id: String::from("person-occurrence"),
                source_id: 0,
                frame_number: 12,
                timestamp_ms: 400,
                object_index: Some(1),
                object: None,
                count: None,
                direction: None,
            }),
        }
    }

    #[test]
    fn test_record_json_is_flat() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["actionId"], "print");
        assert_eq!(json["triggerId"], "person-occurrence");
        assert_eq!(json["frameNumber"], 12);
    }

    #[test]
    fn test_memory_sink_take_drains() {
        let sink = MemorySink::new();
        sink.emit(&record(), false);
        sink.emit(&record(), true);
        assert_eq!(sink.records().len(), 2);
        assert_eq!(sink.take().len(), 2);
        assert!(sink.records().is_empty());
    }

    struct UnflushableWriter(Vec<u8>);

    impl Write for UnflushableWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::other("closed"))
        }
    }

    #[test]
    fn test_console_flush_errors_are_reported() {
        let mut out = UnflushableWriter(Vec::new());
        assert!(ConsoleSink::write_line(&mut out, "{}", false).is_ok());
        assert!(ConsoleSink::write_line(&mut out, "{}", true).is_err());
        assert_eq!(out.0, b"{}\n{}\n");
    }
}
