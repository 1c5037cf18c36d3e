use std::{collections::BTreeMap, time::Duration};

use log::{debug, info};

use crate::tracking::Frame;

/// Receives (session averages, interval averages) in frames per second,
/// one entry per source ordered by source id. Returning `false` disables the meter.
pub type MeterCallback = Box<dyn FnMut(&[f64], &[f64]) -> bool + Send>;

#[derive(Debug, Default, Clone, Copy)]
struct SourceCounts {
    session_frames: u64,
    interval_frames: u64,
}

/// Frames-per-second reporter driven by frame timestamps
pub struct ThroughputMeter {
    interval: Duration,
    enabled: bool,
    sources: BTreeMap<u32, SourceCounts>,
    session_start: Option<Duration>,
    interval_start: Option<Duration>,
    callback: MeterCallback,
}

impl ThroughputMeter {
    pub fn new(interval: Duration, callback: MeterCallback) -> Self {
        ThroughputMeter {
            interval,
            enabled: true,
            sources: BTreeMap::new(),
            session_start: None,
            interval_start: None,
            callback,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Re-enabling starts a fresh session
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            self.restart_session();
        }
        self.enabled = enabled;
    }

    pub fn restart_session(&mut self) {
        info!("Throughput meter session restarted");
        self.sources.clear();
        self.session_start = None;
        self.interval_start = None;
    }

    /// Count a frame; report when a full interval has elapsed since the last report
    pub fn record_frame(&mut self, frame: &Frame) {
        if !self.enabled {
            return;
        }
        let now = frame.timestamp();
        let session_start = *self.session_start.get_or_insert(now);
        let interval_start = *self.interval_start.get_or_insert(now);

        let counts = self.sources.entry(frame.source_id).or_default();
        counts.session_frames += 1;
        counts.interval_frames += 1;

        let interval_elapsed = now.saturating_sub(interval_start);
        if interval_elapsed < self.interval || interval_elapsed.is_zero() {
            return;
        }
        let session_elapsed = now.saturating_sub(session_start).as_secs_f64();
        let interval_secs = interval_elapsed.as_secs_f64();

        let session_avgs: Vec<f64> = self
            .sources
            .values()
            .map(|c| per_second(c.session_frames, session_elapsed))
            .collect();
        let interval_avgs: Vec<f64> = self
            .sources
            .values()
            .map(|c| per_second(c.interval_frames, interval_secs))
            .collect();
        debug!("Throughput session {:?} interval {:?}", session_avgs, interval_avgs);

        for counts in self.sources.values_mut() {
            counts.interval_frames = 0;
        }
        self.interval_start = Some(now);

        if !(self.callback)(&session_avgs, &interval_avgs) {
            info!("Throughput meter callback asked to stop; disabling");
            self.enabled = false;
        }
    }
}

fn per_second(frames: u64, seconds: f64) -> f64 {
    if seconds > 0. {
        frames as f64 / seconds
    } else {
        0.
    }
}
