use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::Point2D;

use super::area::{Area, CrossDirection};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TestMethod {
    /// Straight line from the oldest to the newest trace point
    #[default]
    EndPoints,
    /// Every step of the polyline through all trace points
    AllPoints,
}

/// (source_id, tracking_id)
pub type TraceKey = (u32, u64);

#[derive(Debug)]
struct Trace {
    points: VecDeque<Point2D>,
    last_seen: u64,
}

/// Bounded per-object trajectories for a Cross trigger. Buffers of
/// discarded traces go back to a pool and are reused.
#[derive(Debug)]
pub struct TraceBuffers {
    max_points: usize,
    traces: HashMap<TraceKey, Trace>,
    pool: Vec<VecDeque<Point2D>>,
}

impl TraceBuffers {
    pub fn new(max_points: usize) -> Self {
        TraceBuffers {
            max_points: max_points.max(1),
            traces: HashMap::new(),
            pool: Vec::new(),
        }
    }

    /// Append a sample, evicting the oldest when full. Returns the trace length.
    pub fn record(&mut self, key: TraceKey, point: Point2D, frame_number: u64) -> usize {
        let TraceBuffers {
            max_points,
            traces,
            pool,
        } = self;
        let trace = traces.entry(key).or_insert_with(|| Trace {
            points: pool
                .pop()
                .unwrap_or_else(|| VecDeque::with_capacity(*max_points)),
            last_seen: frame_number,
        });
        if trace.points.len() == *max_points {
            trace.points.pop_front();
        }
        trace.points.push_back(point);
        trace.last_seen = frame_number;
        trace.points.len()
    }

    pub fn points(&self, key: &TraceKey) -> Option<&VecDeque<Point2D>> {
        self.traces.get(key).map(|t| &t.points)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TraceKey, &VecDeque<Point2D>)> {
        self.traces.iter().map(|(k, t)| (k, &t.points))
    }

    pub fn discard(&mut self, key: &TraceKey) {
        if let Some(mut trace) = self.traces.remove(key) {
            trace.points.clear();
            self.pool.push(trace.points);
        }
    }

    /// Drop traces of `source_id` not updated for more than `max_idle` frames
    pub fn evict_idle(&mut self, source_id: u32, frame_number: u64, max_idle: u64) -> usize {
        let stale: Vec<TraceKey> = self
            .traces
            .iter()
            .filter(|((source, _), t)| {
                *source == source_id && frame_number.saturating_sub(t.last_seen) > max_idle
            })
            .map(|(k, _)| *k)
            .collect();
        for key in stale.iter() {
            self.discard(key);
        }
        stale.len()
    }

    pub fn clear(&mut self) {
        let keys: Vec<TraceKey> = self.traces.keys().copied().collect();
        for key in keys.iter() {
            self.discard(key);
        }
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }
}

/// Crossings of `area` by the trajectory `points`, oldest first. Samples
/// lying exactly on a line area are skipped, so a step onto the line is
/// resolved by the next step that leaves it.
pub fn crossings(points: &VecDeque<Point2D>, area: &Area, method: TestMethod) -> Vec<CrossDirection> {
    let samples: Vec<&Point2D> = points.iter().filter(|p| !area.on_line(p)).collect();
    match method {
        TestMethod::EndPoints => match (samples.first(), samples.last()) {
            (Some(first), Some(last)) if samples.len() >= 2 => {
                area.crossing(first, last).into_iter().collect()
            }
            _ => Vec::new(),
        },
        TestMethod::AllPoints => samples
            .windows(2)
            .filter_map(|pair| area.crossing(pair[0], pair[1]))
            .collect(),
    }
}
