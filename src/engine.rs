use std::sync::{Arc, Mutex, MutexGuard};

use log::warn;

use crate::{
    engine_config::EngineConfig,
    error::Result,
    sinks::RecordSink,
    systems::{capture::CaptureListener, criteria::Criteria, handler::FrameReport},
    tracking::Frame,
};

use crate::registry::OdeRegistry;

/// Cloneable handle shared by the frame-delivery thread and any control
/// threads. One lock covers the whole registry, so a control call either
/// lands before a frame starts or after it finishes.
#[derive(Clone)]
pub struct OdeEngine {
    inner: Arc<Mutex<OdeRegistry>>,
}

impl OdeEngine {
    pub fn new(registry: OdeRegistry) -> Self {
        OdeEngine {
            inner: Arc::new(Mutex::new(registry)),
        }
    }

    pub fn from_config(config: &EngineConfig, sink: Arc<dyn RecordSink>) -> Result<Self> {
        Ok(OdeEngine::new(OdeRegistry::from_config(config, sink)?))
    }

    fn lock(&self) -> MutexGuard<'_, OdeRegistry> {
        self.inner.lock().unwrap_or_else(|e| {
            warn!("Engine lock was poisoned by a panicking thread; continuing");
            e.into_inner()
        })
    }

    /// Run several registry operations under a single lock
    pub fn with_registry<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&mut OdeRegistry) -> T,
    {
        f(&mut self.lock())
    }

    pub fn on_frame(&self, handler_id: &str, frame: &Frame) -> Result<FrameReport> {
        self.lock().on_frame(handler_id, frame)
    }

    pub fn trigger_enabled_set(&self, trigger_id: &str, enabled: bool) -> Result<()> {
        self.lock().trigger_enabled_set(trigger_id, enabled)
    }

    pub fn trigger_reset(&self, trigger_id: &str) -> Result<()> {
        self.lock().trigger_reset(trigger_id)
    }

    pub fn trigger_limit_set(&self, trigger_id: &str, limit: Option<u64>) -> Result<()> {
        self.lock().trigger_limit_set(trigger_id, limit)
    }

    pub fn trigger_criteria_set(&self, trigger_id: &str, criteria: Criteria) -> Result<()> {
        self.lock().trigger_criteria_set(trigger_id, criteria)
    }

    pub fn trigger_confidence_min_set(&self, trigger_id: &str, min_confidence: Option<f32>) -> Result<()> {
        self.lock().trigger_confidence_min_set(trigger_id, min_confidence)
    }

    pub fn trigger_dimensions_min_set(&self, trigger_id: &str, min_width: f32, min_height: f32) -> Result<()> {
        self.lock().trigger_dimensions_min_set(trigger_id, min_width, min_height)
    }

    pub fn trigger_dimensions_max_set(&self, trigger_id: &str, max_width: f32, max_height: f32) -> Result<()> {
        self.lock().trigger_dimensions_max_set(trigger_id, max_width, max_height)
    }

    pub fn accumulator_reset(&self, accumulator_id: &str) -> Result<()> {
        self.lock().accumulator_reset(accumulator_id)
    }

    pub fn handler_enabled_set(&self, handler_id: &str, enabled: bool) -> Result<()> {
        self.lock().handler_enabled_set(handler_id, enabled)
    }

    pub fn capture_complete_listener_add(&self, action_id: &str, listener: CaptureListener) -> Result<()> {
        self.lock().capture_complete_listener_add(action_id, listener)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::mpsc, thread};

    use super::*;
    use crate::{
        sinks::MemorySink,
        systems::{action::ActionSpec, trigger::TriggerKindSpec},
        tracking::{BoundingBox, DetectedObject},
    };

    fn engine() -> (OdeEngine, MemorySink) {
        let sink = MemorySink::new();
        let engine = OdeEngine::new(OdeRegistry::new(Arc::new(sink.clone())));
        engine
            .with_registry(|r| -> Result<()> {
                r.trigger_add("people", &TriggerKindSpec::Occurrence, Criteria::default())?;
                r.action_add("print", &ActionSpec::Print { force_flush: false })?;
                r.trigger_action_add("people", "print")?;
                r.handler_add("ode")?;
                r.handler_trigger_add("ode", "people")
            })
            .unwrap();
        (engine, sink)
    }

    fn frame(n: u64) -> Frame {
        Frame::new(0, n, vec![DetectedObject::new(0, 0.9, BoundingBox::new(0., 0., 10., 10.))])
    }

    #[test]
    fn test_control_from_another_thread() {
        let (engine, sink) = engine();
        engine.on_frame("ode", &frame(0)).unwrap();

        let control = engine.clone();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            control.trigger_enabled_set("people", false).unwrap();
            tx.send(()).unwrap();
        });
        rx.recv().unwrap();

        engine.on_frame("ode", &frame(1)).unwrap();
        assert_eq!(sink.records().len(), 1);

        engine.trigger_enabled_set("people", true).unwrap();
        engine.on_frame("ode", &frame(2)).unwrap();
        assert_eq!(sink.records().len(), 2);
    }

    #[test]
    fn test_survives_poisoned_lock() {
        let (engine, sink) = engine();
        let poisoner = engine.clone();
        let _ = thread::spawn(move || {
            poisoner.with_registry(|r| {
                if r.handler("ode").is_some() {
                    panic!("boom");
                }
            });
        })
        .join();
        engine.on_frame("ode", &frame(0)).unwrap();
        assert_eq!(sink.records().len(), 1);
    }
}
