use indexmap::IndexMap;
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::{
    error::{OdeError, Result},
    sinks::RecordSink,
    tracking::{DetectedObject, Frame},
};

use super::{
    accumulator::Accumulator,
    action::{ActionContext, ControlCommand, RenderPlan},
    capture::CaptureWorker,
    trigger::{Phase, Trigger},
};

/// Outcome of one `on_frame` call
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct FrameReport {
    pub source_id: u32,
    pub frame_number: u64,
    /// Occurrences per trigger id, for triggers that fired
    pub occurrences: IndexMap<String, usize>,
    pub skipped_objects: usize,
    pub render: RenderPlan,
    /// False once the handler has been disabled; the caller should stop
    /// running this probe chain
    pub keep_going: bool,
}

impl FrameReport {
    pub fn total_occurrences(&self) -> usize {
        self.occurrences.values().sum()
    }
}

/// Everything a handler needs besides its own trigger list
pub struct FrameServices<'a> {
    pub triggers: &'a mut IndexMap<String, Trigger>,
    pub accumulators: &'a mut IndexMap<String, Accumulator>,
    pub sink: &'a dyn RecordSink,
    pub capture: &'a CaptureWorker,
    pub controls: &'a mut Vec<ControlCommand>,
}

/// Ordered triggers invoked once per frame
#[derive(Debug, Clone)]
pub struct OdeHandler {
    id: String,
    triggers: Vec<String>,
    enabled: bool,
}

impl OdeHandler {
    pub fn new(id: &str) -> Self {
        OdeHandler {
            id: String::from(id),
            triggers: Vec::new(),
            enabled: true,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn triggers(&self) -> &[String] {
        &self.triggers
    }

    pub fn contains(&self, trigger_id: &str) -> bool {
        self.triggers.iter().any(|t| t == trigger_id)
    }

    pub fn add_trigger(&mut self, trigger_id: &str) -> Result<()> {
        if self.contains(trigger_id) {
            return Err(OdeError::InUse {
                kind: "trigger",
                id: String::from(trigger_id),
                owner: self.id.clone(),
            });
        }
        self.triggers.push(String::from(trigger_id));
        Ok(())
    }

    pub fn remove_trigger(&mut self, trigger_id: &str) -> bool {
        let before = self.triggers.len();
        self.triggers.retain(|t| t != trigger_id);
        before != self.triggers.len()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Evaluate one frame: invalid objects are dropped, then every trigger
    /// runs in registration order within each phase, then accumulators of
    /// the triggers that took part publish their totals.
    pub fn process(&self, frame: &Frame, services: FrameServices) -> FrameReport {
        let FrameServices {
            triggers,
            accumulators,
            sink,
            capture,
            controls,
        } = services;

        let mut report = FrameReport {
            source_id: frame.source_id,
            frame_number: frame.frame_number,
            keep_going: self.enabled,
            ..Default::default()
        };
        if !self.enabled {
            return report;
        }

        let objects: Vec<(usize, &DetectedObject)> = frame
            .objects
            .iter()
            .enumerate()
            .filter(|(index, object)| match object.validate(frame.frame_number, *index) {
                Ok(()) => true,
                Err(e) => {
                    error!("Skipping object: {e}");
                    false
                }
            })
            .collect();
        report.skipped_objects = frame.malformed_objects + frame.objects.len() - objects.len();

        let mut render = RenderPlan::default();
        let mut ctx = ActionContext {
            frame,
            render: &mut render,
            sink,
            capture,
            controls,
        };

        for phase in Phase::ALL {
            for trigger_id in self.triggers.iter() {
                let Some(trigger) = triggers.get_mut(trigger_id) else {
                    continue;
                };
                if trigger.phase() != phase {
                    continue;
                }
                let occurrences = trigger.process(&objects, &mut ctx);
                if occurrences.is_empty() {
                    continue;
                }
                if let Some(accumulator) = trigger.accumulator().and_then(|a| accumulators.get_mut(a)) {
                    for occurrence in occurrences.iter() {
                        accumulator.update(occurrence);
                    }
                }
                *report.occurrences.entry(trigger_id.clone()).or_insert(0) += occurrences.len();
            }
        }

        for trigger_id in self.triggers.iter() {
            let Some(trigger) = triggers.get(trigger_id) else {
                continue;
            };
            if !trigger.is_active_for(frame.source_id) {
                continue;
            }
            if let Some(accumulator) = trigger.accumulator().and_then(|a| accumulators.get(a)) {
                accumulator.publish(&mut ctx);
            }
        }

        debug!(
            "Handler \"{}\" frame {}: {} occurrence(s)",
            self.id,
            frame.frame_number,
            report.total_occurrences()
        );
        report.render = render;
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        sinks::MemorySink,
        systems::{
            action::{Action, ActionKind},
            criteria::Criteria,
            trigger::{AlwaysWhen, TriggerKindSpec},
        },
        tracking::BoundingBox,
    };

    fn trigger(id: &str, spec: TriggerKindSpec) -> Trigger {
        Trigger::new(id, &spec, Criteria::default(), |_| None).unwrap()
    }

    #[test]
    fn test_phases_order_evaluation() {
        let print = Arc::new(Action::new("print", ActionKind::Print { force_flush: false }).unwrap());
        let mut triggers = IndexMap::new();
        for (id, spec) in [
            ("post", TriggerKindSpec::Always { when: AlwaysWhen::PostOccurrenceCheck }),
            ("sum", TriggerKindSpec::Summation),
            ("each", TriggerKindSpec::Occurrence),
            ("pre", TriggerKindSpec::Always { when: AlwaysWhen::PreOccurrenceCheck }),
        ] {
            let mut t = trigger(id, spec);
            t.add_action(print.clone()).unwrap();
            triggers.insert(String::from(id), t);
        }
        let mut handler = OdeHandler::new("handler");
        for id in ["post", "sum", "each", "pre"] {
            handler.add_trigger(id).unwrap();
        }
        assert!(handler.add_trigger("pre").is_err());

        let sink = MemorySink::new();
        let capture = CaptureWorker::new();
        let mut accumulators = IndexMap::new();
        let mut controls = Vec::new();
        let mut bad = DetectedObject::new(1, 0.5, BoundingBox::new(0., 0., 10., 10.));
        bad.confidence = f32::NAN;
        let frame = Frame::new(
            0,
            1,
            vec![DetectedObject::new(1, 0.5, BoundingBox::new(0., 0., 10., 10.)), bad],
        );

        let report = handler.process(
            &frame,
            FrameServices {
                triggers: &mut triggers,
                accumulators: &mut accumulators,
                sink: &sink,
                capture: &capture,
                controls: &mut controls,
            },
        );
        assert!(report.keep_going);
        assert_eq!(report.skipped_objects, 1);
        let order: Vec<String> = sink
            .records()
            .iter()
            .filter_map(|r| r.occurrence().map(|o| o.trigger_id.clone()))
            .collect();
        assert_eq!(order, vec!["pre", "each", "post", "sum"]);
    }

    #[test]
    fn test_disabled_handler_does_nothing() {
        let mut triggers = IndexMap::new();
        triggers.insert(String::from("pre"), trigger("pre", TriggerKindSpec::Always { when: AlwaysWhen::PreOccurrenceCheck }));
        let mut handler = OdeHandler::new("handler");
        handler.add_trigger("pre").unwrap();
        handler.set_enabled(false);

        let sink = MemorySink::new();
        let capture = CaptureWorker::new();
        let mut accumulators = IndexMap::new();
        let mut controls = Vec::new();
        let report = handler.process(
            &Frame::new(0, 1, vec![]),
            FrameServices {
                triggers: &mut triggers,
                accumulators: &mut accumulators,
                sink: &sink,
                capture: &capture,
                controls: &mut controls,
            },
        );
        assert!(!report.keep_going);
        assert_eq!(report.total_occurrences(), 0);
    }
}
