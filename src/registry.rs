use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::{
    display_types::{DisplayType, DisplayTypeSpec},
    engine_config::EngineConfig,
    error::{OdeError, Result},
    sinks::{ConsoleSink, RecordSink},
    systems::{
        accumulator::Accumulator,
        action::{Action, ActionSpec, ControlCommand},
        area::{Area, AreaSpec},
        capture::{CaptureListener, CaptureWorker},
        criteria::Criteria,
        handler::{FrameReport, FrameServices, OdeHandler},
        trigger::{Trigger, TriggerKindSpec},
    },
    tracking::Frame,
};

/// Owns every named engine object. Ids are unique per kind, and references
/// are resolved when one object is attached to another; a failed call
/// leaves the registry as it was.
pub struct OdeRegistry {
    display_types: IndexMap<String, DisplayType>,
    areas: IndexMap<String, Arc<Area>>,
    actions: IndexMap<String, Arc<Action>>,
    triggers: IndexMap<String, Trigger>,
    accumulators: IndexMap<String, Accumulator>,
    handlers: IndexMap<String, OdeHandler>,
    sink: Arc<dyn RecordSink>,
    capture: CaptureWorker,
}

fn ensure_new<T>(map: &IndexMap<String, T>, kind: &'static str, id: &str) -> Result<()> {
    if map.contains_key(id) {
        Err(OdeError::duplicate(kind, id))
    } else {
        Ok(())
    }
}

impl OdeRegistry {
    pub fn new(sink: Arc<dyn RecordSink>) -> Self {
        OdeRegistry {
            display_types: IndexMap::new(),
            areas: IndexMap::new(),
            actions: IndexMap::new(),
            triggers: IndexMap::new(),
            accumulators: IndexMap::new(),
            handlers: IndexMap::new(),
            sink,
            capture: CaptureWorker::new(),
        }
    }

    /// Build every configured object in dependency order
    pub fn from_config(config: &EngineConfig, sink: Arc<dyn RecordSink>) -> Result<Self> {
        let mut registry = OdeRegistry::new(sink);

        for entry in config.display_types.iter() {
            registry.display_type_add(&entry.id, &entry.spec)?;
        }
        for entry in config.areas.iter() {
            registry.area_add(&entry.id, &entry.spec)?;
        }
        for t in config.triggers.iter() {
            registry.trigger_add(&t.id, &t.kind, t.criteria.clone())?;
            let trigger = registry.trigger_mut(&t.id)?;
            trigger.set_limit(t.limit);
            trigger.set_interval(t.interval);
            trigger.set_enabled(t.enabled);
        }
        for entry in config.actions.iter() {
            registry.action_add(&entry.id, &entry.spec)?;
        }
        for t in config.triggers.iter() {
            for area in t.areas.iter() {
                registry.trigger_area_add(&t.id, area)?;
            }
            registry.trigger_action_add_many(&t.id, &t.actions)?;
        }
        for a in config.accumulators.iter() {
            registry.accumulator_add(&a.id)?;
            for action in a.actions.iter() {
                registry.accumulator_action_add(&a.id, action)?;
            }
        }
        for t in config.triggers.iter() {
            if let Some(accumulator) = &t.accumulator {
                registry.trigger_accumulator_add(&t.id, accumulator)?;
            }
        }
        for h in config.handlers.iter() {
            registry.handler_add(&h.id)?;
            registry.handler_trigger_add_many(&h.id, &h.triggers)?;
            registry.handler_enabled_set(&h.id, h.enabled)?;
        }

        info!(
            "Engine built: {} display types, {} areas, {} triggers, {} actions, {} accumulators, {} handlers",
            registry.display_types.len(),
            registry.areas.len(),
            registry.triggers.len(),
            registry.actions.len(),
            registry.accumulators.len(),
            registry.handlers.len()
        );
        Ok(registry)
    }

    // Display types

    pub fn display_type_add(&mut self, id: &str, spec: &DisplayTypeSpec) -> Result<()> {
        ensure_new(&self.display_types, "display type", id)?;
        let resolved = spec.resolve(|t| self.display_types.get(t))?;
        self.display_types.insert(String::from(id), resolved);
        Ok(())
    }

    pub fn display_type(&self, id: &str) -> Option<&DisplayType> {
        self.display_types.get(id)
    }

    // Areas

    pub fn area_add(&mut self, id: &str, spec: &AreaSpec) -> Result<()> {
        ensure_new(&self.areas, "area", id)?;
        let area = Area::from_spec(id, spec, |t| self.display_types.get(t))?;
        self.areas.insert(String::from(id), Arc::new(area));
        Ok(())
    }

    pub fn area_insert(&mut self, area: Area) -> Result<()> {
        ensure_new(&self.areas, "area", area.id())?;
        self.areas.insert(String::from(area.id()), Arc::new(area));
        Ok(())
    }

    pub fn area(&self, id: &str) -> Option<&Arc<Area>> {
        self.areas.get(id)
    }

    // Actions

    pub fn action_add(&mut self, id: &str, spec: &ActionSpec) -> Result<()> {
        ensure_new(&self.actions, "action", id)?;
        let action = Action::from_spec(id, spec, |t| self.display_types.get(t))?;
        self.actions.insert(String::from(id), Arc::new(action));
        Ok(())
    }

    pub fn action_insert(&mut self, action: Action) -> Result<()> {
        ensure_new(&self.actions, "action", action.id())?;
        self.actions.insert(String::from(action.id()), Arc::new(action));
        Ok(())
    }

    pub fn action(&self, id: &str) -> Option<&Arc<Action>> {
        self.actions.get(id)
    }

    fn action_ref(&self, id: &str) -> Result<Arc<Action>> {
        self.actions
            .get(id)
            .cloned()
            .ok_or_else(|| OdeError::unknown("action", id))
    }

    /// Listen for completed captures of a capture action. Listeners run on
    /// the capture worker thread.
    pub fn capture_complete_listener_add(&mut self, action_id: &str, listener: CaptureListener) -> Result<()> {
        let action = self.action_ref(action_id)?;
        if !action.is_capture() {
            return Err(OdeError::invalid(
                "capture listener",
                format!("action \"{action_id}\" does not capture"),
            ));
        }
        self.capture.add_listener(action_id, listener);
        Ok(())
    }

    pub fn capture_complete_listeners_remove(&mut self, action_id: &str) -> Result<usize> {
        self.action_ref(action_id)?;
        Ok(self.capture.remove_listeners(action_id))
    }

    // Triggers

    pub fn trigger_add(&mut self, id: &str, spec: &TriggerKindSpec, criteria: Criteria) -> Result<()> {
        ensure_new(&self.triggers, "trigger", id)?;
        let trigger = Trigger::new(id, spec, criteria, |t| self.display_types.get(t))?;
        debug!("Added {} trigger \"{}\"", trigger.kind_name(), id);
        self.triggers.insert(String::from(id), trigger);
        Ok(())
    }

    pub fn trigger(&self, id: &str) -> Option<&Trigger> {
        self.triggers.get(id)
    }

    fn trigger_mut(&mut self, id: &str) -> Result<&mut Trigger> {
        self.triggers
            .get_mut(id)
            .ok_or_else(|| OdeError::unknown("trigger", id))
    }

    pub fn trigger_action_add(&mut self, trigger_id: &str, action_id: &str) -> Result<()> {
        let action = self.action_ref(action_id)?;
        self.trigger_mut(trigger_id)?.add_action(action)
    }

    /// All or nothing: every action is checked before any is attached
    pub fn trigger_action_add_many<S: AsRef<str>>(&mut self, trigger_id: &str, action_ids: &[S]) -> Result<()> {
        let actions = action_ids
            .iter()
            .map(|a| self.action_ref(a.as_ref()))
            .collect::<Result<Vec<Arc<Action>>>>()?;
        for (i, a) in action_ids.iter().enumerate() {
            if action_ids[..i].iter().any(|b| b.as_ref() == a.as_ref()) {
                return Err(OdeError::duplicate("action", a.as_ref()));
            }
        }
        let trigger = self.trigger_mut(trigger_id)?;
        if let Some(attached) = actions
            .iter()
            .find(|a| trigger.actions().iter().any(|b| b.id() == a.id()))
        {
            return Err(OdeError::InUse {
                kind: "action",
                id: String::from(attached.id()),
                owner: String::from(trigger_id),
            });
        }
        for action in actions {
            trigger.add_action(action)?;
        }
        Ok(())
    }

    pub fn trigger_area_add(&mut self, trigger_id: &str, area_id: &str) -> Result<()> {
        let area = self
            .areas
            .get(area_id)
            .cloned()
            .ok_or_else(|| OdeError::unknown("area", area_id))?;
        self.trigger_mut(trigger_id)?.add_area(area)
    }

    /// An accumulator belongs to at most one trigger
    pub fn trigger_accumulator_add(&mut self, trigger_id: &str, accumulator_id: &str) -> Result<()> {
        if !self.accumulators.contains_key(accumulator_id) {
            return Err(OdeError::unknown("accumulator", accumulator_id));
        }
        if let Some(owner) = self
            .triggers
            .values()
            .find(|t| t.accumulator() == Some(accumulator_id))
        {
            return Err(OdeError::InUse {
                kind: "accumulator",
                id: String::from(accumulator_id),
                owner: String::from(owner.id()),
            });
        }
        let trigger = self.trigger_mut(trigger_id)?;
        if let Some(existing) = trigger.accumulator() {
            return Err(OdeError::InUse {
                kind: "trigger",
                id: String::from(trigger_id),
                owner: String::from(existing),
            });
        }
        trigger.set_accumulator(Some(accumulator_id));
        Ok(())
    }

    pub fn trigger_accumulator_remove(&mut self, trigger_id: &str) -> Result<()> {
        self.trigger_mut(trigger_id)?.set_accumulator(None);
        Ok(())
    }

    pub fn trigger_criteria_set(&mut self, trigger_id: &str, criteria: Criteria) -> Result<()> {
        self.trigger_mut(trigger_id)?.set_criteria(criteria)
    }

    pub fn trigger_confidence_min_set(&mut self, trigger_id: &str, min_confidence: Option<f32>) -> Result<()> {
        self.trigger_mut(trigger_id)?.set_confidence_min(min_confidence)
    }

    pub fn trigger_dimensions_min_set(&mut self, trigger_id: &str, min_width: f32, min_height: f32) -> Result<()> {
        self.trigger_mut(trigger_id)?.set_dimensions_min(min_width, min_height)
    }

    pub fn trigger_dimensions_max_set(&mut self, trigger_id: &str, max_width: f32, max_height: f32) -> Result<()> {
        self.trigger_mut(trigger_id)?.set_dimensions_max(max_width, max_height)
    }

    pub fn trigger_enabled_set(&mut self, trigger_id: &str, enabled: bool) -> Result<()> {
        self.trigger_mut(trigger_id)?.set_enabled(enabled);
        Ok(())
    }

    pub fn trigger_limit_set(&mut self, trigger_id: &str, limit: Option<u64>) -> Result<()> {
        self.trigger_mut(trigger_id)?.set_limit(limit);
        Ok(())
    }

    pub fn trigger_interval_set(&mut self, trigger_id: &str, interval: u32) -> Result<()> {
        self.trigger_mut(trigger_id)?.set_interval(interval);
        Ok(())
    }

    pub fn trigger_reset(&mut self, trigger_id: &str) -> Result<()> {
        self.trigger_mut(trigger_id)?.reset();
        Ok(())
    }

    // Accumulators

    pub fn accumulator_add(&mut self, id: &str) -> Result<()> {
        ensure_new(&self.accumulators, "accumulator", id)?;
        self.accumulators.insert(String::from(id), Accumulator::new(id));
        Ok(())
    }

    pub fn accumulator(&self, id: &str) -> Option<&Accumulator> {
        self.accumulators.get(id)
    }

    pub fn accumulator_action_add(&mut self, accumulator_id: &str, action_id: &str) -> Result<()> {
        let action = self.action_ref(action_id)?;
        self.accumulators
            .get_mut(accumulator_id)
            .ok_or_else(|| OdeError::unknown("accumulator", accumulator_id))?
            .add_action(action)
    }

    pub fn accumulator_reset(&mut self, accumulator_id: &str) -> Result<()> {
        self.accumulators
            .get_mut(accumulator_id)
            .ok_or_else(|| OdeError::unknown("accumulator", accumulator_id))?
            .reset();
        Ok(())
    }

    // Handlers

    pub fn handler_add(&mut self, id: &str) -> Result<()> {
        ensure_new(&self.handlers, "handler", id)?;
        self.handlers.insert(String::from(id), OdeHandler::new(id));
        Ok(())
    }

    pub fn handler(&self, id: &str) -> Option<&OdeHandler> {
        self.handlers.get(id)
    }

    fn handler_mut(&mut self, id: &str) -> Result<&mut OdeHandler> {
        self.handlers
            .get_mut(id)
            .ok_or_else(|| OdeError::unknown("handler", id))
    }

    /// A trigger's state describes one stream of frames, so it may only
    /// belong to one handler
    pub fn handler_trigger_add(&mut self, handler_id: &str, trigger_id: &str) -> Result<()> {
        if !self.triggers.contains_key(trigger_id) {
            return Err(OdeError::unknown("trigger", trigger_id));
        }
        if let Some(owner) = self.handlers.values().find(|h| h.contains(trigger_id)) {
            return Err(OdeError::InUse {
                kind: "trigger",
                id: String::from(trigger_id),
                owner: String::from(owner.id()),
            });
        }
        self.handler_mut(handler_id)?.add_trigger(trigger_id)
    }

    pub fn handler_trigger_add_many<S: AsRef<str>>(&mut self, handler_id: &str, trigger_ids: &[S]) -> Result<()> {
        self.handler_mut(handler_id)?;
        for (i, t) in trigger_ids.iter().enumerate() {
            let t = t.as_ref();
            if !self.triggers.contains_key(t) {
                return Err(OdeError::unknown("trigger", t));
            }
            if trigger_ids[..i].iter().any(|other| other.as_ref() == t) {
                return Err(OdeError::duplicate("trigger", t));
            }
            if let Some(owner) = self.handlers.values().find(|h| h.contains(t)) {
                return Err(OdeError::InUse {
                    kind: "trigger",
                    id: String::from(t),
                    owner: String::from(owner.id()),
                });
            }
        }
        let handler = self.handler_mut(handler_id)?;
        for t in trigger_ids.iter() {
            handler.add_trigger(t.as_ref())?;
        }
        Ok(())
    }

    pub fn handler_trigger_remove(&mut self, handler_id: &str, trigger_id: &str) -> Result<()> {
        if self.handler_mut(handler_id)?.remove_trigger(trigger_id) {
            Ok(())
        } else {
            Err(OdeError::unknown("trigger", trigger_id))
        }
    }

    pub fn handler_enabled_set(&mut self, handler_id: &str, enabled: bool) -> Result<()> {
        self.handler_mut(handler_id)?.set_enabled(enabled);
        Ok(())
    }

    // Frames

    /// Evaluate one frame through a handler. Control commands queued by
    /// actions take effect after the frame, never during it.
    pub fn on_frame(&mut self, handler_id: &str, frame: &Frame) -> Result<FrameReport> {
        let mut controls: Vec<ControlCommand> = Vec::new();
        let handler = self
            .handlers
            .get(handler_id)
            .ok_or_else(|| OdeError::unknown("handler", handler_id))?;
        let mut report = handler.process(
            frame,
            FrameServices {
                triggers: &mut self.triggers,
                accumulators: &mut self.accumulators,
                sink: self.sink.as_ref(),
                capture: &self.capture,
                controls: &mut controls,
            },
        );

        for command in controls.iter() {
            if let Err(e) = self.apply_control(command) {
                warn!("Ignoring control {:?}: {}", command, e);
            }
        }
        report.keep_going = self
            .handlers
            .get(handler_id)
            .map_or(false, |h| h.is_enabled());
        Ok(report)
    }

    pub fn apply_control(&mut self, command: &ControlCommand) -> Result<()> {
        debug!("Applying {:?}", command);
        match command {
            ControlCommand::TriggerEnable { trigger } => self.trigger_enabled_set(trigger, true),
            ControlCommand::TriggerDisable { trigger } => self.trigger_enabled_set(trigger, false),
            ControlCommand::TriggerReset { trigger } => self.trigger_reset(trigger),
            ControlCommand::AccumulatorReset { accumulator } => self.accumulator_reset(accumulator),
            ControlCommand::HandlerDisable { handler } => self.handler_enabled_set(handler, false),
        }
    }
}

impl Default for OdeRegistry {
    fn default() -> Self {
        OdeRegistry::new(Arc::new(ConsoleSink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        display_types::PredefinedColor,
        sinks::MemorySink,
        systems::{area::BboxTestPoint, trigger::AlwaysWhen},
    };

    fn registry() -> (OdeRegistry, MemorySink) {
        let sink = MemorySink::new();
        (OdeRegistry::new(Arc::new(sink.clone())), sink)
    }

    #[test]
    fn test_duplicate_and_unknown_ids() {
        let (mut r, _) = registry();
        r.trigger_add("t", &TriggerKindSpec::Occurrence, Criteria::default()).unwrap();
        let e = r
            .trigger_add("t", &TriggerKindSpec::Summation, Criteria::default())
            .unwrap_err();
        assert!(matches!(e, OdeError::DuplicateId { kind: "trigger", .. }));
        // The original survives
        assert_eq!(r.trigger("t").unwrap().kind_name(), "occurrence");

        assert!(matches!(
            r.trigger_action_add("t", "nope"),
            Err(OdeError::UnknownId { kind: "action", .. })
        ));
        assert!(r.trigger_area_add("t", "nope").is_err());
        assert!(r.handler_trigger_add("nope", "t").is_err());
    }

    #[test]
    fn test_add_many_is_all_or_nothing() {
        let (mut r, _) = registry();
        r.trigger_add("t", &TriggerKindSpec::Occurrence, Criteria::default()).unwrap();
        r.action_add("print", &ActionSpec::Print { force_flush: false }).unwrap();
        assert!(r.trigger_action_add_many("t", &["print", "missing"]).is_err());
        assert!(r.trigger("t").unwrap().actions().is_empty());
        r.trigger_action_add_many("t", &["print"]).unwrap();
        assert!(r.trigger_action_add("t", "print").is_err());
    }

    #[test]
    fn test_accumulator_belongs_to_one_trigger() {
        let (mut r, _) = registry();
        r.trigger_add("a", &TriggerKindSpec::Occurrence, Criteria::default()).unwrap();
        r.trigger_add("b", &TriggerKindSpec::Occurrence, Criteria::default()).unwrap();
        r.accumulator_add("acc").unwrap();
        r.trigger_accumulator_add("a", "acc").unwrap();
        assert!(matches!(
            r.trigger_accumulator_add("b", "acc"),
            Err(OdeError::InUse { .. })
        ));
        r.trigger_accumulator_remove("a").unwrap();
        r.trigger_accumulator_add("b", "acc").unwrap();
    }

    #[test]
    fn test_trigger_belongs_to_one_handler() {
        let (mut r, _) = registry();
        r.trigger_add("t", &TriggerKindSpec::Occurrence, Criteria::default()).unwrap();
        r.handler_add("one").unwrap();
        r.handler_add("two").unwrap();
        r.handler_trigger_add("one", "t").unwrap();
        assert!(r.handler_trigger_add("two", "t").is_err());
        r.handler_trigger_remove("one", "t").unwrap();
        r.handler_trigger_add_many("two", &["t"]).unwrap();
    }

    #[test]
    fn test_invalid_criteria_change_is_rejected() {
        let (mut r, _) = registry();
        r.trigger_add("t", &TriggerKindSpec::Occurrence, Criteria::default()).unwrap();
        r.trigger_dimensions_min_set("t", 100., 100.).unwrap();
        assert!(r.trigger_dimensions_max_set("t", 50., 50.).unwrap_err().is_configuration());
        assert_eq!(r.trigger("t").unwrap().criteria().max_width, 0.);
    }

    #[test]
    fn test_area_needs_registered_display_type() {
        let (mut r, _) = registry();
        let spec = AreaSpec::Line {
            line: String::from("line"),
            test_point: BboxTestPoint::South,
            show: false,
        };
        assert!(r.area_add("area", &spec).is_err());
        r.display_type_add(
            "red",
            &DisplayTypeSpec::PredefinedColor {
                color: PredefinedColor::Red,
                alpha: 1.,
            },
        )
        .unwrap();
        r.display_type_add(
            "line",
            &DisplayTypeSpec::Line {
                x1: 0.,
                y1: 100.,
                x2: 600.,
                y2: 100.,
                width: 4,
                color: String::from("red"),
            },
        )
        .unwrap();
        r.area_add("area", &spec).unwrap();
        assert!(r.area("area").is_some());
    }

    #[test]
    fn test_control_commands_apply_after_the_frame() {
        let (mut r, sink) = registry();
        r.trigger_add(
            "always",
            &TriggerKindSpec::Always {
                when: AlwaysWhen::PreOccurrenceCheck,
            },
            Criteria::default(),
        )
        .unwrap();
        r.action_add("print", &ActionSpec::Print { force_flush: false }).unwrap();
        r.action_add(
            "stop",
            &ActionSpec::Control(ControlCommand::HandlerDisable {
                handler: String::from("ode"),
            }),
        )
        .unwrap();
        r.trigger_action_add_many("always", &["print", "stop"]).unwrap();
        r.handler_add("ode").unwrap();
        r.handler_trigger_add("ode", "always").unwrap();

        let report = r.on_frame("ode", &Frame::new(0, 1, vec![])).unwrap();
        assert!(!report.keep_going);
        assert_eq!(report.total_occurrences(), 1);
        let report = r.on_frame("ode", &Frame::new(0, 2, vec![])).unwrap();
        assert_eq!(report.total_occurrences(), 0);
        assert_eq!(sink.records().len(), 1);

        assert!(r.on_frame("missing", &Frame::new(0, 3, vec![])).is_err());
    }
}
