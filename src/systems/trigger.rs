use std::{collections::HashSet, sync::Arc};

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::{
    display_types::{DisplayMeta, DisplayType, RgbaMultiLine},
    error::{OdeError, Result},
    tracking::{DetectedObject, Frame},
};

use super::{
    action::{Action, ActionContext, ActionInput},
    area::{Area, CrossDirection},
    criteria::Criteria,
    trace::{crossings, TestMethod, TraceBuffers, TraceKey},
};

/// One qualifying match produced by a trigger in one frame
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub trigger_id: String,
    pub source_id: u32,
    pub frame_number: u64,
    pub timestamp_ms: u64,
    /// Index into `Frame::objects`, for object-level occurrences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<DetectedObject>,
    /// Qualifying-object count, for frame-level occurrences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<CrossDirection>,
}

impl Occurrence {
    fn new(trigger_id: &str, frame: &Frame) -> Self {
        Occurrence {
            trigger_id: String::from(trigger_id),
            source_id: frame.source_id,
            frame_number: frame.frame_number,
            timestamp_ms: frame.timestamp_ms,
            object_index: None,
            object: None,
            count: None,
            direction: None,
        }
    }

    fn for_object(trigger_id: &str, frame: &Frame, index: usize, object: &DetectedObject) -> Self {
        Occurrence {
            object_index: Some(index),
            object: Some(object.clone()),
            ..Occurrence::new(trigger_id, frame)
        }
    }
}

/// The handler runs every trigger of one phase before moving to the next
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    PreFrame,
    Objects,
    PostFrame,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::PreFrame, Phase::Objects, Phase::PostFrame];
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum AlwaysWhen {
    #[default]
    PreOccurrenceCheck,
    PostOccurrenceCheck,
}

/// What happens to a NewHigh/NewLow water mark when the trigger is re-enabled
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum WaterMarkReset {
    #[default]
    Preserve,
    ResetOnEnable,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrossViewSettings {
    pub enabled: bool,
    /// Color or palette display type; palettes are indexed by tracking id
    pub color: String,
    pub line_width: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TriggerKindSpec {
    Always {
        #[serde(default)]
        when: AlwaysWhen,
    },
    Occurrence,
    Summation,
    Instance,
    NewHigh {
        preset: usize,
        #[serde(default)]
        reset_policy: WaterMarkReset,
    },
    NewLow {
        preset: usize,
        #[serde(default)]
        reset_policy: WaterMarkReset,
    },
    Cross {
        min_frame_count: usize,
        max_trace_points: usize,
        #[serde(default)]
        test_method: TestMethod,
        /// Frames a tracking id may go unseen before its trace is dropped;
        /// absent means traces are only dropped on crossing or reset
        #[serde(default)]
        max_idle_frames: Option<u64>,
        #[serde(default)]
        view: Option<CrossViewSettings>,
    },
}

#[derive(Debug)]
struct CrossView {
    color: DisplayType,
    line_width: u32,
}

#[derive(Debug)]
struct CrossState {
    min_frame_count: usize,
    test_method: TestMethod,
    max_idle_frames: Option<u64>,
    traces: TraceBuffers,
    view: Option<CrossView>,
}

#[derive(Debug)]
enum TriggerState {
    Always(AlwaysWhen),
    Occurrence,
    Summation,
    /// Ids are per source, since trackers number each stream independently
    Instance { seen: HashSet<TraceKey> },
    NewHigh {
        preset: usize,
        mark: usize,
        policy: WaterMarkReset,
    },
    NewLow {
        preset: usize,
        mark: usize,
        policy: WaterMarkReset,
    },
    Cross(Box<CrossState>),
}

impl TriggerState {
    fn from_spec<'a, F>(spec: &TriggerKindSpec, lookup: F) -> Result<TriggerState>
    where
        F: Fn(&str) -> Option<&'a DisplayType>,
    {
        let state = match spec {
            TriggerKindSpec::Always { when } => TriggerState::Always(*when),
            TriggerKindSpec::Occurrence => TriggerState::Occurrence,
            TriggerKindSpec::Summation => TriggerState::Summation,
            TriggerKindSpec::Instance => TriggerState::Instance {
                seen: HashSet::new(),
            },
            TriggerKindSpec::NewHigh {
                preset,
                reset_policy,
            } => TriggerState::NewHigh {
                preset: *preset,
                mark: *preset,
                policy: *reset_policy,
            },
            TriggerKindSpec::NewLow {
                preset,
                reset_policy,
            } => TriggerState::NewLow {
                preset: *preset,
                mark: *preset,
                policy: *reset_policy,
            },
            TriggerKindSpec::Cross {
                min_frame_count,
                max_trace_points,
                test_method,
                max_idle_frames,
                view,
            } => {
                if *min_frame_count < 2 || min_frame_count > max_trace_points {
                    return Err(OdeError::invalid(
                        "cross trigger",
                        format!(
                            "need 2 <= minFrameCount ({min_frame_count}) <= maxTracePoints ({max_trace_points})"
                        ),
                    ));
                }
                let view = match view {
                    Some(v) if v.enabled => match lookup(&v.color) {
                        Some(c) if c.color_at(0).is_some() => Some(CrossView {
                            color: c.clone(),
                            line_width: v.line_width,
                        }),
                        Some(_) => {
                            return Err(OdeError::invalid(
                                "cross view color",
                                format!("\"{}\" is not a color or palette", v.color),
                            ))
                        }
                        None => return Err(OdeError::unknown("color", &v.color)),
                    },
                    _ => None,
                };
                TriggerState::Cross(Box::new(CrossState {
                    min_frame_count: *min_frame_count,
                    test_method: *test_method,
                    max_idle_frames: *max_idle_frames,
                    traces: TraceBuffers::new(*max_trace_points),
                    view,
                }))
            }
        };
        Ok(state)
    }

    fn reset(&mut self) {
        match self {
            TriggerState::Instance { seen } => seen.clear(),
            TriggerState::NewHigh { preset, mark, .. } | TriggerState::NewLow { preset, mark, .. } => {
                *mark = *preset
            }
            TriggerState::Cross(cross) => cross.traces.clear(),
            _ => {}
        }
    }
}

pub struct Trigger {
    id: String,
    state: TriggerState,
    criteria: Criteria,
    areas: Vec<Arc<Area>>,
    actions: Vec<Arc<Action>>,
    accumulator: Option<String>,
    limit: Option<u64>,
    fired: u64,
    enabled: bool,
    interval: u32,
    interval_count: u32,
}

impl Trigger {
    pub fn new<'a, F>(id: &str, spec: &TriggerKindSpec, criteria: Criteria, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<&'a DisplayType>,
    {
        criteria.validate()?;
        Ok(Trigger {
            id: String::from(id),
            state: TriggerState::from_spec(spec, lookup)?,
            criteria,
            areas: Vec::new(),
            actions: Vec::new(),
            accumulator: None,
            limit: None,
            fired: 0,
            enabled: true,
            interval: 0,
            interval_count: 0,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind_name(&self) -> &'static str {
        match self.state {
            TriggerState::Always(_) => "always",
            TriggerState::Occurrence => "occurrence",
            TriggerState::Summation => "summation",
            TriggerState::Instance { .. } => "instance",
            TriggerState::NewHigh { .. } => "newHigh",
            TriggerState::NewLow { .. } => "newLow",
            TriggerState::Cross(_) => "cross",
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            TriggerState::Always(AlwaysWhen::PreOccurrenceCheck) => Phase::PreFrame,
            TriggerState::Always(AlwaysWhen::PostOccurrenceCheck) => Phase::PostFrame,
            TriggerState::Occurrence | TriggerState::Instance { .. } | TriggerState::Cross(_) => {
                Phase::Objects
            }
            TriggerState::Summation | TriggerState::NewHigh { .. } | TriggerState::NewLow { .. } => {
                Phase::PostFrame
            }
        }
    }

    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    /// Replace the whole filter; an invalid one is rejected and the old one kept
    pub fn set_criteria(&mut self, criteria: Criteria) -> Result<()> {
        criteria.validate()?;
        self.criteria = criteria;
        Ok(())
    }

    pub fn set_confidence_min(&mut self, min_confidence: Option<f32>) -> Result<()> {
        self.criteria.set_confidence_min(min_confidence)
    }

    pub fn set_dimensions_min(&mut self, min_width: f32, min_height: f32) -> Result<()> {
        self.criteria.set_dimensions_min(min_width, min_height)
    }

    pub fn set_dimensions_max(&mut self, max_width: f32, max_height: f32) -> Result<()> {
        self.criteria.set_dimensions_max(max_width, max_height)
    }

    pub fn areas(&self) -> &[Arc<Area>] {
        &self.areas
    }

    pub fn add_area(&mut self, area: Arc<Area>) -> Result<()> {
        if self.areas.iter().any(|a| a.id() == area.id()) {
            return Err(OdeError::InUse {
                kind: "area",
                id: String::from(area.id()),
                owner: self.id.clone(),
            });
        }
        self.areas.push(area);
        Ok(())
    }

    pub fn actions(&self) -> &[Arc<Action>] {
        &self.actions
    }

    pub fn add_action(&mut self, action: Arc<Action>) -> Result<()> {
        if self.actions.iter().any(|a| a.id() == action.id()) {
            return Err(OdeError::InUse {
                kind: "action",
                id: String::from(action.id()),
                owner: self.id.clone(),
            });
        }
        self.actions.push(action);
        Ok(())
    }

    pub fn accumulator(&self) -> Option<&str> {
        self.accumulator.as_deref()
    }

    pub fn set_accumulator(&mut self, accumulator: Option<&str>) {
        self.accumulator = accumulator.map(String::from);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            if let TriggerState::NewHigh {
                preset,
                mark,
                policy: WaterMarkReset::ResetOnEnable,
            }
            | TriggerState::NewLow {
                preset,
                mark,
                policy: WaterMarkReset::ResetOnEnable,
            } = &mut self.state
            {
                *mark = *preset;
            }
        }
        self.enabled = enabled;
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// `None` removes the limit. Occurrences already counted still count.
    pub fn set_limit(&mut self, limit: Option<u64>) {
        self.limit = limit;
    }

    pub fn fired(&self) -> u64 {
        self.fired
    }

    pub fn limit_reached(&self) -> bool {
        self.limit.map_or(false, |limit| self.fired >= limit)
    }

    /// Evaluate only every `interval`th eligible frame; 0 or 1 means every frame
    pub fn set_interval(&mut self, interval: u32) {
        self.interval = interval;
        self.interval_count = 0;
    }

    /// Clear the occurrence count and all kind-specific state
    pub fn reset(&mut self) {
        debug!("Reset trigger \"{}\" after {} occurrences", self.id, self.fired);
        self.fired = 0;
        self.interval_count = 0;
        self.state.reset();
    }

    /// Whether this trigger takes part in a frame from `source_id` at all
    pub fn is_active_for(&self, source_id: u32) -> bool {
        self.enabled && self.criteria.source_matches(source_id)
    }

    /// Number of live Cross traces, 0 for other kinds
    pub fn trace_count(&self) -> usize {
        match &self.state {
            TriggerState::Cross(cross) => cross.traces.len(),
            _ => 0,
        }
    }

    /// Run one frame through this trigger. `objects` are the frame's valid
    /// objects with their original indices. Every returned occurrence has
    /// already been passed through the attached actions, in order.
    pub fn process(&mut self, objects: &[(usize, &DetectedObject)], ctx: &mut ActionContext) -> Vec<Occurrence> {
        let frame = ctx.frame;
        if !self.is_active_for(frame.source_id) {
            return Vec::new();
        }
        if self.limit_reached() {
            trace!("Trigger \"{}\" reached its limit of {:?}", self.id, self.limit);
            return Vec::new();
        }
        if self.interval > 1 {
            let due = self.interval_count == 0;
            self.interval_count = (self.interval_count + 1) % self.interval;
            if !due {
                return Vec::new();
            }
        }

        for area in self.areas.iter() {
            if let Some(outline) = area.display() {
                ctx.render.meta.push(outline.clone());
            }
        }

        let quota = self.limit.map(|limit| limit.saturating_sub(self.fired));
        let occurrences = self.evaluate(objects, frame, &mut ctx.render.meta, quota);

        for occurrence in occurrences.iter() {
            for action in self.actions.iter() {
                action.apply(&ActionInput::Occurrence(occurrence), ctx);
            }
        }
        self.fired += occurrences.len() as u64;
        if !occurrences.is_empty() {
            debug!(
                "Trigger \"{}\" ({}) fired {} time(s) in frame {}",
                self.id,
                self.kind_name(),
                occurrences.len(),
                frame.frame_number
            );
        }
        occurrences
    }

    fn evaluate(
        &mut self,
        objects: &[(usize, &DetectedObject)],
        frame: &Frame,
        render: &mut Vec<DisplayMeta>,
        quota: Option<u64>,
    ) -> Vec<Occurrence> {
        let Trigger {
            id,
            state,
            criteria,
            areas,
            ..
        } = self;
        let (id, criteria, areas): (&str, &Criteria, &[Arc<Area>]) = (id, criteria, areas);
        let source_id = frame.source_id;
        let mut remaining = quota.unwrap_or(u64::MAX);
        let mut occurrences = Vec::new();

        let qualifying = || {
            objects
                .iter()
                .filter(|(_, object)| criteria.matches(source_id, object, areas))
        };

        match state {
            TriggerState::Always(_) => occurrences.push(Occurrence::new(id, frame)),
            TriggerState::Occurrence => {
                for (index, object) in qualifying().take(remaining as usize) {
                    occurrences.push(Occurrence::for_object(id, frame, *index, object));
                }
            }
            TriggerState::Instance { seen } => {
                for (index, object) in qualifying() {
                    if remaining == 0 {
                        break;
                    }
                    // Untracked objects cannot be recognised on a later frame
                    let Some(tracking_id) = object.tracking_id else {
                        continue;
                    };
                    if seen.insert((source_id, tracking_id)) {
                        occurrences.push(Occurrence::for_object(id, frame, *index, object));
                        remaining -= 1;
                    }
                }
            }
            TriggerState::Summation => {
                let count = qualifying().count();
                occurrences.push(Occurrence {
                    count: Some(count),
                    ..Occurrence::new(id, frame)
                });
            }
            TriggerState::NewHigh { mark, .. } => {
                let count = qualifying().count();
                if count > *mark {
                    *mark = count;
                    occurrences.push(Occurrence {
                        count: Some(count),
                        ..Occurrence::new(id, frame)
                    });
                }
            }
            TriggerState::NewLow { mark, .. } => {
                let count = qualifying().count();
                if count < *mark {
                    *mark = count;
                    occurrences.push(Occurrence {
                        count: Some(count),
                        ..Occurrence::new(id, frame)
                    });
                }
            }
            TriggerState::Cross(cross) => {
                let Some(reference) = areas.first() else {
                    warn!("Cross trigger \"{}\" has no area to cross", id);
                    return occurrences;
                };
                for (index, object) in objects.iter() {
                    if !criteria.matches_object(source_id, object) {
                        continue;
                    }
                    let Some(tracking_id) = object.tracking_id else {
                        continue;
                    };
                    let key = (source_id, tracking_id);
                    let length = cross.traces.record(
                        key,
                        reference.test_point(&object.bounding_box),
                        frame.frame_number,
                    );
                    if length < cross.min_frame_count || remaining == 0 {
                        continue;
                    }
                    let directions: Vec<CrossDirection> = match cross.traces.points(&key) {
                        Some(points) => areas
                            .iter()
                            .flat_map(|area| crossings(points, area, cross.test_method))
                            .collect(),
                        None => Vec::new(),
                    };
                    if directions.is_empty() {
                        continue;
                    }
                    for direction in directions.into_iter().take(remaining as usize) {
                        occurrences.push(Occurrence {
                            direction: Some(direction),
                            ..Occurrence::for_object(id, frame, *index, object)
                        });
                        remaining -= 1;
                    }
                    // A counted traversal must not fire again
                    cross.traces.discard(&key);
                }

                if let Some(max_idle) = cross.max_idle_frames {
                    let evicted = cross.traces.evict_idle(source_id, frame.frame_number, max_idle);
                    if evicted > 0 {
                        trace!("Trigger \"{}\" dropped {} idle trace(s)", id, evicted);
                    }
                }

                if let Some(view) = &cross.view {
                    for ((source, tracking_id), points) in cross.traces.iter() {
                        if *source != source_id || points.len() < 2 {
                            continue;
                        }
                        if let Some(color) = view.color.color_at(*tracking_id as usize) {
                            render.push(DisplayMeta::MultiLine(RgbaMultiLine {
                                coordinates: points.iter().copied().collect(),
                                width: view.line_width,
                                color,
                            }));
                        }
                    }
                }
            }
        }
        occurrences
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        display_types::RgbaColor,
        sinks::MemorySink,
        systems::{
            action::{ActionKind, ControlCommand, RenderPlan},
            area::BboxTestPoint,
            capture::CaptureWorker,
        },
        tracking::BoundingBox,
    };

    fn no_types(_: &str) -> Option<&'static DisplayType> {
        None
    }

    fn trigger(spec: TriggerKindSpec, criteria: Criteria) -> Trigger {
        Trigger::new("t", &spec, criteria, no_types).unwrap()
    }

    fn person(confidence: f32, x: f32, tracking_id: u64) -> DetectedObject {
        DetectedObject::new(2, confidence, BoundingBox::new(x, 50., 20., 40.)).tracked(tracking_id)
    }

    /// Runs `frame` through `trigger` with throwaway services
    fn run(trigger: &mut Trigger, frame: &Frame) -> Vec<Occurrence> {
        run_with(trigger, frame, &mut RenderPlan::default())
    }

    fn run_with(trigger: &mut Trigger, frame: &Frame, render: &mut RenderPlan) -> Vec<Occurrence> {
        let sink = MemorySink::new();
        let capture = CaptureWorker::new();
        let mut controls: Vec<ControlCommand> = Vec::new();
        let objects: Vec<(usize, &DetectedObject)> = frame.objects.iter().enumerate().collect();
        let mut ctx = ActionContext {
            frame,
            render,
            sink: &sink,
            capture: &capture,
            controls: &mut controls,
        };
        trigger.process(&objects, &mut ctx)
    }

    fn frame_of(frame_number: u64, objects: Vec<DetectedObject>) -> Frame {
        Frame::new(0, frame_number, objects)
    }

    #[test]
    fn test_occurrence_confidence_floor() {
        let mut criteria = Criteria::new(None, Some(2));
        criteria.min_confidence = Some(0.4);
        let mut t = trigger(TriggerKindSpec::Occurrence, criteria);
        let frame = frame_of(1, vec![person(0.3, 0., 1), person(0.8, 100., 2)]);
        let occurrences = run(&mut t, &frame);
        assert_eq!(occurrences.len(), 1);
        assert_eq!(occurrences[0].object_index, Some(1));
    }

    #[test]
    fn test_limit_caps_occurrences_across_frames() {
        let mut t = trigger(TriggerKindSpec::Occurrence, Criteria::default());
        t.set_limit(Some(3));
        let frame = frame_of(1, vec![person(0.9, 0., 1), person(0.9, 50., 2)]);
        assert_eq!(run(&mut t, &frame).len(), 2);
        assert_eq!(run(&mut t, &frame).len(), 1);
        assert_eq!(run(&mut t, &frame).len(), 0);
        assert_eq!(t.fired(), 3);

        t.reset();
        assert_eq!(run(&mut t, &frame).len(), 2);
    }

    #[test]
    fn test_summation_counts_regardless_of_order() {
        let mut t = trigger(TriggerKindSpec::Summation, Criteria::default());
        let mut objects = vec![person(0.9, 0., 1), person(0.9, 50., 2), person(0.9, 90., 3)];
        let occurrences = run(&mut t, &frame_of(1, objects.clone()));
        assert_eq!(occurrences.len(), 1);
        assert_eq!(occurrences[0].count, Some(3));

        objects.reverse();
        assert_eq!(run(&mut t, &frame_of(2, objects))[0].count, Some(3));
        // Still fires on an empty frame
        assert_eq!(run(&mut t, &frame_of(3, vec![]))[0].count, Some(0));
    }

    #[test]
    fn test_instance_fires_once_per_tracking_id() {
        let mut t = trigger(TriggerKindSpec::Instance, Criteria::default());
        let untracked = DetectedObject::new(2, 0.9, BoundingBox::new(0., 0., 5., 5.));
        assert_eq!(run(&mut t, &frame_of(1, vec![person(0.9, 0., 1), untracked])).len(), 1);
        assert_eq!(run(&mut t, &frame_of(2, vec![person(0.9, 0., 1), person(0.9, 10., 2)])).len(), 1);
        assert_eq!(run(&mut t, &frame_of(3, vec![person(0.9, 0., 1), person(0.9, 10., 2)])).len(), 0);

        // Disable/enable keeps the seen set
        t.set_enabled(false);
        t.set_enabled(true);
        assert_eq!(run(&mut t, &frame_of(4, vec![person(0.9, 0., 1)])).len(), 0);
    }

    #[test]
    fn test_new_high_and_new_low() {
        let mut high = trigger(
            TriggerKindSpec::NewHigh {
                preset: 1,
                reset_policy: WaterMarkReset::Preserve,
            },
            Criteria::default(),
        );
        let mut low = trigger(
            TriggerKindSpec::NewLow {
                preset: 2,
                reset_policy: WaterMarkReset::Preserve,
            },
            Criteria::default(),
        );
        let counts = [1usize, 2, 2, 3, 1, 0, 0];
        let mut highs = Vec::new();
        let mut lows = Vec::new();
        for (n, count) in counts.iter().enumerate() {
            let objects = (0..*count).map(|i| person(0.9, i as f32 * 30., i as u64)).collect();
            let frame = frame_of(n as u64, objects);
            highs.extend(run(&mut high, &frame).iter().filter_map(|o| o.count));
            lows.extend(run(&mut low, &frame).iter().filter_map(|o| o.count));
        }
        assert_eq!(highs, vec![2, 3]);
        assert_eq!(lows, vec![1, 0]);
    }

    #[test]
    fn test_water_mark_reset_policy() {
        let spec = |reset_policy| TriggerKindSpec::NewHigh {
            preset: 0,
            reset_policy,
        };
        let frame = frame_of(1, vec![person(0.9, 0., 1)]);

        let mut preserve = trigger(spec(WaterMarkReset::Preserve), Criteria::default());
        let mut reset = trigger(spec(WaterMarkReset::ResetOnEnable), Criteria::default());
        for t in [&mut preserve, &mut reset] {
            assert_eq!(run(t, &frame).len(), 1);
            t.set_enabled(false);
            assert_eq!(run(t, &frame).len(), 0);
            t.set_enabled(true);
        }
        assert_eq!(run(&mut preserve, &frame).len(), 0);
        assert_eq!(run(&mut reset, &frame).len(), 1);
    }

    #[test]
    fn test_disabled_trigger_keeps_state_untouched() {
        let mut t = trigger(
            TriggerKindSpec::Cross {
                min_frame_count: 2,
                max_trace_points: 10,
                test_method: TestMethod::EndPoints,
                max_idle_frames: None,
                view: None,
            },
            Criteria::default(),
        );
        t.add_area(Arc::new(Area::line("line", (0., 100.), (500., 100.), 2., BboxTestPoint::Center)))
            .unwrap();
        t.set_enabled(false);
        run(&mut t, &frame_of(1, vec![person(0.9, 0., 1)]));
        assert_eq!(t.trace_count(), 0);
        assert_eq!(t.fired(), 0);
    }

    fn walker(frame_number: u64, y: f32) -> Frame {
        let object = DetectedObject::new(2, 0.9, BoundingBox::new(90., y - 20., 20., 40.)).tracked(7);
        frame_of(frame_number, vec![object])
    }

    fn cross_trigger(test_method: TestMethod) -> Trigger {
        let mut t = trigger(
            TriggerKindSpec::Cross {
                min_frame_count: 2,
                max_trace_points: 20,
                test_method,
                max_idle_frames: Some(5),
                view: None,
            },
            Criteria::default(),
        );
        t.add_area(Arc::new(Area::line("line", (0., 100.), (500., 100.), 2., BboxTestPoint::Center)))
            .unwrap();
        t
    }

    #[test]
    fn test_cross_end_points_single_crossing() {
        let mut t = cross_trigger(TestMethod::EndPoints);
        let mut occurrences = Vec::new();
        for (n, y) in [60., 80., 95., 110., 130., 150.].iter().enumerate() {
            occurrences.extend(run(&mut t, &walker(n as u64, *y)));
        }
        assert_eq!(occurrences.len(), 1);
        assert_eq!(occurrences[0].direction, Some(CrossDirection::In));
    }

    #[test]
    fn test_cross_return_trip() {
        let ys = [60., 80., 120., 90., 70.];
        let there_and_back = |test_method| {
            let mut t = trigger(
                TriggerKindSpec::Cross {
                    min_frame_count: 5,
                    max_trace_points: 20,
                    test_method,
                    max_idle_frames: None,
                    view: None,
                },
                Criteria::default(),
            );
            t.add_area(Arc::new(Area::line("line", (0., 100.), (500., 100.), 2., BboxTestPoint::Center)))
                .unwrap();
            ys.iter()
                .enumerate()
                .flat_map(|(n, y)| run(&mut t, &walker(n as u64, *y)))
                .filter_map(|o| o.direction)
                .collect::<Vec<CrossDirection>>()
        };
        assert!(there_and_back(TestMethod::EndPoints).is_empty());
        assert_eq!(
            there_and_back(TestMethod::AllPoints),
            vec![CrossDirection::In, CrossDirection::Out]
        );
    }

    #[test]
    fn test_cross_idle_traces_are_evicted() {
        let mut t = cross_trigger(TestMethod::EndPoints);
        run(&mut t, &walker(0, 50.));
        assert_eq!(t.trace_count(), 1);
        run(&mut t, &frame_of(3, vec![]));
        assert_eq!(t.trace_count(), 1);
        run(&mut t, &frame_of(6, vec![]));
        assert_eq!(t.trace_count(), 0);
    }

    #[test]
    fn test_cross_view_draws_traces() {
        let mut types = indexmap::IndexMap::new();
        types.insert(String::from("white"), DisplayType::Color(RgbaColor::new(1., 1., 1., 1.)));
        let spec = TriggerKindSpec::Cross {
            min_frame_count: 3,
            max_trace_points: 10,
            test_method: TestMethod::EndPoints,
            max_idle_frames: None,
            view: Some(CrossViewSettings {
                enabled: true,
                color: String::from("white"),
                line_width: 4,
            }),
        };
        let mut t = Trigger::new("t", &spec, Criteria::default(), |id| types.get(id)).unwrap();
        t.add_area(Arc::new(Area::line("line", (0., 100.), (500., 100.), 2., BboxTestPoint::Center)))
            .unwrap();
        let mut render = RenderPlan::default();
        run_with(&mut t, &walker(0, 40.), &mut render);
        run_with(&mut t, &walker(1, 50.), &mut render);
        assert!(matches!(render.meta.last(), Some(DisplayMeta::MultiLine(m)) if m.coordinates.len() == 2));
    }

    #[test]
    fn test_cross_rejects_bad_trace_bounds() {
        let spec = TriggerKindSpec::Cross {
            min_frame_count: 30,
            max_trace_points: 10,
            test_method: TestMethod::EndPoints,
            max_idle_frames: None,
            view: None,
        };
        assert!(Trigger::new("t", &spec, Criteria::default(), no_types).is_err());
    }

    #[test]
    fn test_interval_skips_frames() {
        let mut t = trigger(TriggerKindSpec::Always { when: AlwaysWhen::PreOccurrenceCheck }, Criteria::default());
        t.set_interval(3);
        let fired: usize = (0..7).map(|n| run(&mut t, &frame_of(n, vec![])).len()).sum();
        assert_eq!(fired, 3);
    }

    #[test]
    fn test_actions_run_per_occurrence() {
        let mut t = trigger(TriggerKindSpec::Occurrence, Criteria::default());
        t.add_action(Arc::new(
            Action::new("disable-me", ActionKind::Control(ControlCommand::TriggerDisable {
                trigger: String::from("t"),
            }))
            .unwrap(),
        ))
        .unwrap();
        let frame = frame_of(1, vec![person(0.9, 0., 1), person(0.9, 50., 2)]);

        let sink = MemorySink::new();
        let capture = CaptureWorker::new();
        let mut controls = Vec::new();
        let mut render = RenderPlan::default();
        let objects: Vec<(usize, &DetectedObject)> = frame.objects.iter().enumerate().collect();
        let mut ctx = ActionContext {
            frame: &frame,
            render: &mut render,
            sink: &sink,
            capture: &capture,
            controls: &mut controls,
        };
        t.process(&objects, &mut ctx);
        assert_eq!(controls.len(), 2);
    }
}
