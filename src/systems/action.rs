use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::{
    display_types::{resolve_font, DisplayMeta, DisplayType, RgbaColor, RgbaFont, RgbaRectangle, RgbaText},
    error::{OdeError, Result},
    sinks::{PrintBody, PrintRecord, RecordSink},
    tracking::{DetectedObject, Frame},
};

use super::{
    capture::{CaptureRegion, CaptureWorker},
    trigger::Occurrence,
};

/// Engine-state changes requested by Control actions. Queued while a
/// frame is evaluated and applied once it is done.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ControlCommand {
    TriggerEnable { trigger: String },
    TriggerDisable { trigger: String },
    TriggerReset { trigger: String },
    AccumulatorReset { accumulator: String },
    HandlerDisable { handler: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BboxFormat {
    pub border_width: u32,
    pub border_color: RgbaColor,
    pub bg_color: Option<RgbaColor>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelFormat {
    pub text: String,
    pub font: RgbaFont,
    pub bg_color: Option<RgbaColor>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStyle {
    pub bbox: Option<BboxFormat>,
    pub label: Option<LabelFormat>,
}

/// Everything the overlay should draw for one frame. Object styles are
/// keyed by the object's index in `Frame::objects`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderPlan {
    pub objects: BTreeMap<usize, ObjectStyle>,
    pub meta: Vec<DisplayMeta>,
}

impl RenderPlan {
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.meta.is_empty()
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.meta.iter().filter_map(|m| match m {
            DisplayMeta::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
    }
}

/// Per-frame services an Action may use
pub struct ActionContext<'a> {
    pub frame: &'a Frame,
    pub render: &'a mut RenderPlan,
    pub sink: &'a dyn RecordSink,
    pub capture: &'a CaptureWorker,
    pub controls: &'a mut Vec<ControlCommand>,
}

pub enum ActionInput<'a> {
    Occurrence(&'a Occurrence),
    /// Running totals published by an Accumulator
    Metrics {
        accumulator_id: &'a str,
        counters: &'a IndexMap<String, u64>,
    },
}

#[derive(Debug, Clone)]
pub enum ActionKind {
    FormatBbox {
        border_width: u32,
        /// A color or a palette indexed by class id
        border_color: DisplayType,
        bg_color: Option<DisplayType>,
    },
    FormatLabel {
        font: RgbaFont,
        bg_color: Option<DisplayType>,
    },
    DisplayMetaAdd {
        meta: Vec<DisplayMeta>,
    },
    FillFrame {
        color: RgbaColor,
    },
    Display {
        format: String,
        x: f32,
        y: f32,
        font: RgbaFont,
        bg_color: Option<RgbaColor>,
    },
    CaptureObject {
        outdir: PathBuf,
    },
    CaptureFrame {
        outdir: PathBuf,
        annotate: bool,
    },
    Print {
        force_flush: bool,
    },
    Control(ControlCommand),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ActionSpec {
    FormatBbox {
        border_width: u32,
        border_color: String,
        #[serde(default)]
        bg_color: Option<String>,
    },
    FormatLabel {
        font: String,
        #[serde(default)]
        bg_color: Option<String>,
    },
    DisplayMetaAdd {
        display_types: Vec<String>,
    },
    FillFrame {
        color: String,
    },
    Display {
        format: String,
        x: f32,
        y: f32,
        font: String,
        #[serde(default)]
        bg_color: Option<String>,
    },
    CaptureObject {
        outdir: PathBuf,
    },
    CaptureFrame {
        outdir: PathBuf,
        #[serde(default)]
        annotate: bool,
    },
    Print {
        #[serde(default)]
        force_flush: bool,
    },
    Control(ControlCommand),
}

#[derive(Debug, Clone)]
pub struct Action {
    id: String,
    kind: ActionKind,
}

fn color_ref<'a, F>(lookup: &F, id: &str) -> Result<DisplayType>
where
    F: Fn(&str) -> Option<&'a DisplayType>,
{
    match lookup(id) {
        Some(t @ DisplayType::Color(_)) | Some(t @ DisplayType::Palette(_)) => Ok(t.clone()),
        Some(_) => Err(OdeError::invalid("color", format!("\"{id}\" is not a color or palette"))),
        None => Err(OdeError::unknown("color", id)),
    }
}

fn single_color<'a, F>(lookup: &F, id: &str) -> Result<RgbaColor>
where
    F: Fn(&str) -> Option<&'a DisplayType>,
{
    match lookup(id) {
        Some(DisplayType::Color(c)) => Ok(*c),
        Some(_) => Err(OdeError::invalid("color", format!("\"{id}\" is not a single color"))),
        None => Err(OdeError::unknown("color", id)),
    }
}

fn check_outdir(outdir: &Path) -> Result<()> {
    if outdir.is_dir() {
        Ok(())
    } else {
        Err(OdeError::invalid(
            "capture directory",
            format!("{} is not an existing directory", outdir.display()),
        ))
    }
}

impl Action {
    pub fn new(id: &str, kind: ActionKind) -> Result<Self> {
        match &kind {
            ActionKind::CaptureObject { outdir } | ActionKind::CaptureFrame { outdir, .. } => {
                check_outdir(outdir)?
            }
            ActionKind::FormatBbox { border_color, .. } if border_color.color_at(0).is_none() => {
                return Err(OdeError::invalid("color", "border color must be a color or palette"))
            }
            _ => {}
        }
        Ok(Action {
            id: String::from(id),
            kind,
        })
    }

    pub fn from_spec<'a, F>(id: &str, spec: &ActionSpec, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<&'a DisplayType>,
    {
        let kind = match spec {
            ActionSpec::FormatBbox {
                border_width,
                border_color,
                bg_color,
            } => ActionKind::FormatBbox {
                border_width: *border_width,
                border_color: color_ref(&lookup, border_color)?,
                bg_color: bg_color.as_deref().map(|c| color_ref(&lookup, c)).transpose()?,
            },
            ActionSpec::FormatLabel { font, bg_color } => ActionKind::FormatLabel {
                font: resolve_font(&lookup, font)?,
                bg_color: bg_color.as_deref().map(|c| color_ref(&lookup, c)).transpose()?,
            },
            ActionSpec::DisplayMetaAdd { display_types } => {
                if display_types.is_empty() {
                    return Err(OdeError::invalid("display types", "at least one is required"));
                }
                let meta = display_types
                    .iter()
                    .map(|t| match lookup(t) {
                        Some(display_type) => display_type.as_meta().cloned().ok_or_else(|| {
                            OdeError::invalid("display type", format!("\"{t}\" cannot be drawn"))
                        }),
                        None => Err(OdeError::unknown("display type", t)),
                    })
                    .collect::<Result<Vec<DisplayMeta>>>()?;
                ActionKind::DisplayMetaAdd { meta }
            }
            ActionSpec::FillFrame { color } => ActionKind::FillFrame {
                color: single_color(&lookup, color)?,
            },
            ActionSpec::Display {
                format,
                x,
                y,
                font,
                bg_color,
            } => ActionKind::Display {
                format: format.clone(),
                x: *x,
                y: *y,
                font: resolve_font(&lookup, font)?,
                bg_color: bg_color.as_deref().map(|c| single_color(&lookup, c)).transpose()?,
            },
            ActionSpec::CaptureObject { outdir } => ActionKind::CaptureObject {
                outdir: outdir.clone(),
            },
            ActionSpec::CaptureFrame { outdir, annotate } => ActionKind::CaptureFrame {
                outdir: outdir.clone(),
                annotate: *annotate,
            },
            ActionSpec::Print { force_flush } => ActionKind::Print {
                force_flush: *force_flush,
            },
            ActionSpec::Control(command) => ActionKind::Control(command.clone()),
        };
        Action::new(id, kind)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub fn is_capture(&self) -> bool {
        matches!(
            self.kind,
            ActionKind::CaptureObject { .. } | ActionKind::CaptureFrame { .. }
        )
    }

    pub fn apply(&self, input: &ActionInput, ctx: &mut ActionContext) {
        let frame = ctx.frame;
        match &self.kind {
            ActionKind::FormatBbox {
                border_width,
                border_color,
                bg_color,
            } => {
                if let Some((index, object)) = object_of(input) {
                    let class = object.class_id as usize;
                    if let Some(border_color) = border_color.color_at(class) {
                        ctx.render.objects.entry(index).or_default().bbox = Some(BboxFormat {
                            border_width: *border_width,
                            border_color,
                            bg_color: bg_color.as_ref().and_then(|c| c.color_at(class)),
                        });
                    }
                }
            }
            ActionKind::FormatLabel { font, bg_color } => {
                if let Some((index, object)) = object_of(input) {
                    ctx.render.objects.entry(index).or_default().label = Some(LabelFormat {
                        text: label_text(object),
                        font: font.clone(),
                        bg_color: bg_color
                            .as_ref()
                            .and_then(|c| c.color_at(object.class_id as usize)),
                    });
                }
            }
            ActionKind::DisplayMetaAdd { meta } => {
                ctx.render.meta.extend(meta.iter().cloned());
            }
            ActionKind::FillFrame { color } => {
                ctx.render.meta.push(DisplayMeta::Rectangle(RgbaRectangle {
                    left: 0.,
                    top: 0.,
                    width: frame.width as f32,
                    height: frame.height as f32,
                    border_width: 0,
                    color: *color,
                    bg_color: Some(*color),
                }));
            }
            ActionKind::Display {
                format,
                x,
                y,
                font,
                bg_color,
            } => {
                let text = render_template(format, |name| token_value(name, input, frame));
                trace!("Display \"{}\": {}", self.id, text);
                ctx.render.meta.push(DisplayMeta::Text(RgbaText {
                    text,
                    x: *x,
                    y: *y,
                    font: font.clone(),
                    bg_color: *bg_color,
                }));
            }
            ActionKind::CaptureObject { outdir } => match object_of(input) {
                Some((_, object)) => {
                    let capture_id = ctx.capture.submit(
                        &self.id,
                        frame.image.clone(),
                        CaptureRegion::Object(object.bounding_box),
                        outdir.clone(),
                    );
                    debug!("Queued object capture {capture_id} for \"{}\"", self.id);
                }
                None => debug!("Capture \"{}\" has no object to crop", self.id),
            },
            ActionKind::CaptureFrame { outdir, annotate } => {
                let annotate = match (annotate, object_of(input)) {
                    (true, Some((_, object))) => Some((object.bounding_box, [255, 0, 0])),
                    _ => None,
                };
                let capture_id = ctx.capture.submit(
                    &self.id,
                    frame.image.clone(),
                    CaptureRegion::Frame { annotate },
                    outdir.clone(),
                );
                debug!("Queued frame capture {capture_id} for \"{}\"", self.id);
            }
            ActionKind::Print { force_flush } => {
                let body = match input {
                    ActionInput::Occurrence(o) => PrintBody::Occurrence((*o).clone()),
                    ActionInput::Metrics {
                        accumulator_id,
                        counters,
                    } => PrintBody::Metrics {
                        accumulator_id: String::from(*accumulator_id),
                        source_id: frame.source_id,
                        frame_number: frame.frame_number,
                        counters: (*counters).clone(),
                    },
                };
                ctx.sink.emit(
                    &PrintRecord {
                        action_id: self.id.clone(),
                        body,
                    },
                    *force_flush,
                );
            }
            ActionKind::Control(command) => {
                debug!("Action \"{}\" queues {:?}", self.id, command);
                ctx.controls.push(command.clone());
            }
        }
    }
}

fn object_of<'a>(input: &'a ActionInput) -> Option<(usize, &'a DetectedObject)> {
    match input {
        ActionInput::Occurrence(Occurrence {
            object_index: Some(index),
            object: Some(object),
            ..
        }) => Some((*index, object)),
        _ => None,
    }
}

fn label_text(object: &DetectedObject) -> String {
    let name = object
        .label
        .clone()
        .unwrap_or_else(|| format!("class {}", object.class_id));
    match object.tracking_id {
        Some(id) => format!("{name} #{id}"),
        None => name,
    }
}

fn token_value(name: &str, input: &ActionInput, frame: &Frame) -> Option<String> {
    match name {
        "source_id" => return Some(frame.source_id.to_string()),
        "frame_number" => return Some(frame.frame_number.to_string()),
        _ => {}
    }
    match input {
        ActionInput::Metrics {
            accumulator_id,
            counters,
        } => match name {
            "accumulator_id" => Some(String::from(*accumulator_id)),
            // Counters not yet incremented read as zero
            n if n.starts_with("occurrences") => Some(counters.get(n).copied().unwrap_or(0).to_string()),
            n => counters.get(n).map(|c| c.to_string()),
        },
        ActionInput::Occurrence(o) => {
            let object = o.object.as_ref();
            match name {
                "trigger_id" => Some(o.trigger_id.clone()),
                "count" => o.count.map(|c| c.to_string()),
                // Frame-level occurrences carry their count, object-level ones are one each
                "occurrences" => Some(o.count.unwrap_or(1).to_string()),
                "direction" => o.direction.map(|d| format!("{d:?}").to_lowercase()),
                "class_id" => object.map(|ob| ob.class_id.to_string()),
                "tracking_id" => object.and_then(|ob| ob.tracking_id).map(|t| t.to_string()),
                "confidence" => object.map(|ob| format!("{:.2}", ob.confidence)),
                "label" => object.map(label_text),
                _ => None,
            }
        }
    }
}

/// Replace `{name}` tokens using `lookup`; unknown tokens are left as written
pub fn render_template<F>(format: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(format.len());
    let mut rest = format;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
