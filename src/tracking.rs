use std::{fmt, sync::Arc, time::Duration};

use image::RgbImage;
use log::error;
use serde::{Deserialize, Serialize};

use crate::{error::OdeError, Point2D};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        BoundingBox {
            left,
            top,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point2D {
        (self.left + self.width / 2., self.top + self.height / 2.)
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }
}

/// One tracked detection, as delivered by the upstream detector + tracker
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectedObject {
    pub class_id: u32,
    pub confidence: f32,
    #[serde(rename = "bbox")]
    pub bounding_box: BoundingBox,
    /// Stable across frames for the same physical object; `None` if untracked
    #[serde(default)]
    pub tracking_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl DetectedObject {
    pub fn new(class_id: u32, confidence: f32, bounding_box: BoundingBox) -> Self {
        DetectedObject {
            class_id,
            confidence,
            bounding_box,
            tracking_id: None,
            label: None,
        }
    }

    pub fn tracked(mut self, tracking_id: u64) -> Self {
        self.tracking_id = Some(tracking_id);
        self
    }

    pub fn is_tracked(&self) -> bool {
        self.tracking_id.is_some()
    }

    /// Reject objects that would poison later arithmetic: non-finite
    /// geometry, negative dimensions, confidence outside [0,1].
    pub fn validate(&self, frame_number: u64, index: usize) -> Result<(), OdeError> {
        let malformed = |reason: &str| OdeError::MalformedObject {
            frame_number,
            index,
            reason: String::from(reason),
        };
        let BoundingBox {
            left,
            top,
            width,
            height,
        } = self.bounding_box;
        if ![left, top, width, height].iter().all(|v| v.is_finite()) {
            return Err(malformed("non-finite bounding box"));
        }
        if width < 0. || height < 0. {
            return Err(malformed("negative bounding box dimensions"));
        }
        if !(0. ..=1.).contains(&self.confidence) {
            return Err(malformed("confidence outside [0,1]"));
        }
        Ok(())
    }
}

/// All the detections for one video frame of one source. Immutable while
/// the engine evaluates it.
#[derive(Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase", from = "FrameMessage")]
pub struct Frame {
    pub source_id: u32,
    pub frame_number: u64,
    /// Monotonic presentation time, in milliseconds
    #[serde(default)]
    pub timestamp_ms: u64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub objects: Vec<DetectedObject>,
    /// Decoded pixels, only needed by capture actions
    #[serde(skip)]
    pub image: Option<Arc<RgbImage>>,
    /// Objects dropped while decoding because they could not be parsed
    #[serde(skip)]
    pub malformed_objects: usize,
}

/// Wire form of a frame. Objects are decoded one at a time so a single bad
/// object does not cost the rest of the frame.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameMessage {
    source_id: u32,
    frame_number: u64,
    #[serde(default)]
    timestamp_ms: u64,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    objects: Vec<serde_json::Value>,
}

impl From<FrameMessage> for Frame {
    fn from(message: FrameMessage) -> Self {
        let FrameMessage {
            source_id,
            frame_number,
            timestamp_ms,
            width,
            height,
            objects: raw_objects,
        } = message;

        let mut objects = Vec::with_capacity(raw_objects.len());
        let mut malformed_objects = 0;
        for (index, value) in raw_objects.into_iter().enumerate() {
            match serde_json::from_value::<DetectedObject>(value) {
                Ok(object) => objects.push(object),
                Err(e) => {
                    let e = OdeError::MalformedObject {
                        frame_number,
                        index,
                        reason: e.to_string(),
                    };
                    error!("Skipping object: {e}");
                    malformed_objects += 1;
                }
            }
        }

        Frame {
            source_id,
            frame_number,
            timestamp_ms,
            width,
            height,
            objects,
            image: None,
            malformed_objects,
        }
    }
}

impl Frame {
    pub fn new(source_id: u32, frame_number: u64, objects: Vec<DetectedObject>) -> Self {
        Frame {
            source_id,
            frame_number,
            objects,
            ..Default::default()
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_image(mut self, image: RgbImage) -> Self {
        self.width = image.width();
        self.height = image.height();
        self.image = Some(Arc::new(image));
        self
    }

    pub fn timestamp(&self) -> Duration {
        Duration::from_millis(self.timestamp_ms)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("source_id", &self.source_id)
            .field("frame_number", &self.frame_number)
            .field("timestamp_ms", &self.timestamp_ms)
            .field("dimensions", &(self.width, self.height))
            .field("objects", &self.objects.len())
            .field("malformed_objects", &self.malformed_objects)
            .field("has_image", &self.image.is_some())
            .finish()
    }
}
