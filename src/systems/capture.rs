use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

use crossbeam_channel::{unbounded, Sender};
use image::{imageops, Rgb, RgbImage};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};

use crate::{error::OdeError, tracking::BoundingBox};

/// Completion record for one capture, successful or not
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureInfo {
    pub capture_id: u64,
    pub filename: String,
    pub dirpath: String,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaptureInfo {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Called on the capture worker thread, never the frame thread
pub type CaptureListener = Arc<dyn Fn(&CaptureInfo) + Send + Sync>;

type ListenerTable = Arc<Mutex<HashMap<String, Vec<CaptureListener>>>>;

#[derive(Debug, Clone)]
pub enum CaptureRegion {
    Object(BoundingBox),
    Frame {
        /// Outline drawn onto the copy before saving
        annotate: Option<(BoundingBox, [u8; 3])>,
    },
}

struct CaptureJob {
    capture_id: u64,
    action_id: String,
    image: Option<Arc<RgbImage>>,
    region: CaptureRegion,
    outdir: PathBuf,
}

/// Crops and writes JPEGs off the frame thread
pub struct CaptureWorker {
    sender: Option<Sender<CaptureJob>>,
    handle: Option<JoinHandle<()>>,
    listeners: ListenerTable,
    next_id: AtomicU64,
}

impl CaptureWorker {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded::<CaptureJob>();
        let listeners: ListenerTable = Arc::new(Mutex::new(HashMap::new()));
        let table = listeners.clone();

        let handle = thread::spawn(move || {
            for job in receiver.iter() {
                let info = run_job(&job);
                match &info.error {
                    Some(e) => warn!("Capture {} for \"{}\" failed: {}", info.capture_id, job.action_id, e),
                    None => debug!("Captured {}/{}", info.dirpath, info.filename),
                }
                // Clone out so a listener may add listeners without deadlocking
                let to_notify = table
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .get(&job.action_id)
                    .cloned()
                    .unwrap_or_default();
                for listener in to_notify.iter() {
                    listener(&info);
                }
            }
            debug!("Capture worker exiting");
        });

        CaptureWorker {
            sender: Some(sender),
            handle: Some(handle),
            listeners,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn add_listener(&self, action_id: &str, listener: CaptureListener) {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(String::from(action_id))
            .or_default()
            .push(listener);
    }

    pub fn remove_listeners(&self, action_id: &str) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(action_id)
            .map_or(0, |l| l.len())
    }

    /// Queue a capture and return its id without waiting for the write
    pub fn submit(
        &self,
        action_id: &str,
        image: Option<Arc<RgbImage>>,
        region: CaptureRegion,
        outdir: PathBuf,
    ) -> u64 {
        let capture_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let job = CaptureJob {
            capture_id,
            action_id: String::from(action_id),
            image,
            region,
            outdir,
        };
        match &self.sender {
            Some(sender) => {
                if sender.send(job).is_err() {
                    error!("Capture worker has stopped; dropped capture {capture_id}");
                }
            }
            None => error!("Capture worker has stopped; dropped capture {capture_id}"),
        }
        capture_id
    }
}

impl Default for CaptureWorker {
    fn default() -> Self {
        CaptureWorker::new()
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what is queued, then exit
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Capture worker panicked");
            }
        }
    }
}

fn run_job(job: &CaptureJob) -> CaptureInfo {
    let mut info = CaptureInfo {
        capture_id: job.capture_id,
        filename: format!("{}.jpg", job.capture_id),
        dirpath: job.outdir.to_string_lossy().into_owned(),
        width: 0,
        height: 0,
        error: None,
    };
    let result = render(job).and_then(|image| {
        info.width = image.width();
        info.height = image.height();
        image
            .save(job.outdir.join(&info.filename))
            .map_err(|e| capture_error(job.capture_id, e.to_string()))
    });
    if let Err(e) = result {
        info.error = Some(e.to_string());
    }
    info
}

fn capture_error(capture_id: u64, reason: String) -> OdeError {
    OdeError::CaptureIo { capture_id, reason }
}

fn render(job: &CaptureJob) -> Result<RgbImage, OdeError> {
    let image = job
        .image
        .as_ref()
        .ok_or_else(|| capture_error(job.capture_id, String::from("frame carries no image data")))?;
    match &job.region {
        CaptureRegion::Object(bbox) => {
            let (x, y, w, h) = clamp_to_image(bbox, image.width(), image.height()).ok_or_else(|| {
                capture_error(job.capture_id, String::from("object lies outside the frame"))
            })?;
            Ok(imageops::crop_imm(&**image, x, y, w, h).to_image())
        }
        CaptureRegion::Frame { annotate } => {
            let mut copy = (**image).clone();
            if let Some((bbox, rgb)) = annotate {
                draw_outline(&mut copy, bbox, Rgb(*rgb), 2);
            }
            Ok(copy)
        }
    }
}

/// Integer pixel rectangle of `bbox` inside a `width` x `height` image
fn clamp_to_image(bbox: &BoundingBox, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let left = bbox.left.max(0.).floor() as u32;
    let top = bbox.top.max(0.).floor() as u32;
    let right = (bbox.right().ceil().max(0.) as u32).min(width);
    let bottom = (bbox.bottom().ceil().max(0.) as u32).min(height);
    if right <= left || bottom <= top {
        None
    } else {
        Some((left, top, right - left, bottom - top))
    }
}

fn draw_outline(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>, thickness: u32) {
    if let Some((x, y, w, h)) = clamp_to_image(bbox, image.width(), image.height()) {
        for py in y..y + h {
            for px in x..x + w {
                let edge = px < x + thickness
                    || py < y + thickness
                    || px + thickness >= x + w
                    || py + thickness >= y + h;
                if edge {
                    image.put_pixel(px, py, color);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn wait_for(receiver: &crossbeam_channel::Receiver<CaptureInfo>) -> CaptureInfo {
        receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("capture did not complete")
    }

    #[test]
    fn test_clamp_to_image() {
        let bbox = BoundingBox::new(-10., 5., 30., 10.);
        assert_eq!(clamp_to_image(&bbox, 100, 100), Some((0, 5, 20, 10)));
        let outside = BoundingBox::new(200., 5., 30., 10.);
        assert_eq!(clamp_to_image(&outside, 100, 100), None);
    }

    #[test]
    fn test_object_capture_writes_cropped_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let worker = CaptureWorker::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        worker.add_listener(
            "capture",
            Arc::new(move |info: &CaptureInfo| {
                let _ = tx.send(info.clone());
            }),
        );

        let image = Arc::new(RgbImage::from_pixel(64, 48, Rgb([10, 200, 10])));
        let id = worker.submit(
            "capture",
            Some(image),
            CaptureRegion::Object(BoundingBox::new(8., 8., 16., 24.)),
            dir.path().to_path_buf(),
        );

        let info = wait_for(&rx);
        assert!(info.is_ok(), "{:?}", info.error);
        assert_eq!(info.capture_id, id);
        assert_eq!((info.width, info.height), (16, 24));
        assert_eq!(info.filename, format!("{id}.jpg"));
        assert!(dir.path().join(&info.filename).exists());
    }

    #[test]
    fn test_missing_image_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let worker = CaptureWorker::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        worker.add_listener(
            "capture",
            Arc::new(move |info: &CaptureInfo| {
                let _ = tx.send(info.clone());
            }),
        );

        let first = worker.submit(
            "capture",
            None,
            CaptureRegion::Frame { annotate: None },
            dir.path().to_path_buf(),
        );
        let second = worker.submit(
            "capture",
            None,
            CaptureRegion::Frame { annotate: None },
            dir.path().to_path_buf(),
        );
        assert_ne!(first, second);

        let info = wait_for(&rx);
        assert!(!info.is_ok());
        assert_eq!(info.capture_id, first);
    }

    #[test]
    fn test_annotated_frame_capture_has_outline() {
        let mut image = RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]));
        let bbox = BoundingBox::new(5., 5., 10., 10.);
        draw_outline(&mut image, &bbox, Rgb([255, 0, 0]), 2);
        assert_eq!(image.get_pixel(5, 5), &Rgb([255, 0, 0]));
        assert_eq!(image.get_pixel(10, 10), &Rgb([0, 0, 0]));
        assert_eq!(image.get_pixel(14, 10), &Rgb([255, 0, 0]));
    }
}
