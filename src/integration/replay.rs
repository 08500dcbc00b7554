//! Detector/tracker output recorded to disk and played back frame by frame.
//!
//! The file holds one JSON array of detections per line, one line per frame:
//!
//! ```text
//! [{"bbox":{"x":10,"y":20,"width":40,"height":40},"score":0.9,"id":3,"label":"cup"}]
//! []
//! ```

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use image::RgbImage;
use serde::Deserialize;
use tracing::info;

use super::DetectionSource;
use crate::error::{Error, Result};
use crate::tracker::Detection;

/// Post-filtering applied to raw detector output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectionFilter {
    /// Minimum confidence kept.
    pub confidence: f32,
    /// IoU above which the weaker of two same-label boxes is suppressed.
    pub iou: f32,
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self {
            confidence: 0.25,
            iou: 0.45,
        }
    }
}

impl DetectionFilter {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("confidence", self.confidence), ("iou", self.iou)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidConfig(format!(
                    "objects.{} must lie in [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    pub fn apply(&self, detections: Vec<Detection>) -> Vec<Detection> {
        let confident = detections
            .into_iter()
            .filter(|d| d.score >= self.confidence)
            .collect();
        non_max_suppression(confident, self.iou)
    }
}

/// Greedy per-label NMS, highest score first. The survivors keep their
/// original relative order.
pub fn non_max_suppression(detections: Vec<Detection>, iou_thresh: f32) -> Vec<Detection> {
    let mut order: Vec<usize> = (0..detections.len()).collect();
    order.sort_by(|&a, &b| detections[b].score.total_cmp(&detections[a].score));

    let mut keep = vec![false; detections.len()];
    let mut kept: Vec<usize> = Vec::new();
    for i in order {
        let suppressed = kept.iter().any(|&k| {
            detections[k].label == detections[i].label
                && detections[k].bbox.iou(&detections[i].bbox) > iou_thresh
        });
        if !suppressed {
            keep[i] = true;
            kept.push(i);
        }
    }

    detections
        .into_iter()
        .zip(keep)
        .filter_map(|(d, k)| k.then_some(d))
        .collect()
}

/// Plays back a JSON-lines detection log; frames past the end yield nothing.
#[derive(Debug, Clone)]
pub struct ReplayDetector {
    frames: VecDeque<Vec<Detection>>,
    filter: DetectionFilter,
}

impl ReplayDetector {
    pub fn new(frames: Vec<Vec<Detection>>, filter: DetectionFilter) -> Self {
        Self {
            frames: frames.into(),
            filter,
        }
    }

    pub fn load(path: impl AsRef<Path>, filter: DetectionFilter) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let frames = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str::<Vec<Detection>>(line))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        info!(path = %path.display(), frames = frames.len(), "loaded detection log");
        Ok(Self::new(frames, filter))
    }

    /// Forget any ids recorded in the log so identities are re-derived by
    /// the associator.
    pub fn without_ids(mut self) -> Self {
        for detection in self.frames.iter_mut().flatten() {
            detection.id = None;
        }
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl DetectionSource for ReplayDetector {
    type Error = Error;

    fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>> {
        let raw = self.frames.pop_front().unwrap_or_default();
        Ok(self.filter.apply(raw))
    }
}
