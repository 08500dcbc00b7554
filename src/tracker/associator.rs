//! IoU-based identity assignment for detectors that do not track.

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::tracker::entity::{Observation, TrackId};
use crate::tracker::matching::{self, AssignmentResult, Detection};
use crate::tracker::rect::Rect;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AssociatorConfig {
    /// Minimum IoU between a track and a detection for them to match.
    pub min_iou: f32,
    /// Frames a track may go unmatched before its id is retired.
    pub max_missed: u32,
}

impl Default for AssociatorConfig {
    fn default() -> Self {
        Self {
            min_iou: 0.3,
            max_missed: 30,
        }
    }
}

impl AssociatorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_iou) {
            return Err(Error::InvalidConfig(format!(
                "associator.min_iou must lie in [0, 1], got {}",
                self.min_iou
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct LiveTrack {
    id: u64,
    bbox: Rect,
    missed: u32,
}

/// Gives detections persistent numeric ids by matching them against the
/// boxes of the previous frame.
#[derive(Debug, Clone)]
pub struct IouAssociator {
    tracks: Vec<LiveTrack>,
    next_id: u64,
    config: AssociatorConfig,
}

impl Default for IouAssociator {
    fn default() -> Self {
        Self::new(AssociatorConfig::default())
    }
}

impl IouAssociator {
    pub fn new(config: AssociatorConfig) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            config,
        }
    }

    pub fn associate(&mut self, detections: Vec<Detection>) -> Vec<Observation> {
        let track_boxes: Vec<Rect> = self.tracks.iter().map(|t| t.bbox).collect();
        let det_boxes: Vec<Rect> = detections.iter().map(|d| d.bbox).collect();
        let dists = matching::iou_distance(&track_boxes, &det_boxes);

        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = matching::linear_assignment(&dists, 1.0 - self.config.min_iou);

        let mut assigned: Vec<Option<u64>> = vec![None; detections.len()];
        for (itrack, idet) in matches {
            let track = &mut self.tracks[itrack];
            track.bbox = detections[idet].bbox;
            track.missed = 0;
            assigned[idet] = Some(track.id);
        }

        for itrack in unmatched_tracks {
            self.tracks[itrack].missed += 1;
        }

        for idet in unmatched_detections {
            let id = self.next_id;
            self.next_id += 1;
            debug!(id, "new identity");
            self.tracks.push(LiveTrack {
                id,
                bbox: detections[idet].bbox,
                missed: 0,
            });
            assigned[idet] = Some(id);
        }

        let max_missed = self.config.max_missed;
        self.tracks.retain(|t| t.missed <= max_missed);

        detections
            .into_iter()
            .zip(assigned)
            .filter_map(|(det, id)| {
                let mut obs = Observation::new(TrackId::Num(id?), det.bbox);
                obs.label = det.label;
                Some(obs)
            })
            .collect()
    }

    /// Number of ids currently alive.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
    }
}
