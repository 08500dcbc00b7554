//! Per-id trajectory bookkeeping.

use std::collections::VecDeque;
use std::fmt;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::tracker::rect::Rect;
use crate::tracker::track_state::TrackState;

/// Identifier of a tracked entity.
///
/// Positional cup slots and numeric tracker ids use `Num`; backends that
/// name their tracks (e.g. `"person-3"`) use `Name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrackId {
    Num(u64),
    Name(String),
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackId::Num(n) => write!(f, "{}", n),
            TrackId::Name(name) => f.write_str(name),
        }
    }
}

impl From<u64> for TrackId {
    fn from(n: u64) -> Self {
        TrackId::Num(n)
    }
}

impl From<&str> for TrackId {
    fn from(name: &str) -> Self {
        TrackId::Name(name.to_string())
    }
}

impl From<String> for TrackId {
    fn from(name: String) -> Self {
        TrackId::Name(name)
    }
}

/// A detection that already carries its identity, ready for `TrackerState::update`.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub id: TrackId,
    pub bbox: Rect,
    pub label: Option<String>,
}

impl Observation {
    pub fn new(id: impl Into<TrackId>, bbox: Rect) -> Self {
        Self {
            id: id.into(),
            bbox,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// One tracked entity: a bounded centroid history plus the latest box.
#[derive(Debug, Clone)]
pub struct TrackedEntity {
    id: TrackId,
    history: VecDeque<Point2<f32>>,
    capacity: usize,
    last_box: Rect,
    label: Option<String>,
    missed_frames: u32,
    first_frame: u64,
    last_frame: u64,
}

impl TrackedEntity {
    pub(crate) fn new(id: TrackId, capacity: usize, frame: u64) -> Self {
        Self {
            id,
            history: VecDeque::with_capacity(capacity),
            capacity,
            last_box: Rect::default(),
            label: None,
            missed_frames: 0,
            first_frame: frame,
            last_frame: frame,
        }
    }

    /// Record this frame's box; the oldest centroid is evicted once the
    /// history is full.
    pub(crate) fn observe(&mut self, bbox: Rect, label: Option<String>, frame: u64) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(bbox.center());
        self.last_box = bbox;
        if label.is_some() {
            self.label = label;
        }
        self.missed_frames = 0;
        self.last_frame = frame;
    }

    /// Count one more consecutive frame of absence and return the new count.
    pub(crate) fn mark_missed(&mut self) -> u32 {
        self.missed_frames += 1;
        self.missed_frames
    }

    pub fn id(&self) -> &TrackId {
        &self.id
    }

    /// Centroids, oldest first.
    pub fn history(&self) -> &VecDeque<Point2<f32>> {
        &self.history
    }

    pub fn last_box(&self) -> Rect {
        self.last_box
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn missed_frames(&self) -> u32 {
        self.missed_frames
    }

    pub fn state(&self) -> TrackState {
        if self.missed_frames == 0 {
            TrackState::Tracked
        } else {
            TrackState::Lost
        }
    }

    pub fn is_visible(&self) -> bool {
        self.state() == TrackState::Tracked
    }

    /// Frame on which the entity was first observed.
    pub fn start_frame(&self) -> u64 {
        self.first_frame
    }

    /// Frame on which the entity was last observed.
    pub fn end_frame(&self) -> u64 {
        self.last_frame
    }
}
