//! Session state: per-id histories, grace-period expiry and the marked identity.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::tracker::entity::{Observation, TrackId, TrackedEntity};
use crate::tracker::overlay::{CaptionStyle, Overlay};
use crate::tracker::rect::Rect;

/// Configuration for the trajectory tracker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Number of centroids kept per entity.
    pub history_len: usize,
    /// Consecutive missed frames tolerated before an entity is dropped.
    pub grace_frames: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            history_len: 50,
            grace_frames: 5,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.history_len == 0 {
            return Err(Error::InvalidConfig(
                "tracker.history_len must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Where the marked entity currently is.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub id: TrackId,
    pub bbox: Rect,
}

/// Tracking state for a single session.
///
/// Owned by the frame loop and mutated once per frame through [`update`].
///
/// [`update`]: TrackerState::update
#[derive(Debug, Clone)]
pub struct TrackerState {
    entities: BTreeMap<TrackId, TrackedEntity>,
    marked_id: Option<TrackId>,
    frame_count: u64,
    config: TrackerConfig,
}

impl Default for TrackerState {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl TrackerState {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            entities: BTreeMap::new(),
            marked_id: None,
            frame_count: 0,
            config,
        }
    }

    /// Fold one frame of identified detections into the state.
    ///
    /// Unseen ids get a fresh entity, reported ids get their centroid
    /// appended, and ids missing for more than `grace_frames` consecutive
    /// frames are dropped. An empty frame only advances the counters.
    /// When an id is reported twice in one frame the later box wins.
    pub fn update<I>(&mut self, observations: I)
    where
        I: IntoIterator<Item = Observation>,
    {
        self.frame_count += 1;
        let frame = self.frame_count;

        let mut current: BTreeMap<TrackId, Observation> = BTreeMap::new();
        for obs in observations {
            current.insert(obs.id.clone(), obs);
        }

        let capacity = self.config.history_len.max(1);
        for (id, obs) in current.iter() {
            self.entities
                .entry(id.clone())
                .or_insert_with(|| {
                    debug!(id = %id, frame, "new entity");
                    TrackedEntity::new(id.clone(), capacity, frame)
                })
                .observe(obs.bbox, obs.label.clone(), frame);
        }

        let grace = self.config.grace_frames;
        let marked = self.marked_id.as_ref();
        self.entities.retain(|id, entity| {
            if current.contains_key(id) {
                return true;
            }
            let missed = entity.mark_missed();
            if missed <= grace {
                return true;
            }
            if marked == Some(id) {
                info!(id = %id, missed, "marked entity lost");
            } else {
                debug!(id = %id, missed, "entity expired");
            }
            false
        });
    }

    /// Designate `id` as the entity to predict.
    ///
    /// Ids that are not currently tracked are ignored and `false` is returned.
    pub fn mark(&mut self, id: &TrackId) -> bool {
        if !self.entities.contains_key(id) {
            debug!(id = %id, "ignoring mark of unknown entity");
            return false;
        }
        info!(id = %id, "entity marked");
        self.marked_id = Some(id.clone());
        true
    }

    /// Mark the visible entity whose box contains the point.
    ///
    /// When boxes overlap, the first one in id order wins.
    pub fn mark_at(&mut self, x: f32, y: f32) -> Option<TrackId> {
        let id = self
            .entities
            .values()
            .filter(|e| e.is_visible())
            .find(|e| e.last_box().contains(x, y))
            .map(|e| e.id().clone());

        match id {
            Some(id) => {
                self.mark(&id);
                Some(id)
            }
            None => {
                debug!(x, y, "no entity at clicked position");
                None
            }
        }
    }

    /// Current box of the marked entity, or `None` when nothing is marked or
    /// the marked entity is no longer tracked.
    pub fn predict(&self) -> Option<Prediction> {
        let id = self.marked_id.as_ref()?;
        self.entities.get(id).map(|entity| Prediction {
            id: id.clone(),
            bbox: entity.last_box(),
        })
    }

    /// Forget every entity and the mark, and restart frame counting.
    pub fn reset(&mut self) {
        self.entities.clear();
        self.marked_id = None;
        self.frame_count = 0;
    }

    /// Renderable view of the current state.
    pub fn overlay(&self, style: CaptionStyle) -> Overlay {
        Overlay::from_state(self, style)
    }

    pub fn entities(&self) -> impl Iterator<Item = &TrackedEntity> {
        self.entities.values()
    }

    pub fn entity(&self, id: &TrackId) -> Option<&TrackedEntity> {
        self.entities.get(id)
    }

    pub fn marked_id(&self) -> Option<&TrackId> {
        self.marked_id.as_ref()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}
