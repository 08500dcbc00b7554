//! How detections get the ids that `TrackerState::update` keys on.

use crate::tracker::associator::{AssociatorConfig, IouAssociator};
use crate::tracker::entity::{Observation, TrackId};
use crate::tracker::matching::Detection;
use crate::tracker::overlay::CaptionStyle;

/// Prefix for ids handed out by the IoU associator. Detector ids are kept
/// as reported, so the two kinds can never collide.
const ASSOCIATED_PREFIX: &str = "iou-";

/// Id assignment strategy applied to each frame's detections.
#[derive(Debug, Clone)]
pub enum IdentityPolicy {
    /// Ids come from the backing tracker and stay with the physical object.
    /// Detections that arrive without an id are matched by IoU.
    PersistentIdentity(IouAssociator),
    /// Ids are slot numbers re-derived from left-to-right order every
    /// frame. Identity follows position, not the object.
    PositionalRelabel { slots: usize },
}

impl IdentityPolicy {
    pub fn persistent(config: AssociatorConfig) -> Self {
        IdentityPolicy::PersistentIdentity(IouAssociator::new(config))
    }

    pub fn positional(slots: usize) -> Self {
        IdentityPolicy::PositionalRelabel { slots }
    }

    pub fn assign(&mut self, detections: Vec<Detection>) -> Vec<Observation> {
        match self {
            IdentityPolicy::PersistentIdentity(associator) => {
                let (with_id, without_id): (Vec<_>, Vec<_>) =
                    detections.into_iter().partition(|d| d.id.is_some());

                let mut observations: Vec<Observation> = with_id
                    .into_iter()
                    .filter_map(|d| {
                        let mut obs = Observation::new(d.id?, d.bbox);
                        obs.label = d.label;
                        Some(obs)
                    })
                    .collect();
                if !without_id.is_empty() {
                    observations.extend(associator.associate(without_id).into_iter().map(
                        |mut obs| {
                            obs.id = TrackId::Name(format!("{}{}", ASSOCIATED_PREFIX, obs.id));
                            obs
                        },
                    ));
                }
                observations
            }
            IdentityPolicy::PositionalRelabel { slots } => positional_relabel(detections, *slots),
        }
    }

    pub fn reset(&mut self) {
        if let IdentityPolicy::PersistentIdentity(associator) = self {
            associator.reset();
        }
    }

    pub fn caption_style(&self) -> CaptionStyle {
        match self {
            IdentityPolicy::PersistentIdentity(_) => CaptionStyle::Identity,
            IdentityPolicy::PositionalRelabel { .. } => CaptionStyle::Slot,
        }
    }
}

/// Keep the `slots` largest boxes, order them left to right and number
/// them from 1.
pub fn positional_relabel(mut detections: Vec<Detection>, slots: usize) -> Vec<Observation> {
    if detections.len() > slots {
        detections.sort_by(|a, b| b.bbox.area().total_cmp(&a.bbox.area()));
        detections.truncate(slots);
    }
    detections.sort_by(|a, b| a.bbox.x.total_cmp(&b.bbox.x));

    detections
        .into_iter()
        .enumerate()
        .map(|(i, d)| {
            let mut obs = Observation::new(TrackId::Num(i as u64 + 1), d.bbox);
            obs.label = d.label;
            obs
        })
        .collect()
}
