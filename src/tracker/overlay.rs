//! Renderer-agnostic description of what to draw for a frame.

use nalgebra::Point2;

use crate::tracker::entity::{TrackId, TrackedEntity};
use crate::tracker::rect::Rect;
use crate::tracker::state::TrackerState;

/// How entity ids are turned into captions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionStyle {
    /// Positional cup slots: "Cup 2".
    Slot,
    /// Persistent tracker ids: "#7 person".
    Identity,
}

impl CaptionStyle {
    pub fn caption(&self, id: &TrackId, label: Option<&str>) -> String {
        match (self, label) {
            (CaptionStyle::Slot, _) => format!("Cup {}", id),
            (CaptionStyle::Identity, Some(label)) => format!("#{} {}", id, label),
            (CaptionStyle::Identity, None) => format!("#{}", id),
        }
    }

    fn short(&self, id: &TrackId) -> String {
        match self {
            CaptionStyle::Slot => format!("Cup {}", id),
            CaptionStyle::Identity => format!("#{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayBox {
    pub id: TrackId,
    pub bbox: Rect,
    pub caption: String,
    pub highlighted: bool,
}

/// Trajectory polyline of one entity, oldest point first.
#[derive(Debug, Clone, PartialEq)]
pub struct Trail {
    pub id: TrackId,
    pub points: Vec<Point2<f32>>,
    pub highlighted: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlay {
    pub boxes: Vec<OverlayBox>,
    pub trails: Vec<Trail>,
    /// Box of the marked entity, when it is still tracked.
    pub predicted: Option<Rect>,
    /// Status line; `None` until something has been marked.
    pub status: Option<String>,
}

impl Overlay {
    /// Overlay carrying only a status line.
    pub fn status_only(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }

    /// Boxes and trails for every entity seen this frame, plus the prediction.
    pub fn from_state(state: &TrackerState, style: CaptionStyle) -> Self {
        let marked = state.marked_id();
        let is_marked = |e: &TrackedEntity| marked == Some(e.id());

        let visible: Vec<&TrackedEntity> = state.entities().filter(|e| e.is_visible()).collect();

        let boxes = visible
            .iter()
            .copied()
            .map(|e| OverlayBox {
                id: e.id().clone(),
                bbox: e.last_box(),
                caption: style.caption(e.id(), e.label()),
                highlighted: is_marked(e),
            })
            .collect();

        let trails = visible
            .iter()
            .copied()
            .filter(|e| e.history().len() > 1)
            .map(|e| Trail {
                id: e.id().clone(),
                points: e.history().iter().copied().collect(),
                highlighted: is_marked(e),
            })
            .collect();

        let prediction = state.predict();
        let status = marked.map(|_| match &prediction {
            Some(p) => format!("Predicted: {}", style.short(&p.id)),
            None => "Predicted: unknown".to_string(),
        });

        Self {
            boxes,
            trails,
            predicted: prediction.map(|p| p.bbox),
            status,
        }
    }

    pub fn highlighted(&self) -> Option<&OverlayBox> {
        self.boxes.iter().find(|b| b.highlighted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::entity::Observation;
    use crate::tracker::state::TrackerConfig;

    #[test]
    fn test_captions() {
        let id = TrackId::Num(2);
        assert_eq!(CaptionStyle::Slot.caption(&id, Some("cup")), "Cup 2");
        assert_eq!(CaptionStyle::Identity.caption(&id, Some("person")), "#2 person");
        assert_eq!(CaptionStyle::Identity.caption(&id, None), "#2");
    }

    #[test]
    fn test_overlay_from_state() {
        let mut state = TrackerState::new(TrackerConfig::default());
        state.update(vec![
            Observation::new(1u64, Rect::new(0.0, 0.0, 10.0, 10.0)),
            Observation::new(2u64, Rect::new(50.0, 0.0, 10.0, 10.0)),
        ]);
        let overlay = state.overlay(CaptionStyle::Slot);
        assert_eq!(overlay.boxes.len(), 2);
        assert!(overlay.trails.is_empty());
        assert!(overlay.status.is_none());

        state.mark(&TrackId::Num(2));
        state.update(vec![
            Observation::new(1u64, Rect::new(2.0, 0.0, 10.0, 10.0)),
            Observation::new(2u64, Rect::new(52.0, 0.0, 10.0, 10.0)),
        ]);
        let overlay = state.overlay(CaptionStyle::Slot);
        assert_eq!(overlay.trails.len(), 2);
        assert_eq!(overlay.highlighted().map(|b| b.id.clone()), Some(TrackId::Num(2)));
        assert_eq!(overlay.predicted, Some(Rect::new(52.0, 0.0, 10.0, 10.0)));
        assert_eq!(overlay.status.as_deref(), Some("Predicted: Cup 2"));
    }

    #[test]
    fn test_lost_entities_are_not_drawn() {
        let mut state = TrackerState::new(TrackerConfig::default());
        state.update(vec![Observation::new(1u64, Rect::new(0.0, 0.0, 10.0, 10.0))]);
        state.mark(&TrackId::Num(1));
        state.update(Vec::new());

        let overlay = state.overlay(CaptionStyle::Identity);
        assert!(overlay.boxes.is_empty());
        // Still inside the grace period, so the prediction holds.
        assert_eq!(overlay.status.as_deref(), Some("Predicted: #1"));
    }
}
