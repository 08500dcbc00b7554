//! Builder for creating Detection objects from various box layouts.

use crate::tracker::{Detection, Rect, TrackId};

/// Builder for creating `Detection` objects from various input formats.
#[derive(Debug, Clone, Default)]
pub struct DetectionBuilder {
    bbox: Rect,
    score: f32,
    id: Option<TrackId>,
    label: Option<String>,
}

impl DetectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bounding box in TLBR format (x1, y1, x2, y2).
    pub fn tlbr(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.bbox = Rect::from_tlbr(x1, y1, x2, y2);
        self
    }

    /// Set bounding box in XYWH format (center_x, center_y, width, height).
    pub fn xywh(mut self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.bbox = Rect::new(cx - w / 2.0, cy - h / 2.0, w, h);
        self
    }

    /// Set bounding box in TLWH format (left, top, width, height).
    pub fn tlwh(mut self, x: f32, y: f32, w: f32, h: f32) -> Self {
        self.bbox = Rect::new(x, y, w, h);
        self
    }

    pub fn score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    /// Attach the id assigned by a tracking backend.
    pub fn id(mut self, id: impl Into<TrackId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn build(self) -> Detection {
        Detection {
            bbox: self.bbox,
            score: self.score,
            id: self.id,
            label: self.label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_builder() {
        let det = DetectionBuilder::new()
            .tlbr(10.0, 20.0, 50.0, 80.0)
            .score(0.95)
            .id(3u64)
            .label("cup")
            .build();

        assert_eq!(det.score, 0.95);
        assert_eq!(det.bbox, Rect::new(10.0, 20.0, 40.0, 60.0));
        assert_eq!(det.id, Some(TrackId::Num(3)));
        assert_eq!(det.label.as_deref(), Some("cup"));
    }

    #[test]
    fn test_xywh_is_centred() {
        let det = DetectionBuilder::new().xywh(50.0, 50.0, 20.0, 10.0).build();
        assert_eq!(det.bbox, Rect::new(40.0, 45.0, 20.0, 10.0));
    }
}
