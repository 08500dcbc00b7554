//! Detections and the assignment step used to give them persistent ids.

use ndarray::Array2;
use serde::Deserialize;
use tracing::warn;

use crate::tracker::entity::TrackId;
use crate::tracker::rect::{Rect, iou_batch};

/// Detector output for one object in one frame.
///
/// `id` is filled in by backends that already track (ByteTrack and friends);
/// plain detectors leave it empty and rely on an [`IdentityPolicy`].
///
/// [`IdentityPolicy`]: crate::tracker::IdentityPolicy
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Detection {
    /// Bounding box, stored as TLWH
    pub bbox: Rect,
    /// Detection confidence score
    #[serde(default = "full_confidence")]
    pub score: f32,
    #[serde(default)]
    pub id: Option<TrackId>,
    #[serde(default)]
    pub label: Option<String>,
}

fn full_confidence() -> f32 {
    1.0
}

impl Detection {
    /// Detection from a TLBR box (x1, y1, x2, y2).
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Self {
        Self::from_rect(Rect::from_tlbr(x1, y1, x2, y2), score)
    }

    pub fn from_rect(bbox: Rect, score: f32) -> Self {
        Self {
            bbox,
            score,
            id: None,
            label: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<TrackId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// 1 - IoU between every track box (rows) and detection box (columns).
pub fn iou_distance(track_boxes: &[Rect], det_boxes: &[Rect]) -> Array2<f32> {
    iou_batch(track_boxes, det_boxes).mapv(|iou| 1.0 - iou)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Minimum-cost one-to-one assignment, rejecting pairs costlier than `thresh`.
///
/// The cost matrix is padded to a square so `lapjv` can solve it; padded
/// cells are never accepted as matches.
pub fn linear_assignment(cost_matrix: &Array2<f32>, thresh: f32) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();

    if num_rows == 0 || num_cols == 0 {
        return AssignmentResult {
            matches: Vec::new(),
            unmatched_tracks: (0..num_rows).collect(),
            unmatched_detections: (0..num_cols).collect(),
        };
    }

    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), 1e6);
    for ((i, j), &cost) in cost_matrix.indexed_iter() {
        padded[[i, j]] = cost as f64;
    }

    let mut result = AssignmentResult::default();
    let mut detection_taken = vec![false; num_cols];

    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => {
            for (row, &col) in row_to_col.iter().enumerate().take(num_rows) {
                if col < num_cols && cost_matrix[[row, col]] <= thresh {
                    result.matches.push((row, col));
                    detection_taken[col] = true;
                } else {
                    result.unmatched_tracks.push(row);
                }
            }
        }
        Err(err) => {
            warn!(?err, "assignment failed, treating every track as unmatched");
            result.unmatched_tracks = (0..num_rows).collect();
        }
    }

    result.unmatched_detections = detection_taken
        .iter()
        .enumerate()
        .filter_map(|(j, &taken)| (!taken).then_some(j))
        .collect();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_assignment_matches_overlaps() {
        let tracks = [Rect::new(0.0, 0.0, 10.0, 10.0), Rect::new(100.0, 0.0, 10.0, 10.0)];
        let dets = [
            Rect::new(101.0, 0.0, 10.0, 10.0),
            Rect::new(1.0, 0.0, 10.0, 10.0),
            Rect::new(300.0, 0.0, 10.0, 10.0),
        ];
        let result = linear_assignment(&iou_distance(&tracks, &dets), 0.7);

        let mut matches = result.matches.clone();
        matches.sort();
        assert_eq!(matches, vec![(0, 1), (1, 0)]);
        assert!(result.unmatched_tracks.is_empty());
        assert_eq!(result.unmatched_detections, vec![2]);
    }

    #[test]
    fn test_linear_assignment_respects_threshold() {
        let tracks = [Rect::new(0.0, 0.0, 10.0, 10.0)];
        let dets = [Rect::new(8.0, 0.0, 10.0, 10.0)];
        let result = linear_assignment(&iou_distance(&tracks, &dets), 0.5);
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_tracks, vec![0]);
        assert_eq!(result.unmatched_detections, vec![0]);
    }

    #[test]
    fn test_iou_distance_shape_and_values() {
        let tracks = [Rect::new(0.0, 0.0, 10.0, 10.0)];
        let dets = [Rect::new(0.0, 0.0, 10.0, 10.0), Rect::new(50.0, 0.0, 10.0, 10.0)];
        let dists = iou_distance(&tracks, &dets);
        assert_eq!(dists.dim(), (1, 2));
        assert_eq!(dists[[0, 0]], 0.0);
        assert_eq!(dists[[0, 1]], 1.0);
    }

    #[test]
    fn test_linear_assignment_empty_sides() {
        let empty: [Rect; 0] = [];
        let dets = [Rect::new(0.0, 0.0, 1.0, 1.0)];
        let result = linear_assignment(&iou_distance(&empty, &dets), 0.5);
        assert_eq!(result.unmatched_detections, vec![0]);
        assert!(result.unmatched_tracks.is_empty());
    }

    #[test]
    fn test_detection_from_json() {
        let det: Detection =
            serde_json::from_str(r#"{"bbox":{"x":1,"y":2,"width":3,"height":4},"id":5}"#).unwrap();
        assert_eq!(det.bbox, Rect::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(det.score, 1.0);
        assert_eq!(det.id, Some(TrackId::Num(5)));
        assert!(det.label.is_none());
    }
}
