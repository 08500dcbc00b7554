//! Edge-and-contour cup detector.

use std::convert::Infallible;

use image::RgbImage;
use imageproc::contours::{self, BorderType, Contour};
use imageproc::distance_transform::Norm;
use serde::Deserialize;
use tracing::debug;

use super::DetectionSource;
use super::builder::DetectionBuilder;
use crate::error::{Error, Result};
use crate::tracker::{Detection, Rect};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Gaussian blur applied before edge detection.
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Radius of the morphological close that seals gaps in the edge map.
    pub close_radius: u8,
    /// Minimum enclosed contour area, in pixels.
    pub min_area: f64,
    /// Minimum width and height of an accepted box.
    pub min_side: f32,
    pub min_aspect: f32,
    pub max_aspect: f32,
    /// Number of cups in play.
    pub slots: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.1,
            canny_low: 50.0,
            canny_high: 150.0,
            close_radius: 1,
            min_area: 500.0,
            min_side: 20.0,
            min_aspect: 0.5,
            max_aspect: 2.5,
            slots: 3,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.slots == 0 {
            return Err(Error::InvalidConfig("detector.slots must be at least 1".into()));
        }
        if self.canny_low > self.canny_high {
            return Err(Error::InvalidConfig(
                "detector.canny_low must not exceed detector.canny_high".into(),
            ));
        }
        if self.min_aspect >= self.max_aspect {
            return Err(Error::InvalidConfig(
                "detector.min_aspect must be below detector.max_aspect".into(),
            ));
        }
        Ok(())
    }
}

/// Finds cup-shaped outlines: blur, Canny, outer contours, then a size and
/// aspect-ratio filter.
///
/// Boxes come back sorted left to right. No identity is attached; pair the
/// detector with [`IdentityPolicy::PositionalRelabel`].
///
/// [`IdentityPolicy::PositionalRelabel`]: crate::tracker::IdentityPolicy::PositionalRelabel
#[derive(Debug, Clone, Default)]
pub struct ContourCupDetector {
    config: DetectorConfig,
}

impl ContourCupDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Bounding boxes of every accepted contour, left to right.
    pub fn candidates(&self, frame: &RgbImage) -> Vec<Rect> {
        let gray = image::imageops::grayscale(frame);
        let blurred = imageproc::filter::gaussian_blur_f32(&gray, self.config.blur_sigma);
        let mut edges =
            imageproc::edges::canny(&blurred, self.config.canny_low, self.config.canny_high);
        if self.config.close_radius > 0 {
            edges = imageproc::morphology::close(&edges, Norm::LInf, self.config.close_radius);
        }

        let mut boxes: Vec<Rect> = contours::find_contours::<i32>(&edges)
            .iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .filter_map(|c| {
                let bbox = bounding_rect(c)?;
                self.accepts(polygon_area(c), &bbox).then_some(bbox)
            })
            .collect();

        boxes.sort_by(|a, b| a.x.total_cmp(&b.x));
        debug!(count = boxes.len(), "cup candidates");
        boxes
    }

    fn accepts(&self, area: f64, bbox: &Rect) -> bool {
        let aspect = bbox.aspect_ratio();
        area > self.config.min_area
            && bbox.width > self.config.min_side
            && bbox.height > self.config.min_side
            && aspect > self.config.min_aspect
            && aspect < self.config.max_aspect
    }
}

impl DetectionSource for ContourCupDetector {
    type Error = Infallible;

    fn detect(&mut self, frame: &RgbImage) -> std::result::Result<Vec<Detection>, Self::Error> {
        Ok(self
            .candidates(frame)
            .into_iter()
            .map(|b| {
                DetectionBuilder::new()
                    .tlwh(b.x, b.y, b.width, b.height)
                    .score(1.0)
                    .label("cup")
                    .build()
            })
            .collect())
    }
}

/// Inclusive pixel bounds of a contour.
pub(super) fn bounding_rect(contour: &Contour<i32>) -> Option<Rect> {
    let first = contour.points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &contour.points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(Rect::new(
        min_x as f32,
        min_y as f32,
        (max_x - min_x + 1) as f32,
        (max_y - min_y + 1) as f32,
    ))
}

/// Shoelace area of the closed polygon traced by the contour.
pub(super) fn polygon_area(contour: &Contour<i32>) -> f64 {
    let pts = &contour.points;
    if pts.len() < 3 {
        return 0.0;
    }
    let twice: i64 = pts
        .iter()
        .zip(pts.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    twice.abs() as f64 / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::point::Point;

    fn scene(cups: &[(i32, i32, u32, u32)]) -> RgbImage {
        let mut img = RgbImage::from_pixel(320, 160, Rgb([20, 20, 20]));
        for &(x, y, w, h) in cups {
            draw_filled_rect_mut(
                &mut img,
                imageproc::rect::Rect::at(x, y).of_size(w, h),
                Rgb([230, 230, 230]),
            );
        }
        img
    }

    #[test]
    fn test_polygon_area_square() {
        let contour = Contour {
            points: vec![
                Point::new(0, 0),
                Point::new(10, 0),
                Point::new(10, 10),
                Point::new(0, 10),
            ],
            border_type: BorderType::Outer,
            parent: None,
        };
        assert_eq!(polygon_area(&contour), 100.0);
        assert_eq!(bounding_rect(&contour), Some(Rect::new(0.0, 0.0, 11.0, 11.0)));
    }

    #[test]
    fn test_filter_rejects_thin_and_small() {
        let detector = ContourCupDetector::default();
        assert!(detector.accepts(2400.0, &Rect::new(0.0, 0.0, 40.0, 60.0)));
        assert!(!detector.accepts(400.0, &Rect::new(0.0, 0.0, 40.0, 60.0)));
        assert!(!detector.accepts(2400.0, &Rect::new(0.0, 0.0, 200.0, 30.0)));
        assert!(!detector.accepts(2400.0, &Rect::new(0.0, 0.0, 15.0, 60.0)));
    }

    #[test]
    fn test_detects_three_cups_left_to_right() {
        let frame = scene(&[(220, 50, 50, 60), (30, 50, 50, 60), (125, 50, 50, 60)]);
        let mut detector = ContourCupDetector::default();
        let dets = detector.detect(&frame).unwrap();

        assert_eq!(dets.len(), 3);
        let expected_x = [30.0, 125.0, 220.0];
        for (det, x) in dets.iter().zip(expected_x) {
            assert!((det.bbox.x - x).abs() <= 4.0, "x {} vs {}", det.bbox.x, x);
            assert!((det.bbox.width - 50.0).abs() <= 8.0);
            assert_eq!(det.label.as_deref(), Some("cup"));
        }
    }

    #[test]
    fn test_blank_frame_has_no_cups() {
        let mut detector = ContourCupDetector::default();
        assert!(detector.detect(&scene(&[])).unwrap().is_empty());
    }

    #[test]
    fn test_config_validation() {
        assert!(DetectorConfig::default().validate().is_ok());
        let bad = DetectorConfig {
            slots: 0,
            ..DetectorConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
