//! HSV threshold cup detector.

use std::convert::Infallible;

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::{self, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};
use serde::Deserialize;
use tracing::debug;

use super::DetectionSource;
use super::builder::DetectionBuilder;
use super::contour::{bounding_rect, polygon_area};
use crate::error::{Error, Result};
use crate::tracker::{Detection, Rect};

/// Thresholds for [`ColorCupDetector`].
///
/// HSV bounds use the 8-bit convention: hue in `0..=180`, saturation and
/// value in `0..=255`. The default band accepts anything not too dark.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    /// Inclusive lower `[h, s, v]` bound.
    pub lower: [u8; 3],
    /// Inclusive upper `[h, s, v]` bound.
    pub upper: [u8; 3],
    /// Radius of the square close and open kernels; 2 is a 5x5 kernel.
    pub kernel_radius: u8,
    /// Minimum enclosed contour area, in pixels.
    pub min_area: f64,
    /// Minimum width and height of an accepted box.
    pub min_side: f32,
    /// Number of cups in play.
    pub slots: usize,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            lower: [0, 0, 50],
            upper: [180, 255, 255],
            kernel_radius: 2,
            min_area: 1000.0,
            min_side: 30.0,
            slots: 3,
        }
    }
}

impl ColorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.slots == 0 {
            return Err(Error::InvalidConfig("color.slots must be at least 1".into()));
        }
        if self.upper[0] > 180 {
            return Err(Error::InvalidConfig("color.upper hue must not exceed 180".into()));
        }
        if self.lower.iter().zip(&self.upper).any(|(lo, hi)| lo > hi) {
            return Err(Error::InvalidConfig(
                "color.lower must not exceed color.upper in any channel".into(),
            ));
        }
        Ok(())
    }
}

/// 8-bit HSV of one pixel: hue halved into `0..=180`.
fn hsv(Rgb([r, g, b]): Rgb<u8>) -> [u8; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };
    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    [(h / 2.0).round() as u8, s.round() as u8, max as u8]
}

/// Finds cups as bright blobs: HSV band mask, close then open, outer
/// contours, then an area and size filter.
///
/// Boxes come back sorted left to right, at most `slots` of them.
#[derive(Debug, Clone, Default)]
pub struct ColorCupDetector {
    config: ColorConfig,
}

impl ColorCupDetector {
    pub fn new(config: ColorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ColorConfig {
        &self.config
    }

    /// Binary mask of the pixels inside the HSV band.
    pub fn mask(&self, frame: &RgbImage) -> GrayImage {
        let (lower, upper) = (self.config.lower, self.config.upper);
        GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
            let px = hsv(*frame.get_pixel(x, y));
            let inside = (0..3).all(|c| lower[c] <= px[c] && px[c] <= upper[c]);
            Luma([if inside { 255 } else { 0 }])
        })
    }

    pub fn candidates(&self, frame: &RgbImage) -> Vec<Rect> {
        let mut mask = self.mask(frame);
        let radius = self.config.kernel_radius;
        if radius > 0 {
            mask = close(&mask, Norm::LInf, radius);
            mask = open(&mask, Norm::LInf, radius);
        }

        let mut found: Vec<(Rect, f64)> = contours::find_contours::<i32>(&mask)
            .iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .filter_map(|c| {
                let area = polygon_area(c);
                let bbox = bounding_rect(c)?;
                self.accepts(area, &bbox).then_some((bbox, area))
            })
            .collect();

        if found.len() > self.config.slots {
            found.sort_by(|a, b| b.1.total_cmp(&a.1));
            found.truncate(self.config.slots);
        }
        let mut boxes: Vec<Rect> = found.into_iter().map(|(bbox, _)| bbox).collect();
        boxes.sort_by(|a, b| a.x.total_cmp(&b.x));
        debug!(count = boxes.len(), "color cup candidates");
        boxes
    }

    fn accepts(&self, area: f64, bbox: &Rect) -> bool {
        area > self.config.min_area
            && bbox.width > self.config.min_side
            && bbox.height > self.config.min_side
    }
}

impl DetectionSource for ColorCupDetector {
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

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut};

    const CUP: Rgb<u8> = Rgb([200, 60, 40]);

    fn table() -> RgbImage {
        RgbImage::from_pixel(400, 160, Rgb([20, 20, 20]))
    }

    fn paint(img: &mut RgbImage, x: i32, y: i32, w: u32, h: u32) {
        draw_filled_rect_mut(img, imageproc::rect::Rect::at(x, y).of_size(w, h), CUP);
    }

    #[test]
    fn test_hsv_conversion() {
        assert_eq!(hsv(Rgb([0, 0, 0])), [0, 0, 0]);
        assert_eq!(hsv(Rgb([255, 255, 255])), [0, 0, 255]);
        assert_eq!(hsv(Rgb([255, 0, 0])), [0, 255, 255]);
        assert_eq!(hsv(Rgb([0, 255, 0])), [60, 255, 255]);
        assert_eq!(hsv(Rgb([0, 0, 255])), [120, 255, 255]);
        assert_eq!(hsv(Rgb([255, 0, 255])), [150, 255, 255]);
    }

    #[test]
    fn test_three_cups_left_to_right() {
        let mut frame = table();
        paint(&mut frame, 280, 40, 60, 70);
        paint(&mut frame, 20, 40, 60, 70);
        paint(&mut frame, 150, 40, 60, 70);

        let mut detector = ColorCupDetector::default();
        let dets = detector.detect(&frame).unwrap();

        assert_eq!(dets.len(), 3);
        for (det, x) in dets.iter().zip([20.0, 150.0, 280.0]) {
            assert!((det.bbox.x - x).abs() <= 2.0, "x {} vs {}", det.bbox.x, x);
            assert!((det.bbox.width - 60.0).abs() <= 2.0);
            assert!((det.bbox.height - 70.0).abs() <= 2.0);
            assert_eq!(det.label.as_deref(), Some("cup"));
        }
    }

    #[test]
    fn test_small_blobs_and_thin_lines_dropped() {
        let mut frame = table();
        paint(&mut frame, 40, 40, 60, 70);
        paint(&mut frame, 200, 60, 20, 20);
        draw_line_segment_mut(&mut frame, (250.0, 20.0), (390.0, 140.0), CUP);

        let boxes = ColorCupDetector::default().candidates(&frame);
        assert_eq!(boxes.len(), 1);
        assert!((boxes[0].x - 40.0).abs() <= 2.0);
    }

    #[test]
    fn test_extra_blobs_keep_largest() {
        let mut frame = table();
        paint(&mut frame, 10, 40, 40, 40);
        paint(&mut frame, 80, 30, 60, 80);
        paint(&mut frame, 170, 30, 60, 80);
        paint(&mut frame, 260, 30, 60, 80);

        let boxes = ColorCupDetector::default().candidates(&frame);
        let xs: Vec<f32> = boxes.iter().map(|b| b.x.round()).collect();
        assert_eq!(xs, vec![80.0, 170.0, 260.0]);
    }

    #[test]
    fn test_dark_frame_has_no_cups() {
        assert!(ColorCupDetector::default().candidates(&table()).is_empty());
    }

    #[test]
    fn test_config_validation() {
        assert!(ColorConfig::default().validate().is_ok());
        let inverted = ColorConfig {
            lower: [0, 0, 200],
            upper: [180, 255, 100],
            ..ColorConfig::default()
        };
        assert!(inverted.validate().is_err());
        let hue = ColorConfig {
            upper: [200, 255, 255],
            ..ColorConfig::default()
        };
        assert!(hue.validate().is_err());
    }
}
