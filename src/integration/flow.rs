//! Pyramidal Lucas-Kanade tracking of single points.

use image::GrayImage;
use image::imageops::{self, FilterType};
use nalgebra::{Matrix2, Point2, Vector2};
use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Side of the square integration window, in pixels.
    pub window: usize,
    /// Number of coarser pyramid levels above the full-resolution image.
    pub max_level: usize,
    pub iterations: usize,
    /// Stop refining once an update moves the point less than this.
    pub epsilon: f32,
    /// Run the detector instead of optical flow every this many frames.
    pub redetect_interval: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            window: 15,
            max_level: 2,
            iterations: 10,
            epsilon: 0.03,
            redetect_interval: 10,
        }
    }
}

impl FlowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.redetect_interval == 0 {
            return Err(Error::InvalidConfig(
                "flow.redetect_interval must be at least 1".into(),
            ));
        }
        if self.window < 3 {
            return Err(Error::InvalidConfig("flow.window must be at least 3".into()));
        }
        Ok(())
    }
}

/// Image pyramid; level 0 is full resolution, each further level is half size.
#[derive(Debug, Clone)]
pub struct Pyramid {
    levels: Vec<GrayImage>,
}

impl Pyramid {
    pub fn build(base: GrayImage, max_level: usize) -> Self {
        let mut levels = vec![base];
        for _ in 0..max_level {
            let Some(last) = levels.last() else { break };
            let (w, h) = last.dimensions();
            if w < 16 || h < 16 {
                break;
            }
            let next = imageops::resize(last, w / 2, h / 2, FilterType::Triangle);
            levels.push(next);
        }
        Self { levels }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn base(&self) -> &GrayImage {
        &self.levels[0]
    }
}

/// Sparse optical flow in the coarse-to-fine formulation of Bouguet.
#[derive(Debug, Clone)]
pub struct LucasKanade {
    pub window: usize,
    pub max_level: usize,
    pub iterations: usize,
    pub epsilon: f32,
}

impl Default for LucasKanade {
    fn default() -> Self {
        Self::from_config(&FlowConfig::default())
    }
}

impl LucasKanade {
    pub fn from_config(config: &FlowConfig) -> Self {
        Self {
            window: config.window,
            max_level: config.max_level,
            iterations: config.iterations,
            epsilon: config.epsilon,
        }
    }

    pub fn pyramid(&self, gray: GrayImage) -> Pyramid {
        Pyramid::build(gray, self.max_level)
    }

    /// Where `point` in `prev` moved to in `next`.
    ///
    /// Returns `None` when the window has too little texture to solve for
    /// motion or the point leaves the image.
    pub fn track_point(
        &self,
        prev: &Pyramid,
        next: &Pyramid,
        point: Point2<f32>,
    ) -> Option<Point2<f32>> {
        let levels = prev.len().min(next.len());
        if levels == 0 {
            return None;
        }
        let half = (self.window / 2) as i32;
        let mut guess = Vector2::<f32>::zeros();

        for level in (0..levels).rev() {
            let scale = (1u32 << level) as f32;
            let p = point.coords / scale;
            let prev_img = &prev.levels[level];
            let next_img = &next.levels[level];

            let mut gradient = Matrix2::<f32>::zeros();
            let mut samples = Vec::with_capacity(self.window * self.window);
            for dy in -half..=half {
                for dx in -half..=half {
                    let x = p.x + dx as f32;
                    let y = p.y + dy as f32;
                    let ix = (sample(prev_img, x + 1.0, y) - sample(prev_img, x - 1.0, y)) * 0.5;
                    let iy = (sample(prev_img, x, y + 1.0) - sample(prev_img, x, y - 1.0)) * 0.5;
                    gradient += Matrix2::new(ix * ix, ix * iy, ix * iy, iy * iy);
                    samples.push((x, y, ix, iy, sample(prev_img, x, y)));
                }
            }

            if gradient.determinant().abs() < 1e-3 {
                return None;
            }
            let inverse = gradient.try_inverse()?;

            let mut v = Vector2::<f32>::zeros();
            for _ in 0..self.iterations {
                let mut mismatch = Vector2::<f32>::zeros();
                for &(x, y, ix, iy, intensity) in &samples {
                    let diff = intensity - sample(next_img, x + guess.x + v.x, y + guess.y + v.y);
                    mismatch += Vector2::new(diff * ix, diff * iy);
                }
                let step = inverse * mismatch;
                v += step;
                if step.norm() < self.epsilon {
                    break;
                }
            }

            let d = guess + v;
            guess = if level > 0 { d * 2.0 } else { d };
        }

        let tracked = Point2::from(point.coords + guess);
        let (w, h) = prev.base().dimensions();
        let inside = tracked.x >= 0.0
            && tracked.y >= 0.0
            && tracked.x <= (w - 1) as f32
            && tracked.y <= (h - 1) as f32;
        (inside && tracked.coords.iter().all(|c| c.is_finite())).then_some(tracked)
    }
}

/// Bilinear sample with coordinates clamped to the image.
fn sample(img: &GrayImage, x: f32, y: f32) -> f32 {
    let (w, h) = img.dimensions();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let at = |px: u32, py: u32| img.get_pixel(px, py)[0] as f32;
    let top = at(x0, y0) * (1.0 - fx) + at(x1, y0) * fx;
    let bottom = at(x0, y1) * (1.0 - fx) + at(x1, y1) * fx;
    top * (1.0 - fy) + bottom * fy
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn blob(cx: f32, cy: f32) -> GrayImage {
        GrayImage::from_fn(96, 96, |x, y| {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let v = 20.0 + 200.0 * (-(dx * dx + dy * dy) / (2.0 * 36.0)).exp();
            Luma([v as u8])
        })
    }

    #[test]
    fn test_tracks_shifted_blob() {
        let lk = LucasKanade::default();
        let prev = lk.pyramid(blob(48.0, 48.0));
        let next = lk.pyramid(blob(50.0, 49.0));

        let tracked = lk.track_point(&prev, &next, Point2::new(48.0, 48.0)).unwrap();
        assert!((tracked.x - 50.0).abs() < 0.5, "x = {}", tracked.x);
        assert!((tracked.y - 49.0).abs() < 0.5, "y = {}", tracked.y);
    }

    #[test]
    fn test_flat_region_is_lost() {
        let lk = LucasKanade::default();
        let flat = GrayImage::from_pixel(64, 64, Luma([128]));
        let prev = lk.pyramid(flat.clone());
        let next = lk.pyramid(flat);
        assert!(lk.track_point(&prev, &next, Point2::new(32.0, 32.0)).is_none());
    }

    #[test]
    fn test_pyramid_halves() {
        let pyramid = Pyramid::build(GrayImage::new(64, 48), 2);
        assert_eq!(pyramid.len(), 3);
        assert_eq!(pyramid.levels[2].dimensions(), (16, 12));
    }

    #[test]
    fn test_zero_redetect_interval_rejected() {
        let config = FlowConfig {
            redetect_interval: 0,
            ..FlowConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
