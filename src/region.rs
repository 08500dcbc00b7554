//! Screen rectangles and region capture.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::integration::FrameSource;

/// A screen rectangle in absolute desktop coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub top: i32,
    pub left: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(top: i32, left: i32, width: u32, height: u32) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    /// Turn a rectangle dragged on a screenshot of `monitor` into an absolute
    /// region. An empty drag means the user backed out.
    pub fn from_selection(
        monitor: &Region,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    ) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self::new(monitor.top + y, monitor.left + x, width, height))
    }

    /// Setup helper: a missing selection is a hard error.
    pub fn require(selection: Option<Region>) -> Result<Region> {
        selection.ok_or(Error::NoRegionSelected)
    }

    /// Cut this region out of a screenshot of `monitor`.
    pub fn crop_from(&self, screenshot: &RgbImage, monitor: &Region) -> Result<RgbImage> {
        let x = self.left - monitor.left;
        let y = self.top - monitor.top;
        let (w, h) = screenshot.dimensions();
        let fits = x >= 0
            && y >= 0
            && x as u64 + self.width as u64 <= w as u64
            && y as u64 + self.height as u64 <= h as u64;
        if !fits {
            return Err(Error::Capture(format!(
                "region {}x{} at ({}, {}) lies outside the monitor",
                self.width, self.height, self.left, self.top
            )));
        }
        let (x, y) = (x as u32, y as u32);
        Ok(image::imageops::crop_imm(screenshot, x, y, self.width, self.height).to_image())
    }
}

/// Platform screen grabber.
pub trait ScreenGrabber {
    /// Pixels currently shown inside `region`.
    fn grab(&mut self, region: &Region) -> Result<RgbImage>;
}

/// Repeatedly captures one region; never runs dry.
pub struct RegionCapture<G: ScreenGrabber> {
    grabber: G,
    region: Region,
}

impl<G: ScreenGrabber> RegionCapture<G> {
    pub fn new(grabber: G, region: Region) -> Self {
        Self { grabber, region }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }
}

impl<G: ScreenGrabber> FrameSource for RegionCapture<G> {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        self.grabber.grab(&self.region).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_selection_offsets_by_monitor() {
        let monitor = Region::new(0, 1920, 1920, 1080);
        let region = Region::from_selection(&monitor, 100, 50, 640, 480).unwrap();
        assert_eq!(region, Region::new(50, 2020, 640, 480));
    }

    #[test]
    fn test_empty_selection_is_rejected() {
        let monitor = Region::new(0, 0, 1920, 1080);
        let selection = Region::from_selection(&monitor, 10, 10, 0, 40);
        assert!(selection.is_none());
        assert!(matches!(Region::require(selection), Err(Error::NoRegionSelected)));
    }

    #[test]
    fn test_crop_from_screenshot() {
        let monitor = Region::new(0, 0, 8, 8);
        let mut shot = RgbImage::new(8, 8);
        shot.put_pixel(3, 2, Rgb([9, 9, 9]));

        let region = Region::new(2, 3, 2, 2);
        let crop = region.crop_from(&shot, &monitor).unwrap();
        assert_eq!(crop.dimensions(), (2, 2));
        assert_eq!(*crop.get_pixel(0, 0), Rgb([9, 9, 9]));

        assert!(Region::new(6, 6, 4, 4).crop_from(&shot, &monitor).is_err());
    }

    struct Solid;

    impl ScreenGrabber for Solid {
        fn grab(&mut self, region: &Region) -> Result<RgbImage> {
            Ok(RgbImage::new(region.width, region.height))
        }
    }

    #[test]
    fn test_region_capture_yields_region_sized_frames() {
        let mut capture = RegionCapture::new(Solid, Region::new(0, 0, 32, 16));
        let frame = capture.next_frame().unwrap().unwrap();
        assert_eq!(frame.dimensions(), (32, 16));
    }
}
