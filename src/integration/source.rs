//! Traits for the collaborators a tracking session talks to.

use image::RgbImage;

use crate::error::Result;
use crate::tracker::{Detection, Overlay};

/// Produces frames one at a time: a captured screen region, a decoded video,
/// a directory of stills.
pub trait FrameSource {
    /// Next frame, or `Ok(None)` once the source is exhausted.
    ///
    /// Errors for which [`Error::is_transient`] holds only cost the current
    /// frame; the caller may keep pulling.
    ///
    /// [`Error::is_transient`]: crate::Error::is_transient
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Trait for object detection inference backends.
///
/// Implement this trait to connect any detector (or detector + tracker) to
/// a [`TrackerPipeline`]. Backends that track fill in [`Detection::id`].
///
/// # Example
///
/// ```ignore
/// use cuptrack_rs::integration::DetectionSource;
/// use cuptrack_rs::Detection;
///
/// struct MyDetector;
///
/// impl DetectionSource for MyDetector {
///     type Error = std::io::Error;
///
///     fn detect(&mut self, frame: &image::RgbImage) -> Result<Vec<Detection>, Self::Error> {
///         Ok(vec![])
///     }
/// }
/// ```
///
/// [`TrackerPipeline`]: super::TrackerPipeline
pub trait DetectionSource {
    /// Error type for detection failures.
    type Error: std::fmt::Display;

    fn detect(&mut self, frame: &RgbImage) -> std::result::Result<Vec<Detection>, Self::Error>;
}

/// Random access to the frames of a video.
pub trait VideoReader {
    fn frame_count(&self) -> usize;

    fn fps(&self) -> f64;

    /// (width, height) of every frame.
    fn dimensions(&self) -> (u32, u32);

    /// Decode frame `index`; fails with `Error::FrameOutOfRange` past the end.
    fn read_frame(&mut self, index: usize) -> Result<RgbImage>;
}

/// User input gathered by the display between frames.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Leave the loop normally.
    Quit,
    /// Leave the loop, discarding anything in progress.
    Cancel,
    Reset,
    /// Mark the entity with this numeric id (keys 1/2/3 for cups).
    MarkSlot(u64),
    /// Mark whatever is under the pointer.
    Click { x: f32, y: f32 },
    ToggleRecording,
}

/// Shows an annotated frame and reports input received meanwhile.
///
/// This is the only place a session blocks, and the only place it can be
/// told to stop.
pub trait Display {
    fn show(&mut self, frame: &RgbImage, overlay: &Overlay) -> Result<Vec<InputEvent>>;
}
