//! Crate-wide error type.

use std::path::PathBuf;

/// Errors raised while setting up or running a tracking session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The user dismissed region selection or selected an empty rectangle.
    #[error("no screen region selected")]
    NoRegionSelected,
    /// The input video (or frame directory) does not exist.
    #[error("video not found: {}", .0.display())]
    VideoNotFound(PathBuf),
    /// A frame index past the end of the video was requested.
    #[error("frame {index} out of range (video has {frame_count} frames)")]
    FrameOutOfRange { index: usize, frame_count: usize },
    /// The frame directory exists but holds no readable images.
    #[error("no frames found in {}", .0.display())]
    EmptySequence(PathBuf),
    #[error("unsupported image format: {0} (use png or jpg)")]
    UnsupportedFormat(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("detection failed: {0}")]
    Detection(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the failure only affects the current frame.
    ///
    /// A frame that fails to decode or a detector hiccup is skipped and the
    /// loop moves on; everything else ends the session.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Image(_) | Error::Detection(_) | Error::FrameOutOfRange { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
