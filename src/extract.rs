//! Dumping selected video frames to numbered image files.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::integration::VideoReader;

/// Output image encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Png,
    Jpg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpg => "jpg",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpg),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Which frames to pull out of the video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Every `step`-th frame of `[start, end)`, at most `max` of them.
    Range {
        start: usize,
        end: Option<usize>,
        step: usize,
        max: Option<usize>,
    },
    /// An explicit list of indices.
    Frames(Vec<usize>),
}

impl Default for ExtractionMode {
    fn default() -> Self {
        ExtractionMode::Range {
            start: 0,
            end: None,
            step: 1,
            max: None,
        }
    }
}

impl ExtractionMode {
    /// Resolve to the concrete, ascending list of frame indices for a video
    /// with `total` frames.
    pub fn plan(&self, total: usize) -> Result<Vec<usize>> {
        match self {
            ExtractionMode::Range {
                start,
                end,
                step,
                max,
            } => {
                if *step == 0 {
                    return Err(Error::InvalidConfig("step must be at least 1".into()));
                }
                let end = end.map_or(total, |e| e.min(total));
                let limit = max.unwrap_or(usize::MAX);
                Ok((*start..end).step_by(*step).take(limit).collect())
            }
            ExtractionMode::Frames(indices) => {
                let mut indices = indices.clone();
                indices.sort_unstable();
                indices.dedup();
                let (valid, skipped): (Vec<usize>, Vec<usize>) =
                    indices.into_iter().partition(|&i| i < total);
                for index in skipped {
                    warn!(index, total, "frame out of range, skipping");
                }
                Ok(valid)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub output_dir: PathBuf,
    pub written: usize,
}

/// `videos/clip.mp4` -> `clip_frames`, relative to the working directory.
pub fn default_output_dir(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    PathBuf::from(format!("{}_frames", stem))
}

pub struct FrameExtractor {
    output_dir: PathBuf,
    format: ImageFormat,
    prefix: String,
}

impl FrameExtractor {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            format: ImageFormat::default(),
            prefix: "frame".to_string(),
        }
    }

    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn file_name(&self, index: usize) -> String {
        format!("{}_{:06}.{}", self.prefix, index, self.format.extension())
    }

    pub fn extract<R: VideoReader>(
        &self,
        reader: &mut R,
        mode: &ExtractionMode,
    ) -> Result<ExtractionSummary> {
        let total = reader.frame_count();
        let (width, height) = reader.dimensions();
        info!(
            frames = total,
            fps = reader.fps(),
            width,
            height,
            "video opened"
        );

        let plan = mode.plan(total)?;
        fs::create_dir_all(&self.output_dir)?;

        let mut written = 0;
        for index in plan {
            let frame = match reader.read_frame(index) {
                Ok(frame) => frame,
                Err(err) if err.is_transient() => {
                    warn!(index, error = %err, "could not read frame");
                    continue;
                }
                Err(err) => return Err(err),
            };
            let path = self.output_dir.join(self.file_name(index));
            frame.save(&path)?;
            debug!(path = %path.display(), "frame saved");
            written += 1;
        }

        info!(written, dir = %self.output_dir.display(), "extraction finished");
        Ok(ExtractionSummary {
            output_dir: self.output_dir.clone(),
            written,
        })
    }
}
