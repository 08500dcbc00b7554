//! A directory of numbered stills standing in for a video or a capture device.

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::{debug, info};

use super::source::{FrameSource, VideoReader};
use crate::error::{Error, Result};
use crate::recorder::{RecorderConfig, SinkFactory, VideoSink};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Frames read in file-name order from a directory.
#[derive(Debug, Clone)]
pub struct ImageSequence {
    root: PathBuf,
    paths: Vec<PathBuf>,
    cursor: usize,
    fps: f64,
    dimensions: (u32, u32),
}

impl ImageSequence {
    pub fn open(root: impl AsRef<Path>, fps: f64) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(Error::VideoNotFound(root));
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(&root)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        paths.sort();

        let first = paths.first().ok_or_else(|| Error::EmptySequence(root.clone()))?;
        let dimensions = image::image_dimensions(first)?;
        info!(
            path = %root.display(),
            frames = paths.len(),
            width = dimensions.0,
            height = dimensions.1,
            "opened image sequence"
        );

        Ok(Self {
            root,
            paths,
            cursor: 0,
            fps,
            dimensions,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rewind so the next `next_frame` returns the first image again.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        debug!(path = %path.display(), "reading frame");
        Ok(Some(image::open(path)?.to_rgb8()))
    }
}

impl VideoReader for ImageSequence {
    fn frame_count(&self) -> usize {
        self.paths.len()
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn read_frame(&mut self, index: usize) -> Result<RgbImage> {
        let path = self.paths.get(index).ok_or(Error::FrameOutOfRange {
            index,
            frame_count: self.paths.len(),
        })?;
        Ok(image::open(path)?.to_rgb8())
    }
}

/// Writes each frame as `frame_NNNNNN.png` into a directory.
#[derive(Debug)]
pub struct ImageDirSink {
    dir: PathBuf,
    written: usize,
}

impl ImageDirSink {
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, written: 0 })
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl VideoSink for ImageDirSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let path = self.dir.join(format!("frame_{:06}.png", self.written));
        frame.save(&path)?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        info!(frames = self.written, dir = %self.dir.display(), "frames written");
        Ok(())
    }
}

/// Opens an [`ImageDirSink`] in a directory named after the recording, with
/// the extension dropped (`clip.mp4` -> `clip/`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDirSinkFactory;

impl SinkFactory for ImageDirSinkFactory {
    type Sink = ImageDirSink;

    fn create(
        &mut self,
        path: &Path,
        size: (u32, u32),
        config: &RecorderConfig,
    ) -> Result<ImageDirSink> {
        debug!(width = size.0, height = size.1, fps = config.fps, "opening image sink");
        ImageDirSink::create(path.with_extension(""))
    }

    fn discard(&mut self, path: &Path) -> Result<()> {
        let dir = path.with_extension("");
        if dir.is_dir() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}
