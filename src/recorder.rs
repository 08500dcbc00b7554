//! Screen-region recording: a record/stop/cancel state machine over a frame
//! source and a video sink.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use image::RgbImage;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::integration::{Display, FrameSource, InputEvent};
use crate::region::Region;
use crate::tracker::Overlay;

/// Destination for encoded frames.
pub trait VideoSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Flush and close. Called once, when recording stops normally.
    fn finish(&mut self) -> Result<()>;
}

/// Opens a fresh sink each time recording starts.
pub trait SinkFactory {
    type Sink: VideoSink;

    fn create(
        &mut self,
        path: &Path,
        size: (u32, u32),
        config: &RecorderConfig,
    ) -> Result<Self::Sink>;

    /// Remove whatever a cancelled recording left at `path`.
    fn discard(&mut self, path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Output file; a timestamped name in the working directory when unset.
    pub output: Option<PathBuf>,
    pub fps: u32,
    /// FourCC handed to the encoder.
    pub codec: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output: None,
            fps: 30,
            codec: "mp4v".to_string(),
        }
    }
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(Error::InvalidConfig("recorder.fps must be at least 1".into()));
        }
        if self.codec.len() != 4 {
            return Err(Error::InvalidConfig(format!(
                "recorder.codec must be a four-character code, got {:?}",
                self.codec
            )));
        }
        Ok(())
    }
}

/// `screen_recording_YYYYmmdd_HHMMSS.mp4`
pub fn default_output_path(now: DateTime<Local>) -> PathBuf {
    PathBuf::from(format!("screen_recording_{}.mp4", now.format("%Y%m%d_%H%M%S")))
}

/// Append `.mp4` unless the path already ends with it (any case).
pub fn normalize_output_path(path: &Path) -> PathBuf {
    let has_mp4 = path
        .to_str()
        .map(|s| s.to_ascii_lowercase().ends_with(".mp4"))
        .unwrap_or(false);
    if has_mp4 {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_os_string();
        name.push(".mp4");
        PathBuf::from(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub frames: u64,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderControl {
    Continue,
    Exit,
}

pub struct ScreenRecorder<F: SinkFactory> {
    config: RecorderConfig,
    output_path: PathBuf,
    region: Region,
    factory: F,
    sink: Option<F::Sink>,
    frames_recorded: u64,
    started: Option<Instant>,
    last_summary: Option<RecordingSummary>,
}

impl<F: SinkFactory> ScreenRecorder<F> {
    pub fn new(config: RecorderConfig, region: Region, factory: F) -> Result<Self> {
        config.validate()?;
        let output_path = match &config.output {
            Some(path) => normalize_output_path(path),
            None => default_output_path(Local::now()),
        };
        Ok(Self {
            config,
            output_path,
            region,
            factory,
            sink: None,
            frames_recorded: 0,
            started: None,
            last_summary: None,
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn is_recording(&self) -> bool {
        self.sink.is_some()
    }

    pub fn frames_recorded(&self) -> u64 {
        self.frames_recorded
    }

    pub fn elapsed(&self) -> Duration {
        self.started.map(|t| t.elapsed()).unwrap_or_default()
    }

    /// Target time between captured frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.config.fps as f64)
    }

    pub fn start(&mut self) -> Result<()> {
        if self.is_recording() {
            warn!("already recording");
            return Ok(());
        }
        let sink = self.factory.create(
            &self.output_path,
            (self.region.width, self.region.height),
            &self.config,
        )?;
        self.sink = Some(sink);
        self.frames_recorded = 0;
        self.started = Some(Instant::now());
        info!(
            path = %self.output_path.display(),
            fps = self.config.fps,
            codec = %self.config.codec,
            "recording started"
        );
        Ok(())
    }

    pub fn stop(&mut self) -> Result<Option<RecordingSummary>> {
        let Some(mut sink) = self.sink.take() else {
            warn!("not currently recording");
            return Ok(None);
        };
        sink.finish()?;
        let summary = RecordingSummary {
            path: self.output_path.clone(),
            frames: self.frames_recorded,
            duration: self.elapsed(),
        };
        self.started = None;
        info!(
            frames = summary.frames,
            seconds = summary.duration.as_secs_f64(),
            path = %summary.path.display(),
            "recording stopped"
        );
        self.last_summary = Some(summary.clone());
        Ok(Some(summary))
    }

    /// Abandon the recording in progress and delete the partial output.
    pub fn cancel(&mut self) -> Result<()> {
        if self.sink.take().is_none() {
            return Ok(());
        }
        self.started = None;
        self.factory.discard(&self.output_path)?;
        info!("recording cancelled");
        Ok(())
    }

    pub fn toggle(&mut self) -> Result<()> {
        if self.is_recording() {
            self.stop()?;
        } else {
            self.start()?;
        }
        Ok(())
    }

    pub fn record_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if let Some(sink) = self.sink.as_mut() {
            sink.write_frame(frame)?;
            self.frames_recorded += 1;
        }
        Ok(())
    }

    pub fn status_overlay(&self) -> Overlay {
        if self.is_recording() {
            Overlay::status_only(format!(
                "REC Time: {:.1}s | Frames: {}",
                self.elapsed().as_secs_f64(),
                self.frames_recorded
            ))
        } else {
            Overlay::status_only("Ready")
        }
    }

    pub fn handle(&mut self, event: &InputEvent) -> Result<RecorderControl> {
        match event {
            InputEvent::ToggleRecording => self.toggle()?,
            InputEvent::Quit => {
                if self.is_recording() {
                    self.stop()?;
                }
                return Ok(RecorderControl::Exit);
            }
            InputEvent::Cancel => {
                self.cancel()?;
                return Ok(RecorderControl::Exit);
            }
            _ => {}
        }
        Ok(RecorderControl::Continue)
    }

    /// Capture, record and display at the configured frame rate until the
    /// user exits or the source ends. Returns the last finished recording.
    pub fn run<S, D>(&mut self, source: &mut S, display: &mut D) -> Result<Option<RecordingSummary>>
    where
        S: FrameSource,
        D: Display,
    {
        let interval = self.frame_interval();
        loop {
            let tick = Instant::now();
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) if err.is_transient() => {
                    warn!(error = %err, "dropped frame");
                    continue;
                }
                Err(err) => {
                    if self.is_recording() {
                        self.stop()?;
                    }
                    return Err(err);
                }
            };

            self.record_frame(&frame)?;
            for event in display.show(&frame, &self.status_overlay())? {
                if self.handle(&event)? == RecorderControl::Exit {
                    return Ok(self.last_summary.clone());
                }
            }

            if let Some(rest) = interval.checked_sub(tick.elapsed()) {
                thread::sleep(rest);
            }
        }

        if self.is_recording() {
            self.stop()?;
        }
        Ok(self.last_summary.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Default)]
    struct CountingSink {
        frames: usize,
    }

    impl VideoSink for CountingSink {
        fn write_frame(&mut self, _frame: &RgbImage) -> Result<()> {
            self.frames += 1;
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        created: usize,
    }

    impl SinkFactory for CountingFactory {
        type Sink = CountingSink;

        fn create(
            &mut self,
            path: &Path,
            _size: (u32, u32),
            _config: &RecorderConfig,
        ) -> Result<CountingSink> {
            self.created += 1;
            fs::write(path, b"partial")?;
            Ok(CountingSink::default())
        }
    }

    fn recorder(dir: &Path) -> ScreenRecorder<CountingFactory> {
        let config = RecorderConfig {
            output: Some(dir.join("clip")),
            ..RecorderConfig::default()
        };
        ScreenRecorder::new(config, Region::new(0, 0, 16, 16), CountingFactory::default()).unwrap()
    }

    #[test]
    fn test_output_path_normalization() {
        assert_eq!(normalize_output_path(Path::new("a/clip")), PathBuf::from("a/clip.mp4"));
        assert_eq!(normalize_output_path(Path::new("clip.MP4")), PathBuf::from("clip.MP4"));
        assert_eq!(normalize_output_path(Path::new("clip.avi")), PathBuf::from("clip.avi.mp4"));
    }

    #[test]
    fn test_default_output_path_is_timestamped() {
        let now = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        assert_eq!(
            default_output_path(now),
            PathBuf::from("screen_recording_20240305_140709.mp4")
        );
    }

    #[test]
    fn test_toggle_records_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(dir.path());
        let frame = RgbImage::new(16, 16);

        rec.record_frame(&frame).unwrap();
        assert_eq!(rec.frames_recorded(), 0);

        rec.handle(&InputEvent::ToggleRecording).unwrap();
        assert!(rec.is_recording());
        rec.record_frame(&frame).unwrap();
        rec.record_frame(&frame).unwrap();
        assert_eq!(rec.sink.as_ref().map(|s| s.frames), Some(2));

        let summary = rec.stop().unwrap().unwrap();
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.path, dir.path().join("clip.mp4"));
        assert!(rec.stop().unwrap().is_none());
    }

    #[test]
    fn test_cancel_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(dir.path());
        rec.start().unwrap();
        assert!(dir.path().join("clip.mp4").exists());

        assert_eq!(rec.handle(&InputEvent::Cancel).unwrap(), RecorderControl::Exit);
        assert!(!rec.is_recording());
        assert!(!dir.path().join("clip.mp4").exists());
    }

    #[test]
    fn test_quit_stops_recording() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(dir.path());
        rec.start().unwrap();
        rec.start().unwrap();
        assert_eq!(rec.factory.created, 1);

        assert_eq!(rec.handle(&InputEvent::Quit).unwrap(), RecorderControl::Exit);
        assert!(dir.path().join("clip.mp4").exists());
    }

    #[test]
    fn test_status_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(dir.path());
        assert_eq!(rec.status_overlay().status.as_deref(), Some("Ready"));
        rec.start().unwrap();
        assert!(rec.status_overlay().status.unwrap().starts_with("REC"));
    }

    struct Frames(usize);

    impl FrameSource for Frames {
        fn next_frame(&mut self) -> Result<Option<RgbImage>> {
            if self.0 == 0 {
                return Ok(None);
            }
            self.0 -= 1;
            Ok(Some(RgbImage::new(16, 16)))
        }
    }

    /// Presses SPACE after the second frame.
    #[derive(Default)]
    struct StartAfterTwo {
        shown: usize,
    }

    impl Display for StartAfterTwo {
        fn show(&mut self, _frame: &RgbImage, _overlay: &Overlay) -> Result<Vec<InputEvent>> {
            self.shown += 1;
            Ok(if self.shown == 2 {
                vec![InputEvent::ToggleRecording]
            } else {
                Vec::new()
            })
        }
    }

    #[test]
    fn test_run_records_until_source_ends() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecorderConfig {
            output: Some(dir.path().join("clip.mp4")),
            fps: 1000,
            ..RecorderConfig::default()
        };
        let region = Region::new(0, 0, 16, 16);
        let mut rec = ScreenRecorder::new(config, region, CountingFactory::default()).unwrap();

        let summary = rec
            .run(&mut Frames(5), &mut StartAfterTwo::default())
            .unwrap()
            .unwrap();
        assert_eq!(summary.frames, 3);
        assert!(!rec.is_recording());
    }

    #[test]
    fn test_zero_fps_rejected() {
        let config = RecorderConfig {
            fps: 0,
            ..RecorderConfig::default()
        };
        let region = Region::new(0, 0, 1, 1);
        assert!(ScreenRecorder::new(config, region, CountingFactory::default()).is_err());
    }
}
