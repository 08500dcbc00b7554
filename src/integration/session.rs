//! The blocking capture → track → display loop.

use tracing::{debug, info, warn};

use super::pipeline::FramePipeline;
use super::source::{Display, FrameSource, InputEvent};
use crate::error::Result;
use crate::tracker::{Prediction, TrackId};

/// What happened over a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    /// Frames pulled from the source and shown.
    pub frames: u64,
    /// Frames lost to decode or detection failures.
    pub skipped: u64,
    /// Whether the session ended on a user quit rather than end of stream.
    pub quit_by_user: bool,
    /// Prediction at the moment the loop ended.
    pub final_prediction: Option<Prediction>,
}

/// Drive `pipeline` over `source` until the source runs dry or the user quits.
///
/// Per-frame failures are logged and skipped; only a non-transient source
/// error or a display failure ends the session early. A frame the pipeline
/// fails on is shown with the last known tracking state.
pub fn run_session<S, P, D>(
    source: &mut S,
    pipeline: &mut P,
    display: &mut D,
) -> Result<SessionStats>
where
    S: FrameSource,
    P: FramePipeline,
    D: Display,
{
    let mut stats = SessionStats::default();
    info!("tracking session started");

    'frames: loop {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("frame source exhausted");
                break;
            }
            Err(err) if err.is_transient() => {
                warn!(error = %err, "skipping unreadable frame");
                stats.skipped += 1;
                continue;
            }
            Err(err) => return Err(err),
        };

        let overlay = match pipeline.process_frame(&frame) {
            Ok(overlay) => overlay,
            Err(err) => {
                warn!(error = %err, "tracking failed for frame");
                stats.skipped += 1;
                pipeline.overlay()
            }
        };
        stats.frames += 1;

        for event in display.show(&frame, &overlay)? {
            debug!(?event, "input");
            match event {
                InputEvent::Quit | InputEvent::Cancel => {
                    info!("quit requested");
                    stats.quit_by_user = true;
                    break 'frames;
                }
                InputEvent::Reset => {
                    pipeline.reset();
                    info!("tracking reset");
                }
                InputEvent::MarkSlot(slot) => {
                    pipeline.tracker_mut().mark(&TrackId::Num(slot));
                }
                InputEvent::Click { x, y } => {
                    pipeline.tracker_mut().mark_at(x, y);
                }
                InputEvent::ToggleRecording => {}
            }
        }
    }

    stats.final_prediction = pipeline.tracker().predict();
    info!(
        frames = stats.frames,
        skipped = stats.skipped,
        "tracking session finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::integration::{DetectionSource, TrackerPipeline};
    use crate::tracker::{Detection, Overlay, Rect};
    use image::RgbImage;
    use std::convert::Infallible;

    /// Three frames, the second of which cannot be decoded.
    struct Flaky {
        calls: usize,
    }

    impl FrameSource for Flaky {
        fn next_frame(&mut self) -> Result<Option<RgbImage>> {
            self.calls += 1;
            match self.calls {
                2 => Err(Error::FrameOutOfRange {
                    index: 1,
                    frame_count: 0,
                }),
                1 | 3 | 4 => Ok(Some(RgbImage::new(32, 32))),
                _ => Ok(None),
            }
        }
    }

    struct OneCup;

    impl DetectionSource for OneCup {
        type Error = Infallible;

        fn detect(&mut self, _frame: &RgbImage) -> std::result::Result<Vec<Detection>, Infallible> {
            Ok(vec![Detection::from_rect(Rect::new(4.0, 4.0, 8.0, 8.0), 1.0)])
        }
    }

    struct Keys(Vec<Vec<InputEvent>>);

    impl Display for Keys {
        fn show(&mut self, _frame: &RgbImage, _overlay: &Overlay) -> Result<Vec<InputEvent>> {
            Ok(if self.0.is_empty() { Vec::new() } else { self.0.remove(0) })
        }
    }

    #[test]
    fn test_transient_errors_are_skipped() {
        let mut pipeline = TrackerPipeline::positional(OneCup, 3);
        let mut keys = Keys(vec![vec![InputEvent::MarkSlot(1)]]);

        let stats = run_session(&mut Flaky { calls: 0 }, &mut pipeline, &mut keys).unwrap();
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.skipped, 1);
        assert!(!stats.quit_by_user);
        assert_eq!(
            stats.final_prediction.map(|p| p.bbox),
            Some(Rect::new(4.0, 4.0, 8.0, 8.0))
        );
    }

    /// Finds one cup, but errors on its second call.
    struct Stumbles {
        calls: usize,
    }

    impl DetectionSource for Stumbles {
        type Error = String;

        fn detect(&mut self, _frame: &RgbImage) -> std::result::Result<Vec<Detection>, String> {
            self.calls += 1;
            if self.calls == 2 {
                return Err("inference timed out".to_string());
            }
            Ok(vec![Detection::from_rect(Rect::new(4.0, 4.0, 8.0, 8.0), 1.0)])
        }
    }

    #[derive(Default)]
    struct Recorded {
        overlays: Vec<Overlay>,
    }

    impl Display for Recorded {
        fn show(&mut self, _frame: &RgbImage, overlay: &Overlay) -> Result<Vec<InputEvent>> {
            self.overlays.push(overlay.clone());
            Ok(if self.overlays.len() == 1 {
                vec![InputEvent::MarkSlot(1)]
            } else {
                Vec::new()
            })
        }
    }

    #[test]
    fn test_failed_frame_shows_last_state() {
        let mut pipeline = TrackerPipeline::positional(Stumbles { calls: 0 }, 3);
        let mut display = Recorded::default();

        let stats = run_session(&mut Flaky { calls: 0 }, &mut pipeline, &mut display).unwrap();
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.skipped, 2);

        // Second shown frame is the one detection failed on.
        let failed = &display.overlays[1];
        assert_eq!(failed.boxes.len(), 1);
        assert_eq!(failed.predicted, Some(Rect::new(4.0, 4.0, 8.0, 8.0)));
        assert_eq!(failed.status.as_deref(), Some("Predicted: Cup 1"));
    }

    #[test]
    fn test_reset_event_clears_mark() {
        let mut pipeline = TrackerPipeline::positional(OneCup, 3);
        let mut keys = Keys(vec![vec![InputEvent::MarkSlot(1)], vec![InputEvent::Reset]]);

        let stats = run_session(&mut Flaky { calls: 0 }, &mut pipeline, &mut keys).unwrap();
        assert!(stats.final_prediction.is_none());
        assert!(pipeline.tracker().marked_id().is_none());
    }
}
