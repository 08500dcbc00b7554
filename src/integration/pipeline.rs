//! Pipelines combining a detector with the trajectory tracker.

use image::RgbImage;
use tracing::debug;

use super::DetectionSource;
use super::flow::{FlowConfig, LucasKanade, Pyramid};
use crate::tracker::{
    CaptionStyle, IdentityPolicy, Observation, Overlay, Rect, TrackId, TrackerConfig,
    TrackerState, positional_relabel,
};

/// Anything a session can drive frame by frame.
pub trait FramePipeline {
    type Error: std::fmt::Display;

    /// Run one frame through detection and tracking and describe the result.
    fn process_frame(&mut self, frame: &RgbImage) -> Result<Overlay, Self::Error>;

    /// Overlay for the current tracker state, without processing a frame.
    fn overlay(&self) -> Overlay;

    fn tracker(&self) -> &TrackerState;

    fn tracker_mut(&mut self) -> &mut TrackerState;

    /// Drop all tracking state, including any identity bookkeeping.
    fn reset(&mut self);
}

/// A detector re-run on every frame, followed by id assignment and the
/// trajectory tracker.
pub struct TrackerPipeline<D: DetectionSource> {
    detector: D,
    policy: IdentityPolicy,
    tracker: TrackerState,
}

impl<D: DetectionSource> TrackerPipeline<D> {
    pub fn new(detector: D, policy: IdentityPolicy, config: TrackerConfig) -> Self {
        Self {
            detector,
            policy,
            tracker: TrackerState::new(config),
        }
    }

    /// Cup tracking: positional slot ids and default tracker settings.
    pub fn positional(detector: D, slots: usize) -> Self {
        Self::new(
            detector,
            IdentityPolicy::positional(slots),
            TrackerConfig::default(),
        )
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    pub fn policy(&self) -> &IdentityPolicy {
        &self.policy
    }
}

impl<D: DetectionSource> FramePipeline for TrackerPipeline<D> {
    type Error = D::Error;

    fn process_frame(&mut self, frame: &RgbImage) -> Result<Overlay, D::Error> {
        let detections = self.detector.detect(frame)?;
        if detections.is_empty() {
            debug!(frame = self.tracker.frame_count() + 1, "no detections");
        }
        let observations = self.policy.assign(detections);
        self.tracker.update(observations);
        Ok(self.overlay())
    }

    fn overlay(&self) -> Overlay {
        self.tracker.overlay(self.policy.caption_style())
    }

    fn tracker(&self) -> &TrackerState {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut TrackerState {
        &mut self.tracker
    }

    fn reset(&mut self) {
        self.policy.reset();
        self.tracker.reset();
    }
}

/// Cup tracking that runs the detector only periodically and follows each
/// cup's centre with optical flow in between.
///
/// Slot ids are re-derived from left-to-right order on every re-detection;
/// between re-detections each slot follows its own box.
pub struct FlowCupPipeline<D: DetectionSource> {
    detector: D,
    flow: LucasKanade,
    redetect_interval: u64,
    slots: usize,
    boxes: Vec<Rect>,
    previous: Option<Pyramid>,
    tracker: TrackerState,
}

impl<D: DetectionSource> FlowCupPipeline<D> {
    pub fn new(detector: D, slots: usize, flow: &FlowConfig, config: TrackerConfig) -> Self {
        Self {
            detector,
            flow: LucasKanade::from_config(flow),
            redetect_interval: flow.redetect_interval.max(1),
            slots,
            boxes: Vec::new(),
            previous: None,
            tracker: TrackerState::new(config),
        }
    }

    /// Current cup boxes in slot order.
    pub fn boxes(&self) -> &[Rect] {
        &self.boxes
    }

    fn redetect_due(&self) -> bool {
        self.previous.is_none()
            || self.boxes.is_empty()
            || self.tracker.frame_count() % self.redetect_interval == 0
    }
}

impl<D: DetectionSource> FramePipeline for FlowCupPipeline<D> {
    type Error = D::Error;

    fn process_frame(&mut self, frame: &RgbImage) -> Result<Overlay, D::Error> {
        let pyramid = self.flow.pyramid(image::imageops::grayscale(frame));

        if self.redetect_due() {
            let detections = self.detector.detect(frame)?;
            debug!(
                frame = self.tracker.frame_count() + 1,
                count = detections.len(),
                "re-detected cups"
            );
            self.boxes = positional_relabel(detections, self.slots)
                .into_iter()
                .map(|o| o.bbox)
                .collect();
        } else if let Some(previous) = &self.previous {
            let flow = &self.flow;
            let moved: Vec<Rect> = self
                .boxes
                .iter()
                .map(|b| match flow.track_point(previous, &pyramid, b.center()) {
                    Some(center) => b.recentered(center),
                    None => *b,
                })
                .collect();
            self.boxes = moved;
        }

        let observations = self
            .boxes
            .iter()
            .enumerate()
            .map(|(i, b)| Observation::new(TrackId::Num(i as u64 + 1), *b));
        self.tracker.update(observations);
        self.previous = Some(pyramid);

        Ok(self.overlay())
    }

    fn overlay(&self) -> Overlay {
        self.tracker.overlay(CaptionStyle::Slot)
    }

    fn tracker(&self) -> &TrackerState {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut TrackerState {
        &mut self.tracker
    }

    fn reset(&mut self) {
        self.boxes.clear();
        self.previous = None;
        self.tracker.reset();
    }
}
