//! Integration module for connecting capture, detection and display
//! collaborators with the trajectory tracker.
//!
//! The traits in `source` describe the collaborators; the rest are the
//! pieces the crate ships: contour and colour cup detectors, Lucas-Kanade tracking,
//! detection replay, an image-directory backend and an overlay renderer.

mod builder;
mod color;
mod contour;
mod flow;
mod headless;
mod pipeline;
mod render;
mod replay;
mod sequence;
mod session;
mod source;

pub use builder::DetectionBuilder;
pub use color::{ColorConfig, ColorCupDetector};
pub use contour::{ContourCupDetector, DetectorConfig};
pub use flow::{FlowConfig, LucasKanade, Pyramid};
pub use headless::HeadlessDisplay;
pub use pipeline::{FlowCupPipeline, FramePipeline, TrackerPipeline};
pub use render::render_overlay;
pub use replay::{DetectionFilter, ReplayDetector, non_max_suppression};
pub use sequence::{ImageDirSink, ImageDirSinkFactory, ImageSequence};
pub use session::{SessionStats, run_session};
pub use source::{DetectionSource, Display, FrameSource, InputEvent, VideoReader};
