mod associator;
mod entity;
mod identity;
mod matching;
mod overlay;
mod rect;
mod state;
mod track_state;

pub use associator::{AssociatorConfig, IouAssociator};
pub use entity::{Observation, TrackId, TrackedEntity};
pub use identity::{IdentityPolicy, positional_relabel};
pub use matching::{AssignmentResult, Detection, iou_distance, linear_assignment};
pub use overlay::{CaptionStyle, Overlay, OverlayBox, Trail};
pub use rect::{Rect, iou_batch};
pub use state::{Prediction, TrackerConfig, TrackerState};
pub use track_state::TrackState;
