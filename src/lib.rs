//! Trajectory history and marked-identity prediction for shell-game cup
//! tracking and general object tracking, plus the small video tools that go
//! with it: frame extraction and screen-region recording.

pub mod config;
pub mod error;
pub mod extract;
pub mod integration;
pub mod recorder;
pub mod region;
pub mod tracker;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use tracker::{
    Detection, IdentityPolicy, Observation, Prediction, Rect, TrackId, TrackerConfig, TrackerState,
};
