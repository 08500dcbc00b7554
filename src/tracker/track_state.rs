/// Visibility of a tracked entity in the most recent frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    /// Reported by the detector this frame
    #[default]
    Tracked,
    /// Absent this frame but still inside its grace period
    Lost,
}
