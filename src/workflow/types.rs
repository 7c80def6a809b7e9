use crate::readiness::PollState;

/// Result of `launch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// A new instance was created; carries where the readiness wait ended.
    Created(PollState),
    /// An existing stopped instance was started.
    Started,
    AlreadyRunning,
}

/// Result of `start` and `stop`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed,
    /// The instance was already in the requested state; nothing was called.
    Unchanged,
}

/// Result of `delete`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Nothing to delete.
    Absent,
    /// The confirmation was declined.
    Cancelled,
}

/// Result of `ensure_mounted`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    Mounted,
    AlreadyMounted,
}

/// Result of `status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Absent,
    Present { running: bool, details: String },
}
