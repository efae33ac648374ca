use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a partition's stream processor
///
/// ```text
/// INITIALIZING → REPLAYING → PROCESSING ⇄ PAUSED
///        any non-terminal phase → FAILED → CLOSED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamProcessorPhase {
    Initializing,
    Replaying,
    Processing,
    Paused,
    Failed,
    Closed,
}

impl StreamProcessorPhase {
    pub fn can_transition_to(self, next: StreamProcessorPhase) -> bool {
        use StreamProcessorPhase::*;
        match (self, next) {
            (Initializing, Replaying) => true,
            (Replaying, Processing) => true,
            (Processing, Paused) | (Paused, Processing) => true,
            (Initializing | Replaying | Processing | Paused, Failed) => true,
            (Initializing | Replaying | Processing | Paused | Failed, Closed) => true,
            _ => false,
        }
    }

    /// No records will be read in this phase again.
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamProcessorPhase::Failed | StreamProcessorPhase::Closed)
    }
}

impl fmt::Display for StreamProcessorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamProcessorPhase::Initializing => "INITIALIZING",
            StreamProcessorPhase::Replaying => "REPLAYING",
            StreamProcessorPhase::Processing => "PROCESSING",
            StreamProcessorPhase::Paused => "PAUSED",
            StreamProcessorPhase::Failed => "FAILED",
            StreamProcessorPhase::Closed => "CLOSED",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::StreamProcessorPhase::*;

    #[test]
    fn allowed_transitions() {
        assert!(Initializing.can_transition_to(Replaying));
        assert!(Replaying.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Closed));

        assert!(!Initializing.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Closed.can_transition_to(Replaying));
        assert!(!Processing.can_transition_to(Replaying));
    }
}
