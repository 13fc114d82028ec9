/// Request state definitions for tracking queue progress
///
/// Every URL in a durable queue is in exactly one of these states.
use std::fmt;

/// Represents the current state of a queued URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    // ===== Active States =====
    /// Accepted into the queue and waiting for a worker
    Pending,

    /// Claimed by a worker and currently being processed
    InFlight,

    // ===== Terminal States =====
    /// Processed to completion
    Handled,

    /// Retry budget exhausted
    Failed,

    /// Dequeued after the product limit was reached; never fetched
    Skipped,
}

impl RequestState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Returns true if this is an active state (the URL may still be processed)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::InFlight)
    }

    /// Returns true if this represents an error state
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Converts the state to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Handled => "handled",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Parses a state from a database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_flight" => Some(Self::InFlight),
            "handled" => Some(Self::Handled),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Returns all possible request states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::InFlight,
            Self::Handled,
            Self::Failed,
            Self::Skipped,
        ]
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(!RequestState::Pending.is_terminal());
        assert!(!RequestState::InFlight.is_terminal());

        assert!(RequestState::Handled.is_terminal());
        assert!(RequestState::Failed.is_terminal());
        assert!(RequestState::Skipped.is_terminal());
    }

    #[test]
    fn test_is_error() {
        assert!(RequestState::Failed.is_error());
        assert!(!RequestState::Skipped.is_error());
        assert!(!RequestState::Handled.is_error());
    }

    #[test]
    fn test_roundtrip_db_string() {
        for state in RequestState::all_states() {
            let db_str = state.to_db_string();
            assert_eq!(Some(state), RequestState::from_db_string(db_str));
        }
        assert_eq!(RequestState::from_db_string("fetching"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", RequestState::InFlight), "in_flight");
    }
}
