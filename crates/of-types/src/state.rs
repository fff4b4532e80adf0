//! Run lifecycle states and run types shared with the remote service.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a remote run.
///
/// The declaration order is the server's total order and is relied upon
/// when deciding whether a result may be uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LookupState {
    New,
    Provisional,
    Configured,
    Active,
    Completed,
}

impl LookupState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Provisional => "PROVISIONAL",
            Self::Configured => "CONFIGURED",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
        }
    }

    /// Whether a result may be uploaded for a run in this state without forcing.
    ///
    /// Runs that have not been handed to a worker yet (`<= Configured`) and
    /// runs that already hold a result are refused.
    pub fn accepts_result(&self) -> bool {
        !(*self <= Self::Configured || *self == Self::Completed)
    }
}

impl fmt::Display for LookupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tag recorded with a scenario describing what a run's result holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunType {
    /// A scalar misfit stored directly with the run.
    Misfit,
    /// A path to a file holding the result.
    Path,
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Misfit => f.write_str("MISFIT"),
            Self::Path => f.write_str("PATH"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_ordered() {
        assert!(LookupState::New < LookupState::Provisional);
        assert!(LookupState::Provisional < LookupState::Configured);
        assert!(LookupState::Configured < LookupState::Active);
        assert!(LookupState::Active < LookupState::Completed);
    }

    #[test]
    fn only_active_runs_accept_results() {
        assert!(LookupState::Active.accepts_result());
        for state in [
            LookupState::New,
            LookupState::Provisional,
            LookupState::Configured,
            LookupState::Completed,
        ] {
            assert!(!state.accepts_result(), "{state} should refuse results");
        }
    }

    #[test]
    fn wire_names() {
        assert_eq!(
            serde_json::to_string(&LookupState::Completed).unwrap(),
            "\"COMPLETED\""
        );
        let state: LookupState = serde_json::from_str("\"PROVISIONAL\"").unwrap();
        assert_eq!(state, LookupState::Provisional);
        assert_eq!(serde_json::to_string(&RunType::Path).unwrap(), "\"PATH\"");
        assert_eq!(LookupState::Active.to_string(), "ACTIVE");
    }
}
