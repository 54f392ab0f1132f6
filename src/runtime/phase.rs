//! Worker lifecycle phases

use crate::error::{SwcacheError, SwcacheResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a worker within its registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Install work is running
    Installing,
    /// Installed, waiting for the previous version to let go
    Waiting,
    /// Activated and handling fetches for its clients
    Active,
    /// Replaced by a newer version or failed to install
    Superseded,
}

impl Phase {
    /// Whether `self -> next` is a permitted transition.
    ///
    /// `Active -> Active` is allowed so activation can be re-run.
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;

        matches!(
            (self, next),
            (Installing, Waiting)
                | (Installing, Superseded)
                | (Waiting, Active)
                | (Waiting, Superseded)
                | (Active, Active)
                | (Active, Superseded)
        )
    }

    /// Validate and return the next phase
    pub fn transition(self, next: Phase) -> SwcacheResult<Phase> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(SwcacheError::InvalidPhase {
                from: self,
                to: next,
            })
        }
    }

    /// Only active workers intercept fetches
    pub fn handles_fetch(self) -> bool {
        self == Phase::Active
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Superseded
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Installing => "installing",
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Superseded => "superseded",
        };
        f.write_str(name)
    }
}
