//! Conflict resolution strategies.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConflictError;

/// Policy applied when a versioned update loses a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Incoming changes overlay the stored payload.
    LastWriteWins,

    /// The stored payload is kept and the incoming update dropped.
    FirstWriteWins,

    /// Field-level merge; differing fields take the incoming value and are
    /// reported for audit.
    Merge,

    /// Nothing is written; a human reviewer must decide.
    Manual,
}

impl ConflictStrategy {
    /// All strategies, in declaration order.
    pub const ALL: [ConflictStrategy; 4] = [
        ConflictStrategy::LastWriteWins,
        ConflictStrategy::FirstWriteWins,
        ConflictStrategy::Merge,
        ConflictStrategy::Manual,
    ];

    /// Returns the strategy name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::LastWriteWins => "last-write-wins",
            ConflictStrategy::FirstWriteWins => "first-write-wins",
            ConflictStrategy::Merge => "merge",
            ConflictStrategy::Manual => "manual",
        }
    }

    /// Returns true if the strategy settles conflicts without a human.
    pub fn is_automatic(&self) -> bool {
        !matches!(self, ConflictStrategy::Manual)
    }
}

impl std::fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = ConflictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConflictStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| ConflictError::Configuration(format!("unknown conflict strategy '{s}'")))
    }
}
