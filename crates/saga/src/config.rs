//! Coordinator settings and per-submission options.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cancel::CancellationSignal;
use crate::error::SagaError;

/// What the reverse pass does when a compensating action fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompensationPolicy {
    /// Record the failure and keep compensating earlier steps.
    #[default]
    ContinueOnError,
    /// Stop at the first failure; earlier steps are reported as skipped.
    HaltOnError,
}

impl CompensationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompensationPolicy::ContinueOnError => "continue",
            CompensationPolicy::HaltOnError => "halt",
        }
    }
}

impl std::fmt::Display for CompensationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompensationPolicy {
    type Err = SagaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" | "continue-on-error" => Ok(CompensationPolicy::ContinueOnError),
            "halt" | "halt-on-error" => Ok(CompensationPolicy::HaltOnError),
            other => Err(SagaError::Configuration(format!(
                "unknown compensation policy '{other}'"
            ))),
        }
    }
}

/// Coordinator-wide settings.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Upper bound on a single `execute` or `compensate` call.
    pub step_timeout: Duration,
    pub compensation_policy: CompensationPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(30),
            compensation_policy: CompensationPolicy::default(),
        }
    }
}

/// Options for a single submission.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Overrides the coordinator's step timeout.
    pub step_timeout: Option<Duration>,
    /// Fails the step at this index before its `execute` runs.
    pub fail_at_step: Option<usize>,
    pub cancellation: Option<CancellationSignal>,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    pub fn fail_at_step(mut self, index: usize) -> Self {
        self.fail_at_step = Some(index);
        self
    }

    pub fn with_cancellation(mut self, signal: CancellationSignal) -> Self {
        self.cancellation = Some(signal);
        self
    }
}
