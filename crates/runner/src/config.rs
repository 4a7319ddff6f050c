//! Runner configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use conflict::ConflictStrategy;
use saga::{CompensationPolicy, CoordinatorConfig};

use crate::error::{Result, RunnerError};

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(RunnerError::Configuration(format!(
                "unknown log format '{other}'"
            ))),
        }
    }
}

/// Runner configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `SAGA_STEP_TIMEOUT_MS`: per-step timeout (default: `30000`)
/// - `SAGA_COMPENSATION_POLICY`: `continue` or `halt` (default: `continue`)
/// - `SAGA_CONCURRENCY`: number of sagas submitted at once (default: `4`)
/// - `SAGA_FAIL_AT_STEP`: inject a failure at this step index (default: unset)
/// - `CONFLICT_STRATEGY`: strategy for quota update races (default: `last-write-wins`)
/// - `PRINT_METRICS`: print the Prometheus exposition on exit (default: `false`)
///
/// Unparseable numbers and flags fall back to their defaults. An unknown
/// conflict strategy or compensation policy is an error.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_format: LogFormat,
    pub step_timeout: Duration,
    pub compensation_policy: CompensationPolicy,
    pub concurrency: usize,
    pub fail_at_step: Option<usize>,
    pub conflict_strategy: ConflictStrategy,
    pub print_metrics: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let compensation_policy = match std::env::var("SAGA_COMPENSATION_POLICY") {
            Ok(value) => value.trim().parse()?,
            Err(_) => defaults.compensation_policy,
        };
        let conflict_strategy = match std::env::var("CONFLICT_STRATEGY") {
            Ok(value) => value.trim().parse()?,
            Err(_) => defaults.conflict_strategy,
        };

        Ok(Self {
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: std::env::var("LOG_FORMAT")
                .ok()
                .and_then(|f| f.parse().ok())
                .unwrap_or(defaults.log_format),
            step_timeout: parsed::<u64>("SAGA_STEP_TIMEOUT_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.step_timeout),
            compensation_policy,
            concurrency: parsed::<usize>("SAGA_CONCURRENCY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.concurrency),
            fail_at_step: parsed("SAGA_FAIL_AT_STEP"),
            conflict_strategy,
            print_metrics: parsed("PRINT_METRICS").unwrap_or(defaults.print_metrics),
        })
    }

    /// The coordinator settings this configuration implies.
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            step_timeout: self.step_timeout,
            compensation_policy: self.compensation_policy,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            step_timeout: Duration::from_secs(30),
            compensation_policy: CompensationPolicy::ContinueOnError,
            concurrency: 4,
            fail_at_step: None,
            conflict_strategy: ConflictStrategy::LastWriteWins,
            print_metrics: false,
        }
    }
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
