//! Failure toggles for in-memory step handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{Result, SagaError};

/// Shared switches that make a handler fail or stall on demand.
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch {
    fail_on_execute: Arc<AtomicBool>,
    fail_on_compensate: Arc<AtomicBool>,
    execute_delay_ms: Arc<AtomicU64>,
}

impl FaultSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the handler to fail every execute call.
    pub fn set_fail_on_execute(&self, fail: bool) {
        self.fail_on_execute.store(fail, Ordering::SeqCst);
    }

    /// Configures the handler to fail every compensate call.
    pub fn set_fail_on_compensate(&self, fail: bool) {
        self.fail_on_compensate.store(fail, Ordering::SeqCst);
    }

    /// Makes every execute call sleep before doing any work.
    pub fn set_execute_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.execute_delay_ms.store(millis, Ordering::SeqCst);
    }

    pub(crate) async fn before_execute(&self, action: &str) -> Result<()> {
        let delay = self.execute_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_on_execute.load(Ordering::SeqCst) {
            return Err(SagaError::StepExecution {
                step: action.to_string(),
                reason: "service unavailable".to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn before_compensate(&self, action: &str) -> Result<()> {
        if self.fail_on_compensate.load(Ordering::SeqCst) {
            return Err(SagaError::Compensation {
                step: action.to_string(),
                reason: "service unavailable".to_string(),
            });
        }
        Ok(())
    }
}
