//! Shared log of step invocations.

use std::sync::{Arc, Mutex, PoisonError};

/// Which side of a step was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Execute,
    Compensate,
}

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCall {
    pub kind: CallKind,
    /// The action (or compensating action) name.
    pub action: String,
    pub record_id: String,
}

/// Ordered invocation log, shareable between step handlers so the relative
/// order of calls across steps is visible.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<StepCall>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: CallKind, action: impl Into<String>, record_id: impl Into<String>) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StepCall {
                kind,
                action: action.into(),
                record_id: record_id.into(),
            });
    }

    /// Copies of every call, oldest first.
    pub fn calls(&self) -> Vec<StepCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of executed actions, in call order.
    pub fn executed(&self) -> Vec<String> {
        self.actions(CallKind::Execute)
    }

    /// Names of compensating actions, in call order.
    pub fn compensated(&self) -> Vec<String> {
        self.actions(CallKind::Compensate)
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn actions(&self, kind: CallKind) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|call| call.kind == kind)
            .map(|call| call.action.clone())
            .collect()
    }
}
