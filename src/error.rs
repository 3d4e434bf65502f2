//! Error taxonomy for script runs and the scan boundary.

use thiserror::Error;

use crate::resolver::ResolveError;

/// Why a run ended in `RunOutcome::Err`.
///
/// The `Display` form is the diagnostic message handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    /// The interpreter instance could not be created. Never retried.
    #[error("context allocation failed")]
    Allocation,

    #[error("{0}")]
    PathResolution(#[from] ResolveError),

    /// The state exists but its standard libraries could not be opened.
    #[error("capability registration failed: {0}")]
    Registration(String),

    /// The chunk could not be read or did not parse.
    #[error("{0}")]
    ScriptLoad(String),

    /// The chunk raised an error while running.
    #[error("{0}")]
    ScriptRuntime(String),

    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    /// A panic escaped from inside the context and was caught at the harness boundary.
    #[error("interpreter fault: {0}")]
    Internal(String),
}

impl RunError {
    /// Short machine-friendly name used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::Allocation => "allocation",
            RunError::PathResolution(_) => "path_resolution",
            RunError::Registration(_) => "registration",
            RunError::ScriptLoad(_) => "script_load",
            RunError::ScriptRuntime(_) => "script_runtime",
            RunError::BudgetExceeded(_) => "budget_exceeded",
            RunError::Internal(_) => "internal",
        }
    }
}

/// Failures reported by a radio driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DriverError(pub String);

impl DriverError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// Radio or supporting stack failed to come up. The subsystem was released again.
    #[error("scan subsystem acquisition failed: {0}")]
    SubsystemAcquisition(DriverError),

    #[error("scan failed: {0}")]
    ScanFailed(DriverError),

    /// A lease is still outstanding. This is a precondition violation, not a retryable state.
    #[error("scan subsystem already acquired")]
    AlreadyAcquired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_reported_apart_from_allocation() {
        let err = RunError::Registration("not enough memory".into());
        assert_eq!(err.kind(), "registration");
        assert_eq!(err.to_string(), "capability registration failed: not enough memory");
        assert_ne!(err.kind(), RunError::Allocation.kind());
    }
}
