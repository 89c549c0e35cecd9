//! Closed error taxonomy shared by the core runtime and the JIT engines.

use thiserror::Error;

/// Runtime error surfaced to front-ends and the scheduler.
///
/// The worker reports batch-level failures and continues with a fresh batch;
/// none of these are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("unknown dtype tag {tag}")]
    UnknownDtype { tag: u32 },
    #[error("unknown guid {guid}")]
    UnknownGuid { guid: u64 },
    #[error("pass pipeline failed: {message}")]
    PassFailure { message: String },
    #[error("execution engine construction failed: {message}")]
    CompileFailure { message: String },
    #[error("jit entry symbol not found: {symbol}")]
    LookupFailure { symbol: String },
    #[error("invariant violated: {message}")]
    InvariantViolation { message: String },
}

impl RuntimeError {
    pub fn pass_failure(message: impl Into<String>) -> Self {
        RuntimeError::PassFailure {
            message: message.into(),
        }
    }

    pub fn compile_failure(message: impl Into<String>) -> Self {
        RuntimeError::CompileFailure {
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        RuntimeError::InvariantViolation {
            message: message.into(),
        }
    }
}

/// Convenience alias for results returned by runtime routines.
pub type RtResult<T> = Result<T, RuntimeError>;
