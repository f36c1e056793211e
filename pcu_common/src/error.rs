//! Shared error kind for the PCU control core.
//!
//! One variant per error kind from the external error-handling design:
//! Connectivity, Invariant violation, Protocol misuse, Timeout,
//! Configuration error, and Unreachable-state error. No kind is
//! automatically retried — recovery is operator-mediated via the
//! `reinit`/`allow_moves`/`enable` request channels.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PcuError {
    #[error("channel surface disconnected: {0}")]
    Connectivity(String),

    #[error("position invariant violated: {0}")]
    InvariantViolation(String),

    #[error("protocol misuse: {0}")]
    ProtocolMisuse(String),

    #[error("move step timed out after {elapsed_s}s (limit {limit_s}s)")]
    Timeout { elapsed_s: f64, limit_s: f64 },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unreachable state reached: {0}")]
    Unreachable(String),
}
