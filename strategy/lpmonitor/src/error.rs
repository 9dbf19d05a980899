//! Error taxonomy of the monitor.

use clients_clmm::ClmmError;
use thiserror::Error;

use crate::tick_math::TickMathError;

/// Errors raised while polling, analysing or persisting positions.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// On-chain data was momentarily inconsistent. Retried next poll, never fatal.
    #[error("stale data for {context}: {reason}")]
    StaleData { context: String, reason: String },
    /// RPC transport failure or timeout.
    #[error("network error: {0}")]
    Network(String),
    /// Decode failure, revert or an impossible value. The affected position is skipped.
    #[error("malformed data: {0}")]
    MalformedData(String),
    /// Invalid configuration or an unreachable contract at startup.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// History store I/O failure.
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error(transparent)]
    TickMath(#[from] TickMathError),
}

impl MonitorError {
    pub fn stale(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StaleData {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the same read within a cycle may help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Short label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StaleData { .. } => "stale_data",
            Self::Network(_) => "network",
            Self::MalformedData(_) | Self::TickMath(_) => "malformed_data",
            Self::Configuration(_) => "configuration",
            Self::Persistence(_) => "persistence",
        }
    }
}

impl From<ClmmError> for MonitorError {
    fn from(err: ClmmError) -> Self {
        if err.is_transient() {
            Self::Network(err.to_string())
        } else {
            Self::MalformedData(err.to_string())
        }
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}
