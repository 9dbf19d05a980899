//! Error types for CLMM contract reads.

use std::future::IntoFuture;
use std::time::Duration;

use alloy::transports::TransportError;
use thiserror::Error;

/// Errors that can occur while reading position manager, pool or token contracts.
#[derive(Debug, Error)]
pub enum ClmmError {
    /// The RPC transport failed before a usable response arrived.
    #[error("transport error during {call}: {reason}")]
    Transport { call: String, reason: String },
    /// The call did not complete within the configured timeout.
    #[error("{call} timed out after {timeout_ms} ms")]
    Timeout { call: String, timeout_ms: u64 },
    /// The node answered with an error response, typically an execution revert.
    #[error("{call} rejected by node: {reason}")]
    Rejected { call: String, reason: String },
    /// The response could not be decoded or carried an impossible value.
    #[error("failed to decode {call}: {reason}")]
    Decode { call: String, reason: String },
    /// A lookup resolved to the zero address.
    #[error("{0} not found")]
    NotFound(String),
}

impl ClmmError {
    /// Classifies a contract call error.
    pub fn from_contract(call: &str, err: alloy::contract::Error) -> Self {
        match err {
            alloy::contract::Error::TransportError(err) => Self::from_transport(call, err),
            other => Self::Decode {
                call: call.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// Classifies a raw provider error.
    pub fn from_transport(call: &str, err: TransportError) -> Self {
        let call = call.to_string();
        if err.is_error_resp() {
            Self::Rejected {
                call,
                reason: err.to_string(),
            }
        } else if err.is_null_resp() || err.is_deser_error() {
            Self::Decode {
                call,
                reason: err.to_string(),
            }
        } else {
            Self::Transport {
                call,
                reason: err.to_string(),
            }
        }
    }

    /// Whether a retry of the same read may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}

/// Awaits `fut` under `timeout`, mapping an elapsed deadline to [`ClmmError::Timeout`].
pub(crate) async fn with_timeout<F>(
    call: &str,
    timeout: Duration,
    fut: F,
) -> Result<F::Output, ClmmError>
where
    F: IntoFuture,
{
    tokio::time::timeout(timeout, fut.into_future())
        .await
        .map_err(|_| ClmmError::Timeout {
            call: call.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })
}
