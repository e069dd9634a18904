use std::time::Duration;
use thiserror::Error;

/// everything that can go wrong while relaying a remote resource
#[derive(Debug, Error)]
pub enum RelayError {
    /// missing or malformed target url, nothing was fetched
    #[error("invalid target url: {0}")]
    InvalidUrl(String),

    /// the outbound http client could not be constructed
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    /// connection, dns or tls failure before a response arrived
    #[error("upstream unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    /// upstream answered with a non-success status
    #[error("upstream returned {0}")]
    Status(reqwest::StatusCode),

    /// upstream stopped sending body bytes for too long
    #[error("upstream read timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// upstream body failed after streaming had begun
    #[error("upstream stream interrupted: {0}")]
    Interrupted(#[source] reqwest::Error),

    /// the downstream client went away mid-transfer
    #[error("client disconnected")]
    ClientDisconnected,
}

impl RelayError {
    /// true for errors caused by the caller rather than the upstream
    pub fn is_client_error(&self) -> bool {
        matches!(self, RelayError::InvalidUrl(_))
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
