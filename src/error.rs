//! Error taxonomy for the polling client.

use reqwest::StatusCode;

/// Errors raised by the session, directory, attendance client and monitor.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// The token endpoint rejected the credentials (or answered with garbage).
    #[error("Credentials were rejected by the identity endpoint")]
    BadCredentials,

    /// Network, DNS or TLS failure on any endpoint.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A call needing a bearer token was attempted on an unauthenticated session.
    #[error("Session is not authenticated")]
    AuthRequired,

    /// The monitor was asked to check attendance before initialization finished.
    #[error("Monitor is not initialized")]
    NotReady,

    #[error("Gym '{0}' not found")]
    GymNotFound(String),

    #[error("Malformed API response: {0}")]
    MalformedResponse(String),

    #[error("Home gym is unavailable")]
    HomeGymUnavailable,

    #[error("API returned error status: {0}")]
    Status(StatusCode),
}

impl MonitorError {
    /// Short classified reason handed to the presentation layer.
    pub fn reason(&self) -> &'static str {
        match self {
            MonitorError::BadCredentials => "bad credentials",
            MonitorError::Transport(_) => "transport error",
            MonitorError::AuthRequired => "authentication required",
            MonitorError::NotReady => "monitor not ready",
            MonitorError::GymNotFound(_) => "gym not found",
            MonitorError::MalformedResponse(_) => "malformed response",
            MonitorError::HomeGymUnavailable => "home gym unavailable",
            MonitorError::Status(_) => "unexpected status",
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
