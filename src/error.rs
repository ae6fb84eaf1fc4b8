use thiserror::Error;

/// Failures surfaced by the remote scoring service client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The controller could not be reached or the connection dropped.
    #[error("transport error: {0}")]
    Transport(String),

    /// Bad credentials, or a token the controller no longer accepts.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The controller rejected an administrative request.
    #[error("{0}")]
    Action(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth(_))
    }

    /// Re-labels any failure as an authentication failure, keeping its text.
    pub fn into_auth(self) -> ApiError {
        match self {
            ApiError::Auth(msg) => ApiError::Auth(msg),
            other => ApiError::Auth(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}
