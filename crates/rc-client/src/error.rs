use thiserror::Error;

/// Failures of a single gateway call. No retries happen at this layer;
/// retry policy belongs to the session.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// No usable response reached the server (network, DNS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The server responded, but with a non-success status or an
    /// unparseable body.
    #[error("protocol error (HTTP {status}): {message}")]
    Protocol { status: u16, message: String },
}

impl GatewayError {
    /// Builds a `Protocol` error out of a non-success response.
    pub async fn from_response(response: reqwest::Response) -> GatewayError {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read response body".to_string());

        GatewayError::Protocol { status, message }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() || err.is_status() {
            GatewayError::Protocol {
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                message: err.to_string(),
            }
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// Usage error: `start()` while a batch is already in flight.
    #[error("a generation batch is already running")]
    AlreadyRunning,

    /// The enqueue call failed; the batch is dead, nothing was submitted.
    #[error("failed to enqueue batch: {0}")]
    Enqueue(#[from] GatewayError),
}
