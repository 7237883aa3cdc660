use thiserror::Error;

/// Main error type for the price stream
///
/// Cloneable so a terminal failure can be handed to every live subscription.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Reconnect attempts exhausted after {attempts} retries")]
    RetryExhausted { attempts: u32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Valuation error: {0}")]
    Valuation(String),

    #[error("Price stream client has shut down")]
    Shutdown,
}

impl StreamError {
    /// Transport failures are absorbed by the reconnect loop
    pub fn is_retryable(&self) -> bool {
        matches!(self, StreamError::Transport(_))
    }

    /// Terminal for the subscription that receives it
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamError::RetryExhausted { .. } | StreamError::Shutdown)
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            StreamError::Transport(_) => "transport_error",
            StreamError::Decode(_) => "decode_error",
            StreamError::Subscription(_) => "subscription_error",
            StreamError::RetryExhausted { .. } => "retry_exhausted",
            StreamError::Config(_) => "config_error",
            StreamError::Valuation(_) => "valuation_error",
            StreamError::Shutdown => "shutdown",
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Decode(format!("JSON parsing failed: {}", err))
    }
}

#[cfg(feature = "websocket")]
impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_errors_are_retryable() {
        assert!(StreamError::Transport("reset".into()).is_retryable());
        assert!(!StreamError::Decode("bad".into()).is_retryable());
        assert!(!StreamError::RetryExhausted { attempts: 5 }.is_retryable());
    }

    #[test]
    fn test_json_error_maps_to_decode() {
        let err: StreamError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.error_type(), "decode_error");
    }

    #[test]
    fn test_terminal_errors() {
        assert!(StreamError::RetryExhausted { attempts: 1 }.is_terminal());
        assert!(StreamError::Shutdown.is_terminal());
        assert!(!StreamError::Subscription("empty".into()).is_terminal());
    }
}
