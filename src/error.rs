use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid channel name: {0:?}")]
    InvalidChannel(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Remote handler error: {0}")]
    Remote(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Router dispatch loop already started")]
    AlreadyStarted,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Undecodable frame: {0}")]
    Decode(String),

    #[error("Send failed after {attempts} attempt(s): {reason}")]
    SendFailed { attempts: u32, reason: String },

    #[error("Receive failed after {attempts} attempt(s): {reason}")]
    ReceiveFailed { attempts: u32, reason: String },

    #[error("Timed out after {duration_ms}ms while {operation}")]
    Timeout { duration_ms: u64, operation: String },

    #[error("Connection to {name} failed after {attempts} attempt(s): {reason}")]
    ConnectionFailed {
        name: String,
        attempts: u32,
        reason: String,
    },

    #[error("Not connected")]
    NotConnected,

    #[error("Transport closed")]
    Closed,
}

impl TransportError {
    /// Whether the transport can no longer deliver frames after this error.
    ///
    /// A single undecodable frame or an idle read timeout leaves the
    /// connection usable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Decode(_) | TransportError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;
pub type TransportResult<T> = std::result::Result<T, TransportError>;

impl From<serde_json::Error> for RouterError {
    fn from(err: serde_json::Error) -> Self {
        RouterError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(!TransportError::Decode("bad json".into()).is_fatal());
        assert!(!TransportError::Timeout {
            duration_ms: 10,
            operation: "receive".into(),
        }
        .is_fatal());
        assert!(TransportError::Closed.is_fatal());
        assert!(TransportError::NotConnected.is_fatal());
        assert!(TransportError::MessageTooLarge { size: 2, max: 1 }.is_fatal());
    }

    #[test]
    fn test_transport_error_passes_through() {
        let err: RouterError = TransportError::NotConnected.into();
        assert!(matches!(err, RouterError::Transport(TransportError::NotConnected)));
    }
}
