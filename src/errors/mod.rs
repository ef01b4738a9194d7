/// Structured error handling for the relay
///
/// Every fallible relay operation returns `RelayResult<T>`. Errors are contained at the
/// smallest scope that can handle them (one queue message, one connection), so most variants
/// end up logged rather than propagated.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")] Config(String),

    #[error("Decode error: {reason}")] Decode {
        reason: String,
    },

    #[error("Queue error: {0}")] Queue(String),

    #[error("Backplane error: {0}")] Backplane(String),

    #[error("Transport error: {0}")] Transport(String),

    #[error("Membership rejected: {0}")] Membership(String),

    #[error("Service error in {service}: {reason}")] Service {
        service: String,
        reason: String,
    },

    #[error("Database error: {0}")] Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")] Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")] Io(#[from] std::io::Error),

    #[error("Timeout error: operation timed out after {millis} ms")] Timeout {
        millis: u64,
    },
}

impl RelayError {
    pub fn decode(reason: impl Into<String>) -> Self {
        RelayError::Decode { reason: reason.into() }
    }

    pub fn service(service: &str, reason: impl Into<String>) -> Self {
        RelayError::Service {
            service: service.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors worth retrying on the next loop iteration (infrastructure hiccups).
    /// A malformed envelope never becomes valid by retrying it.
    pub fn is_recoverable(&self) -> bool {
        match self {
            RelayError::Queue(_) => true,
            RelayError::Backplane(_) => true,
            RelayError::Transport(_) => true,
            RelayError::Database(_) => true,
            RelayError::Io(_) => true,
            RelayError::Timeout { .. } => true,
            _ => false,
        }
    }
}

pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_errors_are_not_recoverable() {
        let err = RelayError::decode("missing Type");
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "Decode error: missing Type");
    }

    #[test]
    fn test_infrastructure_errors_are_recoverable() {
        assert!(RelayError::Queue("unreachable".to_string()).is_recoverable());
        assert!(RelayError::Timeout { millis: 250 }.is_recoverable());
        assert!(!RelayError::Config("bad port".to_string()).is_recoverable());
    }

    #[test]
    fn test_json_errors_convert() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: RelayError = parse.unwrap_err().into();
        assert!(matches!(err, RelayError::Serialization(_)));
    }
}
