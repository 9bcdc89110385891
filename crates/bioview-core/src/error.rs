use std::fmt;

/// Failure reported by an external query or aggregation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The request never produced a response (connection reset, timeout).
    Transport(String),
    /// The service answered with an error status.
    Service { status: u16, message: String },
    /// The service abandoned the request before answering.
    Cancelled,
}

impl QueryError {
    pub fn transport(message: impl Into<String>) -> Self {
        QueryError::Transport(message.into())
    }

    pub fn service(status: u16, message: impl Into<String>) -> Self {
        QueryError::Service {
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Transport(message) => write!(f, "transport error: {message}"),
            QueryError::Service { status, message } => {
                write!(f, "service error {status}: {message}")
            }
            QueryError::Cancelled => write!(f, "request cancelled"),
        }
    }
}

impl std::error::Error for QueryError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status_and_message() {
        let err = QueryError::service(503, "index warming up");
        assert_eq!(err.to_string(), "service error 503: index warming up");
        assert_eq!(
            QueryError::transport("reset").to_string(),
            "transport error: reset"
        );
    }
}
