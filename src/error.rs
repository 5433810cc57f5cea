use std::fmt;

/// Error codes shared across the catalog, queue and runner layers.
///
/// The code is part of the wire contract: HTTP handlers map it to a status
/// and clients match on the string form, so variants render exactly as the
/// historical strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    Forbidden,
    NotFound,
    Conflict,
    LimitExceeded,
    ServiceUnavailable,
    InternalError,
    QueueIsEmpty,
    Rescheduled,
    MissingDetails,
    PreExecutionFailure,
    ExecutionFailure,
    PostExecutionFailure,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BadRequest",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "NotFound",
            Self::Conflict => "Conflict",
            Self::LimitExceeded => "LimitExceeded",
            Self::ServiceUnavailable => "ServiceUnavailable",
            Self::InternalError => "InternalError",
            Self::QueueIsEmpty => "QueueIsEmpty",
            Self::Rescheduled => "Rescheduled",
            Self::MissingDetails => "MissingDetails",
            Self::PreExecutionFailure => "PreExecutionFailure",
            Self::ExecutionFailure => "ExecutionFailure",
            Self::PostExecutionFailure => "PostExecutionFailure",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error carrying a code, a message and an optional cause.
///
/// The cause chain is preserved and reachable through `std::error::Error::source`.
#[derive(Debug)]
pub struct Error {
    code: ErrorCode,
    message: String,
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        code: ErrorCode,
        message: impl Into<String>,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {} ({})", self.code, self.message, cause),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::with_cause(ErrorCode::InternalError, "serialization failed", e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_without_cause() {
        let e = Error::new(ErrorCode::NotFound, "job not found");
        assert_eq!(e.to_string(), "NotFound: job not found");
    }

    #[test]
    fn display_with_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let e = Error::with_cause(ErrorCode::ServiceUnavailable, "backend down", io);
        assert_eq!(
            e.to_string(),
            "ServiceUnavailable: backend down (boom)"
        );
    }

    #[test]
    fn source_exposes_cause_chain() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::Other, "root");
        let e = Error::with_cause(ErrorCode::InternalError, "wrapped", io);
        assert_eq!(e.source().unwrap().to_string(), "root");

        let bare = Error::new(ErrorCode::BadRequest, "no cause");
        assert!(bare.source().is_none());
    }

    #[test]
    fn code_matching() {
        let e = Error::new(ErrorCode::QueueIsEmpty, "nothing queued");
        assert!(e.is(ErrorCode::QueueIsEmpty));
        assert!(!e.is(ErrorCode::Rescheduled));
        assert_eq!(e.code().as_str(), "QueueIsEmpty");
    }
}
