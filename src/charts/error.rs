use thiserror::Error;

/// Every failure the chart service can report.
///
/// The variant is the kind; the payload is a human readable message that is
/// safe to show to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("repository not allowed: {0}")]
    NotAllowed(String),
    #[error("{0}")]
    RepositoryNotFound(String),
    #[error("{0}")]
    ImageNotFound(String),
    #[error("{0}")]
    FileNotFound(String),
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),
}

/// The kind of a [`ServiceError`] without its message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    InvalidRequest,
    NotAllowed,
    RepositoryNotFound,
    ImageNotFound,
    FileNotFound,
    UpstreamFailure,
}

impl ServiceError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::NotAllowed(_) => ErrorKind::NotAllowed,
            Self::RepositoryNotFound(_) => ErrorKind::RepositoryNotFound,
            Self::ImageNotFound(_) => ErrorKind::ImageNotFound,
            Self::FileNotFound(_) => ErrorKind::FileNotFound,
            Self::UpstreamFailure(_) => ErrorKind::UpstreamFailure,
        }
    }

    /// Build a closure that wraps any displayable error as an upstream failure.
    pub fn upstream<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> Self {
        move |err| Self::UpstreamFailure(format!("{context}: {err}"))
    }
}

impl ErrorKind {
    /// Only upstream failures may succeed when tried again.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::UpstreamFailure)
    }

    /// Process exit code used by the command line front end.
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InvalidRequest => 2,
            Self::NotAllowed => 3,
            Self::RepositoryNotFound | Self::ImageNotFound | Self::FileNotFound => 4,
            Self::UpstreamFailure => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_upstream_failures_are_retryable() {
        assert!(ErrorKind::UpstreamFailure.is_retryable());
        assert!(!ErrorKind::NotAllowed.is_retryable());
        assert!(!ErrorKind::InvalidRequest.is_retryable());
        assert!(!ErrorKind::FileNotFound.is_retryable());
    }

    #[test]
    fn upstream_wraps_context() {
        let err = ServiceError::upstream("failed to read layer")("boom");
        assert_eq!(
            err,
            ServiceError::UpstreamFailure("failed to read layer: boom".to_string())
        );
        assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
    }
}
