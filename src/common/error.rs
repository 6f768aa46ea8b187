//! Error types for coordkv
//!
//! Absence of a key is never an error: a read that matches nothing returns
//! an empty result set.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Transport Errors ===
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("gRPC error: {0}")]
    Grpc(tonic::Status),

    // === Request Errors ===
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Lease not found: {0}")]
    LeaseNotFound(i64),

    #[error("Revision out of range: {0}")]
    RevisionOutOfRange(String),

    // === Watch Errors ===
    #[error("Watch canceled: {0}")]
    WatchCanceled(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // === Generic ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Is this a retryable error?
    ///
    /// The client never retries on its own; this only helps callers pick
    /// a policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Unavailable(_) | Error::DeadlineExceeded(_) => true,
            Error::Grpc(status) => matches!(
                status.code(),
                tonic::Code::Unavailable | tonic::Code::ResourceExhausted | tonic::Code::Aborted
            ),
            _ => false,
        }
    }

    /// gRPC code equivalent of this error
    pub fn code(&self) -> tonic::Code {
        use tonic::Code;
        match self {
            Error::Unavailable(_) => Code::Unavailable,
            Error::DeadlineExceeded(_) => Code::DeadlineExceeded,
            Error::Grpc(status) => status.code(),
            Error::InvalidArgument(_) => Code::InvalidArgument,
            Error::LeaseNotFound(_) => Code::NotFound,
            Error::RevisionOutOfRange(_) => Code::OutOfRange,
            Error::WatchCanceled(_) => Code::Cancelled,
            Error::InvalidConfig(_) | Error::Config(_) => Code::InvalidArgument,
            Error::Io(_) | Error::Internal(_) => Code::Internal,
        }
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        use tonic::Code;
        let message = status.message().to_string();
        match status.code() {
            Code::Unavailable => Error::Unavailable(message),
            Code::DeadlineExceeded => Error::DeadlineExceeded(message),
            Code::InvalidArgument => Error::InvalidArgument(message),
            Code::OutOfRange => Error::RevisionOutOfRange(message),
            Code::NotFound if message.contains("lease") => {
                Error::LeaseNotFound(lease_id_from_message(&message).unwrap_or(0))
            }
            _ => Error::Grpc(status),
        }
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(e: tonic::transport::Error) -> Self {
        Error::Unavailable(e.to_string())
    }
}

/// etcd does not put the lease ID in its "lease not found" status, but
/// proxies and compatible stores often do as a trailing integer.
fn lease_id_from_message(message: &str) -> Option<i64> {
    message
        .split(|c: char| !c.is_ascii_digit() && c != '-')
        .filter(|part| !part.is_empty())
        .last()
        .and_then(|part| part.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err: Error = tonic::Status::unavailable("connection refused").into();
        assert!(matches!(err, Error::Unavailable(_)));
        assert!(err.is_retryable());

        let err: Error = tonic::Status::deadline_exceeded("too slow").into();
        assert!(matches!(err, Error::DeadlineExceeded(_)));

        let err: Error = tonic::Status::invalid_argument("etcdserver: key is not provided").into();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(!err.is_retryable());

        let err: Error =
            tonic::Status::out_of_range("mvcc: required revision has been compacted").into();
        assert!(matches!(err, Error::RevisionOutOfRange(_)));

        let err: Error = tonic::Status::permission_denied("no").into();
        assert_eq!(err.code(), tonic::Code::PermissionDenied);
    }

    #[test]
    fn test_lease_not_found_mapping() {
        let err: Error = tonic::Status::not_found("etcdserver: requested lease not found").into();
        assert!(matches!(err, Error::LeaseNotFound(0)));

        let err: Error = tonic::Status::not_found("lease 42 not found").into();
        assert!(matches!(err, Error::LeaseNotFound(42)));

        let err: Error = tonic::Status::not_found("user not found").into();
        assert!(matches!(err, Error::Grpc(_)));
    }
}
