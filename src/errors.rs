use std::io;

use aws_smithy_client::SdkError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Backing errors for all EBS operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed API (message: {message:?}, retryable: {retryable:?})")]
    API { message: String, retryable: bool },
    #[error("failed for other reasons (message: {message:?}, retryable: {retryable:?})")]
    Other { message: String, retryable: bool },
}

impl Error {
    /// Returns the error message in "String".
    #[inline]
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Error::API { message, .. } | Error::Other { message, .. } => message.clone(),
        }
    }

    /// Returns if the error is retryable.
    #[inline]
    #[must_use]
    pub fn retryable(&self) -> bool {
        match self {
            Error::API { retryable, .. } | Error::Other { retryable, .. } => *retryable,
        }
    }
}

/// Console and file I/O failures are never retried.
impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Other {
            message: format!("failed I/O {}", e),
            retryable: false,
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        io::Error::new(io::ErrorKind::Other, e.to_string())
    }
}

#[inline]
pub fn is_sdk_err_retryable<E>(e: &SdkError<E>) -> bool {
    match e {
        SdkError::TimeoutError(_) | SdkError::ResponseError { .. } => true,
        SdkError::DispatchFailure(e) => e.is_timeout() || e.is_io(),
        _ => false,
    }
}

/// Wraps a failed SDK call with the operation name.
pub fn api_err<E: std::fmt::Debug>(op: &str, e: SdkError<E>) -> Error {
    Error::API {
        message: format!("failed {} {:?}", op, e),
        retryable: is_sdk_err_retryable(&e),
    }
}

/// RUST_LOG=debug cargo test --package ebs-manager --lib -- errors::test_io_conversion --exact --show-output
#[test]
fn test_io_conversion() {
    let e: Error = io::Error::new(io::ErrorKind::BrokenPipe, "closed").into();
    assert!(!e.retryable());
    assert!(e.message().contains("closed"));

    let back: io::Error = Error::API {
        message: String::from("throttled"),
        retryable: true,
    }
    .into();
    assert!(back.to_string().contains("throttled"));
}
