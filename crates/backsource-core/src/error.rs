//! Error types for the back-source fetch core

use thiserror::Error;

/// Errors surfaced by the fetch engine.
///
/// Cleanup failures are deliberately absent: cleanup runs in guaranteed-exit
/// contexts and only reports through the diagnostic log, so it can never mask
/// the primary failure.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Back-sourcing is disallowed for this task; no network call was made.
    /// The embedded code is the accumulated back-source reason.
    #[error("download fail and not back source: {reason_code}")]
    PolicyDenied { reason_code: i32 },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The origin answered with a non-success status (>= 400).
    #[error("failed to download from source, response code: {status}")]
    BadStatus { status: u16 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The digest over the received bytes differs from the expected one.
    #[error("checksum not match, expected: {expected} real: {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// A read failed and closing the underlying resource failed too; both
    /// failures are preserved.
    #[error("{read}; close error: {close}")]
    CloseCompound {
        read: Box<FetchError>,
        close: Box<FetchError>,
    },

    #[error("download was cancelled")]
    Cancelled,

    /// The stream already hit a terminal failure; later reads replay it.
    #[error("stream already terminated: {0}")]
    Terminated(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Compose a failed read with the outcome of the close attempt that it
    /// triggered. A clean close leaves the read error untouched.
    pub fn with_close_result(self, close: Result<(), FetchError>) -> FetchError {
        match close {
            Ok(()) => self,
            Err(close_err) => FetchError::CloseCompound {
                read: Box::new(self),
                close: Box::new(close_err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_error_keeps_both_failures() {
        let read = FetchError::BadStatus { status: 502 };
        let close = FetchError::Io(std::io::Error::other("socket gone"));
        let err = read.with_close_result(Err(close));

        let text = err.to_string();
        assert!(text.contains("502"));
        assert!(text.contains("socket gone"));
    }

    #[test]
    fn clean_close_preserves_read_error() {
        let err = FetchError::BadStatus { status: 404 }.with_close_result(Ok(()));
        assert!(matches!(err, FetchError::BadStatus { status: 404 }));
    }
}
