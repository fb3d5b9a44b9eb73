//! Error types for extractor and track operations.
//!
//! Plugins report outcomes as raw [`Status`] codes. The bridge maps them to
//! [`Error`] without changing their kind, and maps them back when needed, so
//! a status travels through the bridge unchanged.

use thiserror::Error;

/// Raw status code exchanged across the plugin ABI.
pub type Status = i32;

/// Well-known status codes.
///
/// The values match the platform media framework so that existing plugins
/// can be bridged without remapping.
pub mod status {
    use super::Status;

    /// Success.
    pub const OK: Status = 0;
    /// Operation attempted before `start` or after `stop`.
    pub const NO_INIT: Status = -19;
    /// Invalid argument.
    pub const BAD_VALUE: Status = -22;
    /// Operation not valid in the current state.
    pub const INVALID_OPERATION: Status = -38;
    /// Non-blocking read has no data yet.
    pub const WOULD_BLOCK: Status = -11;
    /// Container data could not be parsed.
    pub const MALFORMED: Status = -1007;
    /// Optional capability is not implemented.
    pub const UNSUPPORTED: Status = -1010;
    /// Read sequence is exhausted.
    pub const END_OF_STREAM: Status = -1011;
    /// Output format changed mid-stream.
    pub const FORMAT_CHANGED: Status = -1012;
    /// Unspecified failure.
    pub const UNKNOWN_ERROR: Status = i32::MIN;
}

/// Result type alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a failed extractor or track operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Operation attempted before `start` or after `stop`.
    #[error("track not initialized")]
    NotInitialized,

    /// Normal end of a read sequence.
    #[error("end of stream")]
    EndOfStream,

    /// Output format changed; re-query the format before continuing.
    #[error("format changed")]
    FormatChanged,

    /// Optional capability is absent (conditional access, non-blocking read).
    #[error("operation not supported")]
    NotSupported,

    /// Out-of-range index or malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Non-blocking read has no data available yet.
    #[error("no data available yet")]
    WouldBlock,

    /// Parsing, reading or format conversion failed.
    #[error("extraction failed: {0}")]
    ExtractionFailure(String),

    /// Plugin status with no dedicated variant, preserved verbatim.
    #[error("plugin error (status {0})")]
    Plugin(Status),
}

impl Error {
    /// Map a plugin status to an error.
    ///
    /// Returns `None` for [`status::OK`]. A plugin's `BAD_VALUE` and
    /// `MALFORMED` share the variants the bridge raises itself. Codes without
    /// a dedicated variant are kept as [`Error::Plugin`]. Either way
    /// [`Error::status`] reproduces the code.
    pub fn from_status(code: Status) -> Option<Self> {
        let err = match code {
            status::OK => return None,
            status::NO_INIT => Error::NotInitialized,
            status::END_OF_STREAM => Error::EndOfStream,
            status::FORMAT_CHANGED => Error::FormatChanged,
            status::UNSUPPORTED => Error::NotSupported,
            status::WOULD_BLOCK => Error::WouldBlock,
            status::BAD_VALUE => {
                Error::InvalidArgument(format!("plugin reported bad value (status {})", code))
            }
            status::MALFORMED => {
                Error::ExtractionFailure(format!("plugin reported malformed data (status {})", code))
            }
            other => Error::Plugin(other),
        };
        Some(err)
    }

    /// Turn a plugin status into a `Result`.
    pub fn check(code: Status) -> Result<()> {
        match Self::from_status(code) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// The status code equivalent of this error.
    pub fn status(&self) -> Status {
        match self {
            Error::NotInitialized => status::NO_INIT,
            Error::EndOfStream => status::END_OF_STREAM,
            Error::FormatChanged => status::FORMAT_CHANGED,
            Error::NotSupported => status::UNSUPPORTED,
            Error::InvalidArgument(_) => status::BAD_VALUE,
            Error::WouldBlock => status::WOULD_BLOCK,
            Error::ExtractionFailure(_) => status::MALFORMED,
            Error::Plugin(code) => *code,
        }
    }

    /// Whether this error is an actual fault.
    ///
    /// End of stream, format changes and "not ready yet" are informational.
    pub fn is_fault(&self) -> bool {
        !matches!(
            self,
            Error::EndOfStream | Error::FormatChanged | Error::WouldBlock
        )
    }
}
