//! Centralized error types for mailchunk.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailchunk library.
///
/// Two families matter to callers: transport errors (the bytes could not be
/// fetched) and format errors (the bytes were fetched but the record cannot
/// be indexed or its text cannot be decoded). See [`MailError::is_transport`]
/// and [`MailError::is_format`].
#[derive(Error, Debug)]
pub enum MailError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The source could not deliver the requested bytes.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The source is known to be permanently unavailable.
    #[error("Source is unavailable: {0}")]
    BrokenSource(String),

    /// A header required to index the record is absent or empty.
    #[error("Missing required header: {0}")]
    MissingHeader(&'static str),

    /// The `Date:` header is present but could not be parsed.
    #[error("Unparseable date: '{0}'")]
    InvalidDate(String),

    /// A text part declares a charset we cannot decode.
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),
}

/// Convenience alias for `Result<T, MailError>`.
pub type Result<T> = std::result::Result<T, MailError>;

impl MailError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// `true` for failures to fetch bytes from the source.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Transport(_) | Self::BrokenSource(_)
        )
    }

    /// `true` for failures caused by the content of the record itself.
    pub fn is_format(&self) -> bool {
        !self.is_transport()
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (in-memory readers, cursors). Prefer `MailError::io` for files.
impl From<std::io::Error> for MailError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<stream>"),
            source,
        }
    }
}
