use {
    derive_more::{Display, Error},
    std::io,
};

/// Failures of the cryptographic core.
///
/// Errors that cross an [`io::Read`] boundary are wrapped into [`io::Error`];
/// [`Error::from_io`] recovers them.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[display("malformed node key: {reason}")]
    MalformedKey { reason: String },
    #[display("shared key `{handle}` is not available")]
    MissingSharedKey { handle: String },
    #[display("invalid key length: got {actual}, expected {expected}")]
    KeyLength { actual: usize, expected: usize },
    #[display("invalid attributes: {reason}")]
    Attributes { reason: String },
    /// Content MAC computed at the end of the stream differs from the expected one.
    /// Bytes already returned by the stream must not be trusted.
    #[display("content MAC mismatch")]
    Integrity,
    #[display("operation is not supported by a forward-only cipher stream")]
    Unsupported,
    #[display("operation was cancelled")]
    Cancelled,
}

impl Error {
    /// Typed error carried by an I/O error produced by this crate, if any.
    #[must_use]
    #[inline]
    pub fn from_io(err: &io::Error) -> Option<&Self> {
        err.get_ref().and_then(|inner| inner.downcast_ref::<Self>())
    }

    pub(crate) fn malformed(err: impl std::fmt::Display) -> Self {
        Self::MalformedKey {
            reason: format!("{err:#}"),
        }
    }
}

impl From<Error> for io::Error {
    #[inline]
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::Integrity => io::ErrorKind::InvalidData,
            Error::Unsupported => io::ErrorKind::Unsupported,
            Error::MalformedKey { .. }
            | Error::MissingSharedKey { .. }
            | Error::KeyLength { .. }
            | Error::Attributes { .. }
            // Not `Interrupted`: `io::copy` retries interrupted reads.
            | Error::Cancelled => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
