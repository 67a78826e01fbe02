//! Error kinds shared by every verification path.

use std::fmt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A terminal verification error.
///
/// Nothing in this workspace retries internally, so every variant is reported
/// to the caller as-is. Use [`Error::kind`] to decide whether the artifact
/// should be treated as untrusted or whether the check could not be completed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No signing key could be resolved, or a setting is invalid.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A key ring, certificate, signature or log entry could not be decoded.
    #[error("malformed input: {message}")]
    Malformed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The artifact has no matching transparency-log entry.
    #[error("{message}")]
    NotFound { message: String },

    /// The transparency log or the trust-root distribution point could not be reached.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A cryptographic or identity check did not pass.
    #[error("verification failed: {message}")]
    Verification {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

/// The five error kinds, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Malformed,
    NotFound,
    Transport,
    Verification,
}

impl ErrorKind {
    /// True for outcomes that mean "do not trust this artifact".
    ///
    /// Configuration, malformed-input and transport errors mean the check
    /// could not be completed at all.
    pub fn is_untrusted(self) -> bool {
        matches!(self, ErrorKind::NotFound | ErrorKind::Verification)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Malformed => "malformed",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Transport => "transport",
            ErrorKind::Verification => "verification",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. } => ErrorKind::Config,
            Error::Malformed { .. } => ErrorKind::Malformed,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Verification { .. } => ErrorKind::Verification,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Error::Malformed {
            message: message.into(),
            source: None,
        }
    }

    pub fn malformed_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Malformed {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Transport {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn verification(message: impl Into<String>) -> Self {
        Error::Verification {
            message: message.into(),
            source: None,
        }
    }

    pub fn verification_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Verification {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}
