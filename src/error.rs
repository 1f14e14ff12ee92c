use locker_crypto::CryptoError;
use thiserror::Error;

use crate::transport::TransportError;

/// Coarse classification of an [`Error`], stable across context wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    InvalidAccessKey,
    MalformedData,
    CryptoFailure,
    HttpFailure,
    ServerFailure,
    StorageFailure,
    PathFailure,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid access key: {0}")]
    InvalidAccessKey(String),

    #[error("Malformed data: {0}")]
    MalformedData(String),

    #[error("Crypto failure: {0}")]
    CryptoFailure(String),

    #[error("HTTP failure: {}, {}", display_status(.status), .message)]
    HttpFailure { status: Option<u16>, message: String },

    #[error("Server failure: {status}, {message}")]
    ServerFailure { status: u16, message: String },

    #[error("Storage failure: {0}")]
    StorageFailure(#[from] rusqlite::Error),

    #[error("Path failure: {0}")]
    PathFailure(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

fn display_status(status: &Option<u16>) -> String {
    match status {
        Some(status) => status.to_string(),
        None => "no response".to_string(),
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::InvalidAccessKey(_) => ErrorKind::InvalidAccessKey,
            Error::MalformedData(_) => ErrorKind::MalformedData,
            Error::CryptoFailure(_) => ErrorKind::CryptoFailure,
            Error::HttpFailure { .. } => ErrorKind::HttpFailure,
            Error::ServerFailure { .. } => ErrorKind::ServerFailure,
            Error::StorageFailure(_) => ErrorKind::StorageFailure,
            Error::PathFailure(_) => ErrorKind::PathFailure,
            Error::Context { source, .. } => source.kind(),
        }
    }

    /// HTTP status carried by the innermost error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpFailure { status, .. } => *status,
            Error::ServerFailure { status, .. } => Some(*status),
            Error::Context { source, .. } => source.status(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<CryptoError> for Error {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::MalformedEnvelope(_)
            | CryptoError::InvalidBase64 { .. }
            | CryptoError::NotBlockAligned(_)
            | CryptoError::KeyBlobTooShort(_)
            | CryptoError::InvalidUtf8 => Error::MalformedData(err.to_string()),
            CryptoError::KeyBlobMacMismatch => Error::InvalidAccessKey(err.to_string()),
            CryptoError::MacMismatch
            | CryptoError::InvalidKeyLength { .. }
            | CryptoError::InvalidIvLength(_)
            | CryptoError::EncryptionFailed(_)
            | CryptoError::DecryptionFailed(_)
            | CryptoError::RngFailed(_) => Error::CryptoFailure(err.to_string()),
        }
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(message) => Error::HttpFailure {
                status: None,
                message,
            },
            TransportError::Status { status, message } if status >= 500 => {
                Error::ServerFailure { status, message }
            }
            TransportError::Status { status, message } => Error::HttpFailure {
                status: Some(status),
                message,
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::MalformedData(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::PathFailure(err.to_string())
    }
}

/// Attach operation context to an error while keeping its kind.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Context {
            context: context.into(),
            source: Box::new(e.into()),
        })
    }
}
