use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(&'static str),

    #[error("Invalid base64 in envelope {segment} segment")]
    InvalidBase64 { segment: &'static str },

    #[error("Ciphertext length {0} is not a multiple of the block size")]
    NotBlockAligned(usize),

    #[error("Invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Invalid IV length: expected 16 bytes, got {0}")]
    InvalidIvLength(usize),

    #[error("MAC validation failed")]
    MacMismatch,

    #[error("Symmetric key blob MAC validation failed")]
    KeyBlobMacMismatch,

    #[error("Symmetric key blob too short: expected at least 64 bytes, got {0}")]
    KeyBlobTooShort(usize),

    #[error("Decrypted value is not valid UTF-8")]
    InvalidUtf8,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Random number generation failed: {0}")]
    RngFailed(String),
}
