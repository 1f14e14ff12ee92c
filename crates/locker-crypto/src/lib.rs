//! Cryptography for Locker secrets.
//!
//! Every sensitive field travels and rests as an envelope string sealed with
//! AES-256-CBC and HMAC-SHA256 under the project's working keys. The working
//! keys are unwrapped from a service-issued blob using keys stretched from the
//! caller's access secret.

pub mod aes_cbc;
pub mod envelope;
pub mod error;
pub mod fields;
pub mod hash;
pub mod keys;
pub mod mac;
pub mod types;

pub use envelope::{
    decrypt, decrypt_to_string, encrypt_to_string, is_envelope, parse_envelope, Envelope,
    EnvelopeParts,
};
pub use error::CryptoError;
pub use fields::{
    decrypt_fields, encrypt_fields, Field, FieldMode, FieldVisitor, SensitiveFields,
    DEFAULT_IDENTITY_FIELDS,
};
pub use hash::name_hash;
pub use keys::{derive_root_keys, unwrap_working_keys, wrap_working_keys};
pub use types::{KeyPair, AES_BLOCK_SIZE, AES_KEY_LENGTH, ENVELOPE_VERSION, MAC_LENGTH};
