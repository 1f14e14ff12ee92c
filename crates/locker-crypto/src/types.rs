use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Envelope format version written by [`crate::encrypt_to_string`].
pub const ENVELOPE_VERSION: u32 = 2;

/// AES-256 key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES block length in bytes. Also the CBC IV length.
pub const AES_BLOCK_SIZE: usize = 16;

/// HMAC-SHA256 tag length in bytes.
pub const MAC_LENGTH: usize = 32;

/// An encryption key and its companion MAC key.
///
/// Used both for the stretched keys derived from an access secret and for
/// the working keys unwrapped from the service-issued key blob. Both halves
/// are wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    enc_key: [u8; AES_KEY_LENGTH],
    mac_key: [u8; AES_KEY_LENGTH],
}

impl KeyPair {
    pub fn new(enc_key: [u8; AES_KEY_LENGTH], mac_key: [u8; AES_KEY_LENGTH]) -> Self {
        Self { enc_key, mac_key }
    }

    /// Generate a random key pair.
    pub fn generate() -> Result<Self, crate::CryptoError> {
        let mut enc_key = [0u8; AES_KEY_LENGTH];
        let mut mac_key = [0u8; AES_KEY_LENGTH];
        getrandom::getrandom(&mut enc_key)
            .and_then(|_| getrandom::getrandom(&mut mac_key))
            .map_err(|e| crate::CryptoError::RngFailed(e.to_string()))?;
        Ok(Self { enc_key, mac_key })
    }

    pub fn enc_key(&self) -> &[u8; AES_KEY_LENGTH] {
        &self.enc_key
    }

    pub fn mac_key(&self) -> &[u8; AES_KEY_LENGTH] {
        &self.mac_key
    }

    /// Concatenated `enc_key || mac_key`, the layout of an unwrapped key blob.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(AES_KEY_LENGTH * 2);
        out.extend_from_slice(&self.enc_key);
        out.extend_from_slice(&self.mac_key);
        out
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").finish_non_exhaustive()
    }
}
