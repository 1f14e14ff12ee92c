//! HMAC-SHA256 over `iv || ciphertext`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CryptoError;
use crate::types::MAC_LENGTH;

type HmacSha256 = Hmac<Sha256>;

fn keyed(mac_key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<HmacSha256, CryptoError> {
    let mut mac = HmacSha256::new_from_slice(mac_key)
        .map_err(|e| CryptoError::EncryptionFailed(format!("HMAC init failed: {}", e)))?;
    mac.update(iv);
    mac.update(ciphertext);
    Ok(mac)
}

/// Compute the envelope MAC.
pub fn compute_mac(
    mac_key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<[u8; MAC_LENGTH], CryptoError> {
    Ok(keyed(mac_key, iv, ciphertext)?.finalize().into_bytes().into())
}

/// Check `tag` against the MAC of `iv || ciphertext` in constant time.
pub fn verify_mac(
    mac_key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<(), CryptoError> {
    keyed(mac_key, iv, ciphertext)?
        .verify_slice(tag)
        .map_err(|_| CryptoError::MacMismatch)
}
