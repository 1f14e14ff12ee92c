//! Key hierarchy: access secret → stretched keys → working keys.
//!
//! The stretched pair comes from HKDF-Expand (SHA-256, no extract step)
//! over the raw access secret with info `"enc"` / `"mac"`. It is only used
//! to open the service-issued key blob, whose plaintext carries the working
//! pair as `enc_key[0..32] || mac_key[32..64]`.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::envelope::Envelope;
use crate::error::CryptoError;
use crate::types::{KeyPair, AES_KEY_LENGTH};

/// HKDF info tag for the stretched encryption key.
pub const ENC_INFO: &[u8] = b"enc";

/// HKDF info tag for the stretched MAC key.
pub const MAC_INFO: &[u8] = b"mac";

/// HKDF-Expand (SHA-256) of a single 32-byte block, using `prk` as-is.
///
/// # Arguments
/// * `prk` - Pseudorandom key; the raw access secret
/// * `info` - Context tag
pub fn hkdf_expand(prk: &[u8], info: &[u8]) -> Result<[u8; AES_KEY_LENGTH], CryptoError> {
    let mut okm = [0u8; AES_KEY_LENGTH];
    match Hkdf::<Sha256>::from_prk(prk) {
        Ok(hk) => hk
            .expand(info, &mut okm)
            .map_err(|e| CryptoError::EncryptionFailed(format!("HKDF expand failed: {}", e)))?,
        Err(_) => {
            // The hkdf crate rejects PRKs shorter than the hash output. The
            // first expand block is HMAC(prk, info || 0x01) regardless.
            let mut mac = Hmac::<Sha256>::new_from_slice(prk)
                .map_err(|e| CryptoError::EncryptionFailed(format!("HMAC init failed: {}", e)))?;
            mac.update(info);
            mac.update(&[1u8]);
            okm.copy_from_slice(&mac.finalize().into_bytes());
        }
    }
    Ok(okm)
}

/// Derive the stretched key pair from the raw access secret.
pub fn derive_root_keys(access_secret: &[u8]) -> Result<KeyPair, CryptoError> {
    let enc_key = hkdf_expand(access_secret, ENC_INFO)?;
    let mac_key = hkdf_expand(access_secret, MAC_INFO)?;
    Ok(KeyPair::new(enc_key, mac_key))
}

/// Open the service-issued key blob with the stretched keys.
///
/// # Errors
/// * [`CryptoError::KeyBlobMacMismatch`] if the blob was not made for these keys
/// * [`CryptoError::KeyBlobTooShort`] if the plaintext is under 64 bytes
pub fn unwrap_working_keys(blob: &str, stretched: &KeyPair) -> Result<KeyPair, CryptoError> {
    let envelope = Envelope::parse(blob)?;
    envelope.verify(stretched.mac_key()).map_err(|e| match e {
        CryptoError::MacMismatch => CryptoError::KeyBlobMacMismatch,
        other => other,
    })?;

    let mut plaintext = envelope.decrypt_raw(stretched.enc_key())?;
    if plaintext.len() < AES_KEY_LENGTH * 2 {
        let len = plaintext.len();
        plaintext.zeroize();
        return Err(CryptoError::KeyBlobTooShort(len));
    }

    let mut enc_key = [0u8; AES_KEY_LENGTH];
    let mut mac_key = [0u8; AES_KEY_LENGTH];
    enc_key.copy_from_slice(&plaintext[..AES_KEY_LENGTH]);
    mac_key.copy_from_slice(&plaintext[AES_KEY_LENGTH..AES_KEY_LENGTH * 2]);
    plaintext.zeroize();
    Ok(KeyPair::new(enc_key, mac_key))
}

/// Wrap a working key pair under stretched keys, producing a key blob.
///
/// The inverse of [`unwrap_working_keys`]; the service performs this step in
/// production.
pub fn wrap_working_keys(working: &KeyPair, stretched: &KeyPair) -> Result<String, CryptoError> {
    let iv = crate::aes_cbc::generate_iv()?;
    let mut plaintext = working.to_bytes();
    let ciphertext = crate::aes_cbc::encrypt(&plaintext, stretched.enc_key(), &iv);
    plaintext.zeroize();
    let ciphertext = ciphertext?;
    let mac = crate::mac::compute_mac(stretched.mac_key(), &iv, &ciphertext)?;
    Ok(Envelope {
        version: crate::types::ENVELOPE_VERSION,
        iv: iv.to_vec(),
        ciphertext,
        mac: mac.to_vec(),
    }
    .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_matches_first_hmac_block() {
        let secret = [0x42u8; 32];
        let mut mac = Hmac::<Sha256>::new_from_slice(&secret).unwrap();
        mac.update(b"enc\x01");
        let expected: [u8; 32] = mac.finalize().into_bytes().into();
        assert_eq!(hkdf_expand(&secret, ENC_INFO).unwrap(), expected);
    }

    #[test]
    fn short_secret_uses_same_construction() {
        let secret = [0x07u8; 16];
        let mut mac = Hmac::<Sha256>::new_from_slice(&secret).unwrap();
        mac.update(b"mac\x01");
        let expected: [u8; 32] = mac.finalize().into_bytes().into();
        assert_eq!(hkdf_expand(&secret, MAC_INFO).unwrap(), expected);
    }

    #[test]
    fn deterministic() {
        let a = derive_root_keys(b"an access secret that is long enough").unwrap();
        let b = derive_root_keys(b"an access secret that is long enough").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn enc_and_mac_differ() {
        let keys = derive_root_keys(&[0x42u8; 32]).unwrap();
        assert_ne!(keys.enc_key(), keys.mac_key());
    }

    #[test]
    fn unwrap_round_trip() {
        let stretched = derive_root_keys(&[0x42u8; 32]).unwrap();
        let working = KeyPair::generate().unwrap();
        let blob = wrap_working_keys(&working, &stretched).unwrap();
        assert_eq!(unwrap_working_keys(&blob, &stretched).unwrap(), working);
    }

    #[test]
    fn wrong_secret_fails_distinctly() {
        let stretched = derive_root_keys(&[0x42u8; 32]).unwrap();
        let other = derive_root_keys(&[0x43u8; 32]).unwrap();
        let blob = wrap_working_keys(&KeyPair::generate().unwrap(), &stretched).unwrap();
        assert!(matches!(
            unwrap_working_keys(&blob, &other),
            Err(CryptoError::KeyBlobMacMismatch)
        ));
    }

    #[test]
    fn short_blob_fails() {
        let stretched = derive_root_keys(&[0x42u8; 32]).unwrap();
        let blob = crate::envelope::encrypt_to_string(&"k".repeat(40), &stretched).unwrap();
        assert!(matches!(
            unwrap_working_keys(&blob, &stretched),
            Err(CryptoError::KeyBlobTooShort(48))
        ));
    }

    #[test]
    fn malformed_blob_fails() {
        let stretched = derive_root_keys(&[0x42u8; 32]).unwrap();
        assert!(matches!(
            unwrap_working_keys("not a blob", &stretched),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }
}
