//! Field envelope: `"<version>.<iv b64>|<ciphertext b64>|<mac b64>"`.
//!
//! Segments use the standard base64 alphabet with padding. The MAC is
//! HMAC-SHA256 over `iv || ciphertext` and is always checked before the
//! ciphertext is touched.

use std::fmt;
use std::sync::LazyLock;

use base64ct::{Base64, Encoding};
use regex::Regex;

use crate::aes_cbc;
use crate::error::CryptoError;
use crate::mac::{compute_mac, verify_mac};
use crate::types::{KeyPair, ENVELOPE_VERSION};

static ENVELOPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^2\.[A-Za-z0-9+/=]*\|[A-Za-z0-9+/=]*\|[A-Za-z0-9+/=]*$")
        .expect("envelope pattern is valid")
});

/// Whether `value` is shaped like a version-2 envelope.
pub fn is_envelope(value: &str) -> bool {
    ENVELOPE_PATTERN.is_match(value)
}

/// The still-encoded segments of an envelope string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeParts<'a> {
    pub version: u32,
    pub iv: &'a str,
    pub ciphertext: &'a str,
    pub mac: &'a str,
}

/// Split an envelope string into its segments without decoding them.
pub fn parse_envelope(value: &str) -> Result<EnvelopeParts<'_>, CryptoError> {
    if value.is_empty() {
        return Err(CryptoError::MalformedEnvelope("empty input"));
    }
    let (version, data) = value
        .split_once('.')
        .ok_or(CryptoError::MalformedEnvelope("missing version separator"))?;
    let version = version
        .parse::<u32>()
        .map_err(|_| CryptoError::MalformedEnvelope("version is not an integer"))?;

    let mut segments = data.splitn(3, '|');
    match (segments.next(), segments.next(), segments.next()) {
        (Some(iv), Some(ciphertext), Some(mac)) => Ok(EnvelopeParts {
            version,
            iv,
            ciphertext,
            mac,
        }),
        _ => Err(CryptoError::MalformedEnvelope("missing data separators")),
    }
}

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub version: u32,
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub mac: Vec<u8>,
}

impl Envelope {
    pub fn parse(value: &str) -> Result<Self, CryptoError> {
        let parts = parse_envelope(value)?;
        Ok(Self {
            version: parts.version,
            iv: decode_segment(parts.iv, "iv")?,
            ciphertext: decode_segment(parts.ciphertext, "ciphertext")?,
            mac: decode_segment(parts.mac, "mac")?,
        })
    }

    /// Validate the MAC with `mac_key`.
    pub fn verify(&self, mac_key: &[u8]) -> Result<(), CryptoError> {
        verify_mac(mac_key, &self.iv, &self.ciphertext, &self.mac)
    }

    /// AES-256-CBC decrypt without MAC check or padding removal.
    pub fn decrypt_raw(&self, enc_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        aes_cbc::decrypt(&self.ciphertext, enc_key, &self.iv)
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}|{}|{}",
            self.version,
            Base64::encode_string(&self.iv),
            Base64::encode_string(&self.ciphertext),
            Base64::encode_string(&self.mac)
        )
    }
}

fn decode_segment(segment: &str, name: &'static str) -> Result<Vec<u8>, CryptoError> {
    Base64::decode_vec(segment).map_err(|_| CryptoError::InvalidBase64 { segment: name })
}

/// Decode an envelope and AES-256-CBC decrypt it. No MAC check, no unpadding.
pub fn decrypt(value: &str, enc_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    Envelope::parse(value)?.decrypt_raw(enc_key)
}

/// Encrypt `plaintext` into an envelope string under `keys`.
pub fn encrypt_to_string(plaintext: &str, keys: &KeyPair) -> Result<String, CryptoError> {
    let iv = aes_cbc::generate_iv()?;
    let ciphertext = aes_cbc::encrypt(plaintext.as_bytes(), keys.enc_key(), &iv)?;
    let mac = compute_mac(keys.mac_key(), &iv, &ciphertext)?;
    Ok(Envelope {
        version: ENVELOPE_VERSION,
        iv: iv.to_vec(),
        ciphertext,
        mac: mac.to_vec(),
    }
    .to_string())
}

/// Verify, decrypt and unpad an envelope string.
///
/// An empty string decrypts to an empty string.
pub fn decrypt_to_string(value: &str, keys: &KeyPair) -> Result<String, CryptoError> {
    if value.is_empty() {
        return Ok(String::new());
    }
    let envelope = Envelope::parse(value)?;
    envelope.verify(keys.mac_key())?;
    let plaintext = aes_cbc::strip_padding(envelope.decrypt_raw(keys.enc_key())?);
    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> KeyPair {
        KeyPair::new([0x01; 32], [0x02; 32])
    }

    #[test]
    fn round_trip_boundary_lengths() {
        let keys = keys();
        for len in [0usize, 1, 15, 16, 17, 32, 100] {
            let plaintext = "x".repeat(len);
            let envelope = encrypt_to_string(&plaintext, &keys).unwrap();
            assert_eq!(decrypt_to_string(&envelope, &keys).unwrap(), plaintext);
        }
    }

    #[test]
    fn round_trip_unicode() {
        let keys = keys();
        let envelope = encrypt_to_string("pässwörd 🔑", &keys).unwrap();
        assert_eq!(decrypt_to_string(&envelope, &keys).unwrap(), "pässwörd 🔑");
    }

    #[test]
    fn output_shape() {
        let envelope = encrypt_to_string("value", &keys()).unwrap();
        assert!(envelope.starts_with("2."));
        assert!(is_envelope(&envelope));
        let parsed = Envelope::parse(&envelope).unwrap();
        assert_eq!(parsed.version, 2);
        assert_eq!(parsed.iv.len(), 16);
        assert_eq!(parsed.ciphertext.len(), 16);
        assert_eq!(parsed.mac.len(), 32);
    }

    #[test]
    fn empty_string_is_noop() {
        assert_eq!(decrypt_to_string("", &keys()).unwrap(), "");
    }

    #[test]
    fn encrypted_empty_string_round_trips() {
        let keys = keys();
        let envelope = encrypt_to_string("", &keys).unwrap();
        assert!(!envelope.is_empty());
        assert_eq!(decrypt_to_string(&envelope, &keys).unwrap(), "");
    }

    #[test]
    fn fresh_iv_per_call() {
        let keys = keys();
        assert_ne!(
            encrypt_to_string("same", &keys).unwrap(),
            encrypt_to_string("same", &keys).unwrap()
        );
    }

    #[test]
    fn tampered_mac_bit_fails() {
        let keys = keys();
        let envelope = Envelope::parse(&encrypt_to_string("secret", &keys).unwrap()).unwrap();
        for bit in 0..(envelope.mac.len() * 8) {
            let mut tampered = envelope.clone();
            tampered.mac[bit / 8] ^= 1 << (bit % 8);
            assert!(matches!(
                decrypt_to_string(&tampered.to_string(), &keys),
                Err(CryptoError::MacMismatch)
            ));
        }
    }

    #[test]
    fn tampered_ciphertext_fails_before_decrypt() {
        let keys = keys();
        let mut envelope = Envelope::parse(&encrypt_to_string("secret", &keys).unwrap()).unwrap();
        envelope.ciphertext.push(0);
        assert!(matches!(
            decrypt_to_string(&envelope.to_string(), &keys),
            Err(CryptoError::MacMismatch)
        ));
    }

    #[test]
    fn wrong_mac_key_fails() {
        let envelope = encrypt_to_string("secret", &keys()).unwrap();
        let other = KeyPair::new([0x01; 32], [0x03; 32]);
        assert!(matches!(
            decrypt_to_string(&envelope, &other),
            Err(CryptoError::MacMismatch)
        ));
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            parse_envelope(""),
            Err(CryptoError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            parse_envelope("2|a|b"),
            Err(CryptoError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            parse_envelope("2.a|b"),
            Err(CryptoError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            parse_envelope("x.a|b|c"),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn parse_segments() {
        let parts = parse_envelope("2.aXY=|Y3Q=|bWFj").unwrap();
        assert_eq!(parts.version, 2);
        assert_eq!(parts.iv, "aXY=");
        assert_eq!(parts.ciphertext, "Y3Q=");
        assert_eq!(parts.mac, "bWFj");
    }

    #[test]
    fn invalid_base64_segment() {
        assert!(matches!(
            Envelope::parse("2.!!!|Y3Q=|bWFj"),
            Err(CryptoError::InvalidBase64 { segment: "iv" })
        ));
    }

    #[test]
    fn raw_decrypt_requires_alignment() {
        let iv = Base64::encode_string(&[0u8; 16]);
        let ct = Base64::encode_string(&[0u8; 20]);
        let value = format!("2.{}|{}|", iv, ct);
        assert!(matches!(
            decrypt(&value, &[0u8; 32]),
            Err(CryptoError::NotBlockAligned(20))
        ));
    }

    #[test]
    fn pattern_rejects_plaintext() {
        assert!(!is_envelope("plain value"));
        assert!(!is_envelope("1700000000.5"));
        assert!(!is_envelope("v2.1|a|b"));
        assert!(!is_envelope("2.a b|c|d"));
    }
}
