//! Raw AES-256-CBC with the service's padding convention.
//!
//! Padding: `n = 16 - (len % 16)` bytes of value `n` are appended, so a
//! block-aligned plaintext always gains a full extra block of `0x10`.
//! The cipher itself runs unpadded; padding is applied and stripped here.

use aes::Aes256;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::CryptoError;
use crate::types::{AES_BLOCK_SIZE, AES_KEY_LENGTH};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Generate a random 16-byte IV.
pub fn generate_iv() -> Result<[u8; AES_BLOCK_SIZE], CryptoError> {
    let mut iv = [0u8; AES_BLOCK_SIZE];
    getrandom::getrandom(&mut iv).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
    Ok(iv)
}

/// Append the pad bytes described in the module docs.
pub fn pad(plaintext: &[u8]) -> Vec<u8> {
    let pad_len = AES_BLOCK_SIZE - (plaintext.len() % AES_BLOCK_SIZE);
    let mut padded = Vec::with_capacity(plaintext.len() + pad_len);
    padded.extend_from_slice(plaintext);
    padded.resize(plaintext.len() + pad_len, pad_len as u8);
    padded
}

/// Strip padding by reading the final byte as the pad length.
///
/// If the pad length exceeds the data length the input is returned whole,
/// treated as already unpadded.
pub fn strip_padding(mut data: Vec<u8>) -> Vec<u8> {
    if let Some(&last) = data.last() {
        if let Some(keep) = data.len().checked_sub(last as usize) {
            data.truncate(keep);
        }
    }
    data
}

fn check_key(key: &[u8]) -> Result<(), CryptoError> {
    if key.len() != AES_KEY_LENGTH {
        return Err(CryptoError::InvalidKeyLength {
            expected: AES_KEY_LENGTH,
            got: key.len(),
        });
    }
    Ok(())
}

fn check_iv(iv: &[u8]) -> Result<(), CryptoError> {
    if iv.len() != AES_BLOCK_SIZE {
        return Err(CryptoError::InvalidIvLength(iv.len()));
    }
    Ok(())
}

/// Pad and encrypt `plaintext` with AES-256-CBC.
///
/// # Arguments
/// * `plaintext` - Data to encrypt (any length, including empty)
/// * `key` - 32-byte encryption key
/// * `iv` - 16-byte IV
///
/// # Returns
/// Ciphertext, always a non-zero multiple of 16 bytes.
pub fn encrypt(plaintext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_key(key)?;
    check_iv(iv)?;

    let mut buf = pad(plaintext);
    let len = buf.len();
    Aes256CbcEnc::new_from_slices(key, iv)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .map_err(|e| CryptoError::EncryptionFailed(format!("{:?}", e)))?;
    Ok(buf)
}

/// Decrypt block-aligned AES-256-CBC ciphertext. Padding is left in place.
pub fn decrypt(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_key(key)?;
    check_iv(iv)?;
    if ciphertext.len() % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::NotBlockAligned(ciphertext.len()));
    }

    let mut buf = ciphertext.to_vec();
    Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|e| CryptoError::DecryptionFailed(format!("{:?}", e)))?;
    Ok(buf)
}
