//! Salted name hash shared with the service.
//!
//! `base64url_nopad(SHA256(decimal(salt) ++ utf8(name)))`

use base64ct::{Base64UrlUnpadded, Encoding};
use sha2::{Digest, Sha256};

/// Hash a secret key name or environment name under a project id.
pub fn name_hash(name: &str, salt: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.to_string().as_bytes());
    hasher.update(name.as_bytes());
    Base64UrlUnpadded::encode_string(&hasher.finalize())
}
