//! Field-level codec over records that declare their string fields.
//!
//! A record implements [`SensitiveFields`] by handing each of its string,
//! optional-string and nested fields to a visitor. [`encrypt_fields`] and
//! [`decrypt_fields`] then work for any such record without knowing its type.

use crate::envelope::{decrypt_to_string, encrypt_to_string, is_envelope};
use crate::error::CryptoError;
use crate::types::KeyPair;

/// Field names never encrypted: the change-tracking reference and the
/// environment reference. Matched case-insensitively.
pub const DEFAULT_IDENTITY_FIELDS: &[&str] = &["update_env", "environment_id"];

/// Mutable view of one field handed to a visitor.
pub enum Field<'a> {
    Text(&'a mut String),
    OptionalText(&'a mut Option<String>),
    Nested(&'a mut dyn SensitiveFields),
}

/// Visitor callback: field name plus mutable access.
pub type FieldVisitor<'v> =
    dyn for<'f> FnMut(&'static str, Field<'f>) -> Result<(), CryptoError> + 'v;

/// Capability of a record whose string fields can be encrypted in place.
pub trait SensitiveFields {
    /// Call `visit` once per string, optional-string, or nested field.
    fn visit_fields(&mut self, visit: &mut FieldVisitor<'_>) -> Result<(), CryptoError>;

    /// Names excluded from encryption.
    fn identity_fields(&self) -> &'static [&'static str] {
        DEFAULT_IDENTITY_FIELDS
    }
}

/// Which operation a payload is encrypted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMode {
    /// Absent optional fields are sent as encrypted empty strings.
    Create,
    /// Absent optional fields stay absent so the server leaves them alone.
    Update,
}

fn is_identity(identity: &[&str], name: &str) -> bool {
    identity.iter().any(|id| id.eq_ignore_ascii_case(name))
}

fn decrypt_in_place(value: &mut String, keys: &KeyPair) -> Result<(), CryptoError> {
    if is_envelope(value) {
        *value = decrypt_to_string(value, keys)?;
    }
    Ok(())
}

/// Replace every envelope-shaped string in `record` with its plaintext.
///
/// Strings that are not envelopes (ids, dates, already-plain values) are
/// left as they are.
pub fn decrypt_fields<T>(record: &mut T, keys: &KeyPair) -> Result<(), CryptoError>
where
    T: SensitiveFields + ?Sized,
{
    record.visit_fields(&mut |_name, field| match field {
        Field::Text(value) => decrypt_in_place(value, keys),
        Field::OptionalText(Some(value)) => decrypt_in_place(value, keys),
        Field::OptionalText(None) => Ok(()),
        Field::Nested(inner) => decrypt_fields(inner, keys),
    })
}

/// Encrypt every non-identity string field of `record` in place.
pub fn encrypt_fields<T>(record: &mut T, keys: &KeyPair, mode: FieldMode) -> Result<(), CryptoError>
where
    T: SensitiveFields + ?Sized,
{
    let identity = record.identity_fields();
    record.visit_fields(&mut |name, field| {
        if let Field::Nested(inner) = field {
            return encrypt_fields(inner, keys, mode);
        }
        if is_identity(identity, name) {
            return Ok(());
        }
        match field {
            Field::Text(value) => {
                *value = encrypt_to_string(value, keys)?;
            }
            Field::OptionalText(slot) => {
                if let Some(value) = slot.as_mut() {
                    *value = encrypt_to_string(value, keys)?;
                } else if mode == FieldMode::Create {
                    *slot = Some(encrypt_to_string("", keys)?);
                }
            }
            Field::Nested(_) => {}
        }
        Ok(())
    })
}
