//! Tamper-evidence digest over an event's fields.
//!
//! The digest is SHA-256 over the concatenation of `"key:value"` for every
//! field, taken in ascending key order, rendered as lowercase hex. Keys are
//! compared as plain byte strings, so `"cardid"` sorts before `"device"` and
//! `"timestamp-device"` sorts after `"sha"`.
//!
//! No separator is inserted between entries. The construction only has to be
//! reproducible by an auditor holding the same field values, which it is as
//! long as both sides render values identically (see
//! [`Event::signing_fields`](crate::Event::signing_fields)).
//!
//! # Example
//!
//! ```
//! use tagpost_core::{SignedFields, compute_signature};
//!
//! let mut fields = SignedFields::new();
//! fields.insert("owner", "alice".to_string());
//! fields.insert("cardid", "123".to_string());
//!
//! let digest = compute_signature(&fields);
//! assert_eq!(digest.len(), 64);
//! assert_eq!(digest, compute_signature(&fields));
//! ```

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Field name to rendered value, kept in ascending key order.
pub type SignedFields = BTreeMap<&'static str, String>;

/// Compute the lowercase hex SHA-256 signature of `fields`.
pub fn compute_signature(fields: &SignedFields) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in fields {
        hasher.update(key.as_bytes());
        hasher.update(b":");
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}
