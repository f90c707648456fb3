//! Pre-shared-key validation of card contents.
//!
//! A provisioned card stores `<owner>,<suffix>` in its data blocks, where
//! `suffix` is the last six hex characters of
//! `sha256(owner ‖ decimal(card id) ‖ key)`. A card whose suffix does not
//! match was either written with another key or copied onto a different UID.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tagpost_core::{CardId, SignatureSuffix, constants::SIGNATURE_SUFFIX_LEN};

use crate::{ReaderError, Result};

/// Owner and suffix as stored on a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardText {
    pub owner: String,
    pub suffix: String,
}

impl CardText {
    /// Parse the text read from the card's data blocks.
    ///
    /// Trailing padding is removed first. Returns `Ok(None)` for a blank
    /// card.
    ///
    /// # Errors
    /// Returns `ReaderError::InvalidData` if the text is not exactly
    /// `<owner>,<suffix>`.
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let text = text.trim_end_matches([' ', '\0']);
        if text.is_empty() {
            return Ok(None);
        }

        let mut parts = text.split(',');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(suffix), None) => Ok(Some(Self {
                owner: owner.to_string(),
                suffix: suffix.to_string(),
            })),
            _ => Err(ReaderError::invalid_data(format!(
                "expected <owner>,<suffix>, got {text:?}"
            ))),
        }
    }

    pub fn encode(&self) -> String {
        format!("{},{}", self.owner, self.suffix)
    }
}

/// The suffix a card for `owner` with `card_id` must carry under `key`.
pub fn expected_suffix(owner: &str, card_id: CardId, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(owner.as_bytes());
    hasher.update(card_id.to_string().as_bytes());
    hasher.update(key.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[digest.len() - SIGNATURE_SUFFIX_LEN..].to_string()
}

/// Check a card's suffix against the pre-shared key.
pub fn validate_card(owner: &str, card_id: CardId, suffix: &SignatureSuffix, key: &str) -> bool {
    let expected = expected_suffix(owner, card_id, key);
    let presented = suffix.as_str().to_ascii_lowercase();
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}
