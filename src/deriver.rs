//! Bucket-key derivation for credential documents.
//!
//! The key store's load-testing views partition credentials into small
//! integer buckets by reading a few hex characters out of the credential
//! identifier and scaling them into a configured range. The deployed views
//! differ only by constants (digit count, substring position, bucket count,
//! key base, divisor), so all of them are expressed here as one pure
//! function over a [`DeriverConfig`].

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::document::{BasicCreds, CredsDocument, MacCreds};

/// Matches the credential type tag, e.g. `creds_v1.0`. Case-insensitive.
static CREDS_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^creds_v\d+\.\d+").unwrap());

/// Where in the identifier the hex digits are taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigitOffset {
    FromStart,
    FromEnd,
}

/// What a matching document emits alongside its bucket key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSelector {
    /// The credential sub-object the key was derived from.
    SubObject,
    /// The entire document.
    WholeDocument,
}

/// Whether the divisor is the raw digit range or range + 1.
///
/// The deployed views disagree on this and the difference is observable
/// (with `PlusOne` the top bucket is `bucket_count - 1 + key_offset`,
/// without it the maximum identifier lands on `bucket_count + key_offset`),
/// so it is explicit configuration rather than a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivisorCorrection {
    None,
    PlusOne,
}

/// Constants defining one bucketing view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeriverConfig {
    /// Number of hex characters read from the identifier (1..=16).
    pub digit_count: u32,
    pub digit_offset: DigitOffset,
    /// Multiplier defining the output range.
    pub bucket_count: u64,
    pub value_selector: ValueSelector,
    /// Additive base for the final key (1 for 1-based bucket numbering).
    pub key_offset: u64,
    pub divisor_correction: DivisorCorrection,
}

impl DeriverConfig {
    /// 1000 buckets over the leading four digits, 1-based.
    pub fn fine_spread() -> Self {
        Self {
            digit_count: 4,
            digit_offset: DigitOffset::FromStart,
            bucket_count: 1000,
            value_selector: ValueSelector::WholeDocument,
            key_offset: 1,
            divisor_correction: DivisorCorrection::PlusOne,
        }
    }

    /// 100 buckets over the leading four digits, 1-based, emitting the
    /// credential sub-object.
    pub fn percentile() -> Self {
        Self {
            digit_count: 4,
            digit_offset: DigitOffset::FromStart,
            bucket_count: 100,
            value_selector: ValueSelector::SubObject,
            key_offset: 1,
            divisor_correction: DivisorCorrection::PlusOne,
        }
    }

    /// 99 buckets over the trailing four digits, 0-based.
    pub fn sample_window() -> Self {
        Self {
            digit_count: 4,
            digit_offset: DigitOffset::FromEnd,
            bucket_count: 99,
            value_selector: ValueSelector::WholeDocument,
            key_offset: 0,
            divisor_correction: DivisorCorrection::None,
        }
    }

    /// 99 buckets over the trailing two digits, 0-based. Coarse but cheap.
    pub fn coarse_sample() -> Self {
        Self {
            digit_count: 2,
            digit_offset: DigitOffset::FromEnd,
            bucket_count: 99,
            value_selector: ValueSelector::WholeDocument,
            key_offset: 0,
            divisor_correction: DivisorCorrection::None,
        }
    }

    /// Checks the constants are usable: 1..=16 hex digits (the parse is
    /// 64-bit) and a non-zero bucket count.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.digit_count == 0 || self.digit_count > 16 {
            anyhow::bail!(
                "digit_count must be between 1 and 16, got {}",
                self.digit_count
            );
        }
        if self.bucket_count == 0 {
            anyhow::bail!("bucket_count must be positive");
        }
        Ok(())
    }

    /// The largest value representable by `digit_count` hex digits.
    fn digit_range(&self) -> u128 {
        (1u128 << (4 * self.digit_count)) - 1
    }
}

/// Per-document derivation failure. Callers skip the document and continue;
/// none of these abort a collection run.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeriveError {
    #[error("document carries neither basic nor mac credentials")]
    MalformedDocument,
    #[error("identifier has {actual} characters, bucketing needs {needed}")]
    IdentifierTooShort { needed: usize, actual: usize },
    #[error("extracted digits {digits:?} are not hexadecimal")]
    InvalidIdentifierFormat { digits: String },
}

/// The value half of an emission, borrowed from the source document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CredsValue<'a> {
    Basic(&'a BasicCreds),
    Mac(&'a MacCreds),
    Document(&'a CredsDocument),
}

/// One `(bucket key, value)` emission for a matching document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketAssignment<'a> {
    pub key: u64,
    pub value: CredsValue<'a>,
}

/// Classifies `doc` and, if it is a credential record, derives its bucket key.
///
/// Returns `Ok(None)` for documents whose type tag does not match — they are
/// simply outside the view, not an error. Deterministic and side-effect free:
/// the same document and config always produce the same output, and the
/// document is never mutated (the emitted value borrows from it).
pub fn derive_bucket_key<'a>(
    doc: &'a CredsDocument,
    config: &DeriverConfig,
) -> Result<Option<BucketAssignment<'a>>, DeriveError> {
    if !CREDS_TYPE.is_match(&doc.doc_type) {
        return Ok(None);
    }

    let (identifier, sub_object) = if let Some(basic) = &doc.basic {
        (basic.api_key.as_str(), CredsValue::Basic(basic))
    } else if let Some(mac) = &doc.mac {
        (mac.mac_key_identifier.as_str(), CredsValue::Mac(mac))
    } else {
        return Err(DeriveError::MalformedDocument);
    };

    let digits = extract_digits(identifier, config)?;

    // The all-hexdigit check above makes this infallible for <= 16 digits,
    // but keep the error path rather than unwrapping.
    let x = u64::from_str_radix(&digits, 16)
        .map_err(|_| DeriveError::InvalidIdentifierFormat { digits })?;

    let divisor = match config.divisor_correction {
        DivisorCorrection::None => config.digit_range(),
        DivisorCorrection::PlusOne => config.digit_range() + 1,
    };
    let scaled = (config.bucket_count as u128 * x as u128) / divisor;
    let key = scaled as u64 + config.key_offset;

    let value = match config.value_selector {
        ValueSelector::SubObject => sub_object,
        ValueSelector::WholeDocument => CredsValue::Document(doc),
    };

    Ok(Some(BucketAssignment { key, value }))
}

/// Pulls `digit_count` characters off the configured end of the identifier
/// and verifies they are all hex digits.
fn extract_digits(identifier: &str, config: &DeriverConfig) -> Result<String, DeriveError> {
    let needed = config.digit_count as usize;
    let chars: Vec<char> = identifier.chars().collect();

    if chars.len() < needed {
        return Err(DeriveError::IdentifierTooShort {
            needed,
            actual: chars.len(),
        });
    }

    let digits: String = match config.digit_offset {
        DigitOffset::FromStart => chars[..needed].iter().collect(),
        DigitOffset::FromEnd => chars[chars.len() - needed..].iter().collect(),
    };

    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DeriveError::InvalidIdentifierFormat { digits });
    }

    Ok(digits)
}
