//! Normalized fiscal documents and the result of one poll.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Cursor;

/// Number of digits in an NF-e access key.
pub const ACCESS_KEY_LEN: usize = 44;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("access key must be exactly 44 digits, got {0:?}")]
pub struct AccessKeyError(pub String);

/// The 44-digit identifier of a fiscal document (chave de acesso).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessKey(String);

impl AccessKey {
    pub fn new(raw: &str) -> Result<Self, AccessKeyError> {
        let raw = raw.trim();
        if raw.len() == ACCESS_KEY_LEN && raw.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(raw.to_string()))
        } else {
            Err(AccessKeyError(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AccessKey {
    type Error = AccessKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<AccessKey> for String {
    fn from(key: AccessKey) -> Self {
        key.0
    }
}

/// Which of the two distributed shapes a document arrived as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// `resNFe`: the authority's summary of an invoice addressed to the taxpayer.
    Summary,
    /// `nfeProc`: the complete authorized invoice.
    Full,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Full => "full",
        }
    }
}

/// A decoded document, reduced to the fields both shapes share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedDocument {
    pub kind: DocumentKind,
    pub access_key: AccessKey,
    pub counterparty_name: String,
    pub counterparty_tax_id: String,
    pub total_value: Decimal,
    pub issued_at: DateTime<FixedOffset>,
    /// Decompressed original XML, kept for audit and download.
    pub raw_xml: String,
    pub sequence_number: Cursor,
}

/// Success flavour reported by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// `138`: at least one document located.
    DocumentsFound,
    /// `137`: nothing new after the requested cursor.
    NoDocuments,
}

/// What one successful poll hands back to the caller.
///
/// The caller owns persistence of `new_cursor` and must feed it into the next
/// poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOutcome {
    pub documents: Vec<NormalizedDocument>,
    pub new_cursor: Cursor,
    pub max_cursor: Cursor,
    pub status: BatchStatus,
    /// Authority's `xMotivo`, verbatim.
    pub message: String,
    /// Sub-documents that could not be decoded and were left out.
    pub dropped: usize,
}

impl PollOutcome {
    /// The authority holds documents beyond `new_cursor`.
    pub fn has_more(&self) -> bool {
        self.new_cursor < self.max_cursor
    }
}
