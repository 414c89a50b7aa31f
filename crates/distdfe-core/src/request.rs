//! Taxpayer identity and the per-call poll request.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Cursor;

/// Authority environment (`tpAmb`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Staging,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown environment {0:?} (expected production or staging)")]
pub struct EnvironmentError(pub String);

impl Environment {
    /// Numeric code sent in `tpAmb`.
    pub fn code(self) -> &'static str {
        match self {
            Self::Production => "1",
            Self::Staging => "2",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
        }
    }
}

impl FromStr for Environment {
    type Err = EnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" | "1" => Ok(Self::Production),
            "staging" | "homologation" | "homologacao" | "2" => Ok(Self::Staging),
            other => Err(EnvironmentError(other.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaxIdError {
    #[error("tax id {0:?} contains characters other than digits and punctuation")]
    InvalidCharacters(String),
    #[error("tax id must have 14 (CNPJ) or 11 (CPF) digits, got {0}")]
    InvalidLength(usize),
}

/// Digits-only issuer identifier: a 14-digit CNPJ or an 11-digit CPF.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaxId(String);

impl TaxId {
    /// Build from user input, dropping the usual `.`, `/` and `-` separators.
    pub fn new(raw: &str) -> Result<Self, TaxIdError> {
        let trimmed = raw.trim();
        let mut digits = String::with_capacity(trimmed.len());
        for c in trimmed.chars() {
            match c {
                '0'..='9' => digits.push(c),
                '.' | '/' | '-' | ' ' => {}
                _ => return Err(TaxIdError::InvalidCharacters(trimmed.to_string())),
            }
        }
        match digits.len() {
            11 | 14 => Ok(Self(digits)),
            n => Err(TaxIdError::InvalidLength(n)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// XML element name that carries this identifier in request payloads.
    pub fn element_name(&self) -> &'static str {
        if self.is_cpf() { "CPF" } else { "CNPJ" }
    }

    pub fn is_cpf(&self) -> bool {
        self.0.len() == 11
    }
}

impl FromStr for TaxId {
    type Err = TaxIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TaxId {
    type Error = TaxIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<TaxId> for String {
    fn from(id: TaxId) -> Self {
        id.0
    }
}

/// Everything needed to render one distribution request.
///
/// Built fresh for every call from the caller's last-known cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    pub cursor: Cursor,
    pub issuer_tax_id: TaxId,
    /// IBGE code of the requesting state (`cUFAutor`), e.g. `43`.
    pub federated_unit_code: String,
    pub environment: Environment,
}
