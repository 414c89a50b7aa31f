//! NSU cursor handling.
//!
//! The authority numbers every distributed document with an NSU (sequential
//! unique number). Clients poll "everything after NSU n" and get back the last
//! NSU served plus the highest NSU currently available.
//!
//! # Representations
//!
//! - Wire: exactly 15 decimal digits, zero-padded (`000000000003068`)
//! - Display / persistence: plain decimal (`3068`)
//!
//! Both forms parse back to the same [`Cursor`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of digits in the wire form of a cursor.
pub const CURSOR_WIDTH: usize = 15;

/// Largest cursor that fits in [`CURSOR_WIDTH`] digits.
pub const MAX_CURSOR: u64 = 999_999_999_999_999;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    #[error("cursor {0:?} is not a decimal number")]
    NotNumeric(String),
    #[error("cursor {0} exceeds the 15-digit NSU range")]
    OutOfRange(String),
}

/// A position in the authority's document sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cursor(u64);

impl Cursor {
    /// The start of the sequence. Polling from zero requests everything the
    /// authority still retains for the taxpayer.
    pub const ZERO: Cursor = Cursor(0);

    pub fn new(value: u64) -> Result<Self, CursorError> {
        if value > MAX_CURSOR {
            return Err(CursorError::OutOfRange(value.to_string()));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Render the 15-digit zero-padded form used in `ultNSU`.
    pub fn to_wire(self) -> String {
        format!("{:0width$}", self.0, width = CURSOR_WIDTH)
    }
}

impl FromStr for Cursor {
    type Err = CursorError;

    /// Accepts padded or unpadded decimal digits. Empty input is the start of
    /// the sequence.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::ZERO);
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CursorError::NotNumeric(s.to_string()));
        }

        let significant = s.trim_start_matches('0');
        if significant.len() > CURSOR_WIDTH {
            return Err(CursorError::OutOfRange(s.to_string()));
        }
        if significant.is_empty() {
            return Ok(Self::ZERO);
        }
        // At most 15 digits, always fits in u64.
        let value: u64 = significant
            .parse()
            .map_err(|_| CursorError::NotNumeric(s.to_string()))?;
        Self::new(value)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Cursor {
    type Error = CursorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cursor> for String {
    fn from(cursor: Cursor) -> Self {
        cursor.to_string()
    }
}
