//! Interpretation of the authority's `cStat` codes.
//!
//! | code  | meaning                                   |
//! |-------|-------------------------------------------|
//! | `137` | no documents after the requested cursor   |
//! | `138` | documents located                         |
//! | `656` | consumo indevido: identity locked out     |
//! | other | rejection, surfaced verbatim              |

use std::time::Duration;

use distdfe_core::{BatchStatus, Cursor};

use crate::DistError;
use crate::envelope::{PollResponse, RawDocument};

pub const STATUS_NO_DOCUMENTS: &str = "137";
pub const STATUS_DOCUMENTS_FOUND: &str = "138";
pub const STATUS_LOCKOUT: &str = "656";

/// Advised wait after a 656 before polling the same identity again.
pub const LOCKOUT_RETRY_AFTER: Duration = Duration::from_secs(60 * 60);

/// A response the authority reported as successful, ready for batch decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub status: BatchStatus,
    pub message: String,
    pub last_cursor: Cursor,
    pub max_cursor: Cursor,
    pub batch: Vec<RawDocument>,
}

/// Split a parsed response into success, lockout or rejection.
///
/// Unknown codes are never treated as success.
pub fn classify(response: PollResponse) -> Result<Classified, DistError> {
    let PollResponse {
        status_code,
        status_message,
        last_cursor,
        max_cursor,
        batch,
        ..
    } = response;

    let status = match status_code.as_str() {
        STATUS_LOCKOUT => {
            return Err(DistError::Lockout {
                retry_after: LOCKOUT_RETRY_AFTER,
                last_valid_cursor: last_cursor,
                message: status_message,
            });
        }
        STATUS_DOCUMENTS_FOUND => BatchStatus::DocumentsFound,
        STATUS_NO_DOCUMENTS => BatchStatus::NoDocuments,
        _ => {
            return Err(DistError::Remote {
                code: status_code,
                message: status_message,
            });
        }
    };

    Ok(Classified {
        status,
        message: status_message,
        last_cursor,
        max_cursor,
        batch,
    })
}

/// Human phrasing of a wait period: "1 hour", "90 minutes", "30 seconds".
pub fn describe_wait(wait: Duration) -> String {
    let secs = wait.as_secs();
    let (n, unit) = if secs >= 3600 && secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else if secs >= 60 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}
