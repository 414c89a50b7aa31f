use std::time::Duration;

use distdfe_core::Cursor;
use thiserror::Error;

use crate::status::describe_wait;
use crate::transport::TransportError;

/// Everything a poll can fail with.
///
/// Every variant is terminal for the call that produced it; nothing in this
/// crate retries.
#[derive(Debug, Error)]
pub enum DistError {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The response did not match any known envelope layout.
    #[error("malformed response envelope: {reason}")]
    MalformedEnvelope { reason: String },

    /// Status 656: the authority throttled this identity.
    #[error("authority lockout (656): {message}; retry after {}", wait_text(.retry_after))]
    Lockout {
        retry_after: Duration,
        last_valid_cursor: Cursor,
        message: String,
    },

    #[error("authority rejected the request ({code}): {message}")]
    Remote { code: String, message: String },
}

fn wait_text(wait: &Duration) -> String {
    describe_wait(*wait)
}

impl DistError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            reason: reason.into(),
        }
    }

    /// Cursor the caller should persist even though the call failed.
    pub fn last_valid_cursor(&self) -> Option<Cursor> {
        match self {
            Self::Lockout {
                last_valid_cursor, ..
            } => Some(*last_valid_cursor),
            _ => None,
        }
    }
}
