//! Core types shared by the distribution client and the CLI.

pub mod cursor;
pub mod document;
pub mod request;

pub use cursor::{Cursor, CursorError};
pub use document::{
    AccessKey, AccessKeyError, BatchStatus, DocumentKind, NormalizedDocument, PollOutcome,
};
pub use request::{Environment, EnvironmentError, PollRequest, TaxId, TaxIdError};
