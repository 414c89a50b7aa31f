//! Distribution protocol pipeline: SOAP envelope codec, status interpretation,
//! `docZip` batch decoding, and the transport seam underneath them.

pub mod batch;
pub mod client;
pub mod envelope;
mod error;
pub mod status;
pub mod transport;
pub mod xml;

#[cfg(test)]
mod fixtures;

pub use batch::{BatchReport, DecodeError, DocumentFailure, decode_batch, decode_document};
pub use client::{ClientConfig, ConfigError, DistClient, decode_response, default_endpoint};
pub use envelope::{PollResponse, RawDocument, build_request, parse_response};
pub use error::DistError;
pub use status::{Classified, LOCKOUT_RETRY_AFTER, classify};
pub use transport::{DEFAULT_TIMEOUT, Transport, TransportError};

#[cfg(feature = "http")]
pub use transport::{ClientIdentity, HttpTransport};
