//! The polling entry point.

use std::time::Duration;

use distdfe_core::{Cursor, Environment, PollOutcome, PollRequest, TaxId};
use thiserror::Error;
use tracing::{info, warn};

use crate::transport::{DEFAULT_TIMEOUT, Transport};
use crate::{DistError, batch, envelope, status};

pub const PRODUCTION_ENDPOINT: &str =
    "https://www1.nfe.fazenda.gov.br/NFeDistribuicaoDFe/NFeDistribuicaoDFe.asmx";
pub const STAGING_ENDPOINT: &str =
    "https://hom1.nfe.fazenda.gov.br/NFeDistribuicaoDFe/NFeDistribuicaoDFe.asmx";

/// National distribution endpoint for an environment.
pub fn default_endpoint(environment: Environment) -> &'static str {
    match environment {
        Environment::Production => PRODUCTION_ENDPOINT,
        Environment::Staging => STAGING_ENDPOINT,
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("federated unit code must be two digits, got {0:?}")]
    UnitCode(String),
    #[error("endpoint must be an http(s) URL, got {0:?}")]
    Endpoint(String),
}

/// Fixed identity parameters of one taxpayer.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub issuer_tax_id: TaxId,
    pub federated_unit_code: String,
    pub environment: Environment,
    /// Defaults to [`default_endpoint`] for the environment.
    pub endpoint: Option<String>,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(issuer_tax_id: TaxId, federated_unit_code: impl Into<String>) -> Self {
        Self {
            issuer_tax_id,
            federated_unit_code: federated_unit_code.into(),
            environment: Environment::default(),
            endpoint: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Polls the distribution service for one taxpayer identity.
///
/// Holds no cursor: every call takes the caller's last-known cursor and hands
/// back the new one. Clones share the transport, so separate identities can be
/// polled concurrently from separate clients.
#[derive(Debug, Clone)]
pub struct DistClient<T> {
    transport: T,
    endpoint: String,
    timeout: Duration,
    issuer_tax_id: TaxId,
    federated_unit_code: String,
    environment: Environment,
}

impl<T: Transport> DistClient<T> {
    pub fn new(transport: T, config: ClientConfig) -> Result<Self, ConfigError> {
        let uf = config.federated_unit_code.trim().to_string();
        if uf.len() != 2 || !uf.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::UnitCode(uf));
        }

        let endpoint = config
            .endpoint
            .unwrap_or_else(|| default_endpoint(config.environment).to_string());
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            return Err(ConfigError::Endpoint(endpoint));
        }

        Ok(Self {
            transport,
            endpoint,
            timeout: config.timeout,
            issuer_tax_id: config.issuer_tax_id,
            federated_unit_code: uf,
            environment: config.environment,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Fetch the next batch after `last_cursor`.
    ///
    /// Exactly one round trip, no retries. On success the caller must persist
    /// `PollOutcome::new_cursor`; on [`DistError::Lockout`] it should persist
    /// `last_valid_cursor` and wait out `retry_after`.
    pub async fn poll_documents(&self, last_cursor: Cursor) -> Result<PollOutcome, DistError> {
        let request = PollRequest {
            cursor: last_cursor,
            issuer_tax_id: self.issuer_tax_id.clone(),
            federated_unit_code: self.federated_unit_code.clone(),
            environment: self.environment,
        };

        info!(
            cursor = %last_cursor,
            environment = %self.environment,
            endpoint = %self.endpoint,
            "polling distribution service"
        );
        let raw = self
            .transport
            .send(&self.endpoint, envelope::build_request(&request), self.timeout)
            .await?;

        let outcome = decode_response(&raw)?;
        info!(
            documents = outcome.documents.len(),
            dropped = outcome.dropped,
            new_cursor = %outcome.new_cursor,
            max_cursor = %outcome.max_cursor,
            "poll complete"
        );
        Ok(outcome)
    }
}

/// Run a raw response through envelope parsing, status classification and
/// batch decoding. No network involved, so saved responses can be replayed.
pub fn decode_response(raw: &[u8]) -> Result<PollOutcome, DistError> {
    let response = envelope::parse_response(raw)?;
    let classified = status::classify(response).inspect_err(|e| {
        warn!(error = %e, "distribution poll refused");
    })?;

    let report = batch::decode_batch(classified.batch);
    Ok(PollOutcome {
        documents: report.documents,
        new_cursor: classified.last_cursor,
        max_cursor: classified.max_cursor,
        status: classified.status,
        message: classified.message,
        dropped: report.failures.len(),
    })
}
