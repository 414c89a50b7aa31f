//! Request/response transport for the distribution web service.
//!
//! [`Transport`] is the seam between the protocol pipeline and the network.
//! The production implementation, [`HttpTransport`], is behind the `http`
//! feature: a reqwest client carrying the taxpayer's client certificate.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Upper bound on one round trip unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// `Content-Type` for SOAP 1.1 requests.
pub const SOAP_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// `SOAPAction` header value (quoted, as SOAP 1.1 requires).
pub const SOAP_ACTION: &str =
    "\"http://www.portalfiscal.inf.br/nfe/wsdl/NFeDistribuicaoDFe/nfeDistDFeInteresse\"";

#[derive(Error, Debug)]
pub enum TransportError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("client certificate rejected: {0}")]
    Identity(String),

    #[error("reading client certificate: {0}")]
    Io(#[from] std::io::Error),
}

/// One synchronous-looking exchange: send an envelope, get the response body.
///
/// Implementations must not retry; retry policy belongs to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        endpoint: &str,
        envelope: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(
        &self,
        endpoint: &str,
        envelope: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        (**self).send(endpoint, envelope, timeout).await
    }
}

#[cfg(feature = "http")]
pub use http::{ClientIdentity, HttpTransport};

#[cfg(feature = "http")]
mod http {
    use std::path::Path;
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::header::CONTENT_TYPE;
    use tracing::{debug, info};

    use super::{SOAP_ACTION, SOAP_CONTENT_TYPE, Transport, TransportError};

    /// Client certificate material, read once at startup.
    pub enum ClientIdentity {
        /// `.pfx` / `.p12` archive protected by a passphrase (the usual A1
        /// certificate format).
        Pkcs12 { der: Vec<u8>, passphrase: String },
        /// PEM bundle holding the certificate chain and an unencrypted key.
        Pem(Vec<u8>),
    }

    impl ClientIdentity {
        pub fn pkcs12_file(path: &Path, passphrase: &str) -> Result<Self, TransportError> {
            Ok(Self::Pkcs12 {
                der: std::fs::read(path)?,
                passphrase: passphrase.to_string(),
            })
        }

        pub fn pem_file(path: &Path) -> Result<Self, TransportError> {
            Ok(Self::Pem(std::fs::read(path)?))
        }
    }

    impl std::fmt::Debug for ClientIdentity {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::Pkcs12 { der, .. } => write!(f, "Pkcs12({} bytes)", der.len()),
                Self::Pem(pem) => write!(f, "Pem({} bytes)", pem.len()),
            }
        }
    }

    /// mTLS transport over reqwest.
    ///
    /// Cloning is cheap and shares the connection pool and identity, so one
    /// instance can serve concurrent polls.
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: reqwest::Client,
    }

    impl HttpTransport {
        /// Build a client presenting `identity`.
        ///
        /// Fails immediately if the certificate or passphrase is invalid.
        /// Server certificate validation is switched off: the authority's
        /// endpoints are trusted by configuration, and their chains do not
        /// verify against the public CA roots.
        pub fn new(identity: ClientIdentity) -> Result<Self, TransportError> {
            let builder = reqwest::Client::builder().danger_accept_invalid_certs(true);
            let builder = match identity {
                ClientIdentity::Pkcs12 { der, passphrase } => {
                    let id = reqwest::Identity::from_pkcs12_der(&der, &passphrase)
                        .map_err(|e| TransportError::Identity(e.to_string()))?;
                    builder.use_native_tls().identity(id)
                }
                ClientIdentity::Pem(pem) => {
                    let id = reqwest::Identity::from_pem(&pem)
                        .map_err(|e| TransportError::Identity(e.to_string()))?;
                    builder.use_rustls_tls().identity(id)
                }
            };
            let client = builder.build()?;
            info!("client certificate loaded");
            Ok(Self { client })
        }

        /// Wrap an already configured client.
        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn send(
            &self,
            endpoint: &str,
            envelope: Vec<u8>,
            timeout: Duration,
        ) -> Result<Vec<u8>, TransportError> {
            debug!(endpoint, bytes = envelope.len(), "sending SOAP request");
            let resp = self
                .client
                .post(endpoint)
                .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
                .header("SOAPAction", SOAP_ACTION)
                .timeout(timeout)
                .body(envelope)
                .send()
                .await
                .map_err(|e| from_reqwest(e, timeout))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(TransportError::Server {
                    status: status.as_u16(),
                    body,
                });
            }

            let body = resp.bytes().await.map_err(|e| from_reqwest(e, timeout))?;
            debug!(bytes = body.len(), "received SOAP response");
            Ok(body.to_vec())
        }
    }

    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(timeout)
        } else {
            TransportError::Http(err)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use wiremock::matchers::{body_string_contains, header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn transport() -> HttpTransport {
            HttpTransport::with_client(reqwest::Client::new())
        }

        #[tokio::test]
        async fn posts_envelope_with_soap_headers() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/NFeDistribuicaoDFe.asmx"))
                .and(header("content-type", SOAP_CONTENT_TYPE))
                .and(header("SOAPAction", SOAP_ACTION))
                .and(body_string_contains("<ultNSU>000000000000007</ultNSU>"))
                .respond_with(ResponseTemplate::new(200).set_body_string("<ok/>"))
                .expect(1)
                .mount(&server)
                .await;

            let url = format!("{}/NFeDistribuicaoDFe.asmx", server.uri());
            let body = transport()
                .send(
                    &url,
                    b"<ultNSU>000000000000007</ultNSU>".to_vec(),
                    Duration::from_secs(5),
                )
                .await
                .unwrap();
            assert_eq!(body, b"<ok/>");
        }

        #[tokio::test]
        async fn non_2xx_is_server_error() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(500).set_body_string("soap fault"))
                .mount(&server)
                .await;

            let err = transport()
                .send(&server.uri(), Vec::new(), Duration::from_secs(5))
                .await
                .unwrap_err();
            match err {
                TransportError::Server { status, body } => {
                    assert_eq!(status, 500);
                    assert_eq!(body, "soap fault");
                }
                other => panic!("expected server error, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn slow_response_times_out() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
                .mount(&server)
                .await;

            let timeout = Duration::from_millis(100);
            let err = transport()
                .send(&server.uri(), Vec::new(), timeout)
                .await
                .unwrap_err();
            assert!(matches!(err, TransportError::Timeout(t) if t == timeout), "{err:?}");
        }

        #[tokio::test]
        async fn unreachable_endpoint_is_http_error() {
            // Port 9 (discard) on localhost is expected to refuse connections.
            let err = transport()
                .send("http://127.0.0.1:9/", Vec::new(), Duration::from_secs(2))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                TransportError::Http(_) | TransportError::Timeout(_)
            ));
        }

        #[test]
        fn invalid_pkcs12_fails_fast() {
            let err = HttpTransport::new(ClientIdentity::Pkcs12 {
                der: b"definitely not a certificate".to_vec(),
                passphrase: "secret".into(),
            })
            .err()
            .expect("garbage certificate must be rejected");
            assert!(matches!(err, TransportError::Identity(_)));
        }

        #[test]
        fn invalid_pem_fails_fast() {
            let err = HttpTransport::new(ClientIdentity::Pem(b"-----BEGIN NOTHING-----".to_vec()))
                .err()
                .expect("garbage PEM must be rejected");
            assert!(matches!(err, TransportError::Identity(_)));
        }

        #[test]
        fn missing_certificate_file_is_io_error() {
            let err =
                ClientIdentity::pkcs12_file(Path::new("/nonexistent/cert.pfx"), "x").unwrap_err();
            assert!(matches!(err, TransportError::Io(_)));
        }
    }
}
