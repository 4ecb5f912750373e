//! HTTPS transport for signed envelopes.
//!
//! A send never fails: network errors, timeouts and non-2xx statuses are captured as
//! [`TransportOutcome::Failed`] so one gateway cannot disturb the rest of its batch.

use crate::config::TransportConfig;
use crate::constants::SOAP_CONTENT_TYPE;
use crate::envelope::SignedEnvelope;
use crate::models::Gateway;
use crate::{GatewayError, GatewayResult};
use async_trait::async_trait;
use futures::future::join_all;
use ihe_certificates::{client_identity_pem, SamlCertsAndKeys};
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};

/// Raw body of a 2xx response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoapResponse {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl SoapResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub(crate) fn is_multipart(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportOutcome {
    Response(SoapResponse),
    Failed { error: String },
}

impl TransportOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[async_trait]
pub trait SoapTransport: Send + Sync {
    async fn send(&self, url: &str, xml: &str) -> TransportOutcome;
}

/// Mutual-TLS HTTPS client shared by every send in a batch.
#[derive(Clone, Debug)]
pub struct HttpsTransport {
    client: reqwest::Client,
}

impl HttpsTransport {
    /// # Errors
    ///
    /// Returns `GatewayError::Certificate` if the key cannot be decrypted and
    /// `GatewayError::HttpClient` if the TLS client cannot be built.
    pub fn new(config: &TransportConfig, certs: &SamlCertsAndKeys) -> GatewayResult<Self> {
        let identity_pem = client_identity_pem(certs)?;
        let identity =
            reqwest::Identity::from_pem(&identity_pem).map_err(GatewayError::HttpClient)?;

        if config.trust_all_server_certificates {
            tracing::warn!("server certificate verification is disabled for gateway requests");
        }

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .identity(identity)
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.trust_all_server_certificates)
            .build()
            .map_err(GatewayError::HttpClient)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl SoapTransport for HttpsTransport {
    async fn send(&self, url: &str, xml: &str) -> TransportOutcome {
        let result = self
            .client
            .post(url)
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .header(CACHE_CONTROL, "no-cache")
            .body(xml.to_owned())
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(gateway = url, error = %e, "gateway request failed");
                return TransportOutcome::failed(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(gateway = url, status = status.as_u16(), "gateway returned an error status");
            return TransportOutcome::failed(format!("HTTP {} error", status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        match response.bytes().await {
            Ok(body) => TransportOutcome::Response(SoapResponse {
                content_type,
                body: body.to_vec(),
            }),
            Err(e) => TransportOutcome::failed(e.to_string()),
        }
    }
}

/// Send every envelope concurrently and wait for all of them.
///
/// Outcomes are returned in input order.
pub async fn dispatch_all<T, G, R>(
    transport: &T,
    envelopes: &[SignedEnvelope<G, R>],
) -> Vec<TransportOutcome>
where
    T: SoapTransport + ?Sized,
    G: Gateway + Sync,
    R: Sync,
{
    let sends = envelopes.iter().map(|envelope| async move {
        tracing::debug!(
            gateway = envelope.gateway.url(),
            home_community_id = envelope.gateway.home_community_id(),
            "sending envelope"
        );
        transport
            .send(envelope.gateway.url(), &envelope.signed_xml)
            .await
    });
    join_all(sends).await
}
