use ihe_certificates::CertificateError;
use ihe_saml::SamlError;

/// Errors raised before any network activity: invalid configuration, requests that would
/// produce a protocol-invalid envelope, and signing failures.
///
/// Transport and protocol outcomes are never errors; they are classified into response values.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("failed to sign envelope: {0}")]
    Signing(#[from] SamlError),
    #[error("certificate error: {0}")]
    Certificate(#[from] CertificateError),
    #[error("failed to build HTTPS client: {0}")]
    HttpClient(reqwest::Error),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    pub(crate) fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}
