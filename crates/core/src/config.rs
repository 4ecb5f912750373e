//! Gateway client configuration.
//!
//! Resolved once at process startup and passed by reference into [`crate::GatewayClient`], so
//! request handling never reads process-wide environment variables.

use crate::constants::{DEFAULT_ASSERTION_LIFETIME_MINUTES, DEFAULT_HTTP_TIMEOUT_SECS, REPLY_TO_ANONYMOUS};
use crate::{GatewayError, GatewayResult};
use ihe_types::{NonEmptyText, Oid};
use std::time::Duration;

/// HTTPS transport settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    pub timeout: Duration,
    /// Skip server certificate verification. The client certificate is still presented.
    pub trust_all_server_certificates: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            trust_all_server_certificates: false,
        }
    }
}

/// Sender identity and protocol settings shared by every outbound request.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    home_community_id: Oid,
    organization_name: NonEmptyText,
    saml_issuer: NonEmptyText,
    saml_subject_name: NonEmptyText,
    reply_to: String,
    assertion_lifetime: chrono::Duration,
    transport: TransportConfig,
}

impl GatewayConfig {
    /// Create a new `GatewayConfig` with default reply-to, assertion lifetime and transport.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidConfig` if the home community id is not an OID or any of
    /// the names is empty.
    pub fn new(
        home_community_id: &str,
        organization_name: &str,
        saml_issuer: &str,
        saml_subject_name: &str,
    ) -> GatewayResult<Self> {
        let home_community_id = Oid::parse(home_community_id)
            .map_err(|e| GatewayError::InvalidConfig(format!("home_community_id: {e}")))?;
        let required = |field: &str, value: &str| {
            NonEmptyText::new(value)
                .map_err(|_| GatewayError::InvalidConfig(format!("{field} cannot be empty")))
        };

        Ok(Self {
            home_community_id,
            organization_name: required("organization_name", organization_name)?,
            saml_issuer: required("saml_issuer", saml_issuer)?,
            saml_subject_name: required("saml_subject_name", saml_subject_name)?,
            reply_to: REPLY_TO_ANONYMOUS.to_string(),
            assertion_lifetime: chrono::Duration::minutes(DEFAULT_ASSERTION_LIFETIME_MINUTES),
            transport: TransportConfig::default(),
        })
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = reply_to.into();
        self
    }

    /// # Errors
    ///
    /// Returns `GatewayError::InvalidConfig` for a zero or negative lifetime.
    pub fn with_assertion_lifetime(mut self, lifetime: chrono::Duration) -> GatewayResult<Self> {
        if lifetime <= chrono::Duration::zero() {
            return Err(GatewayError::InvalidConfig(
                "assertion_lifetime must be positive".into(),
            ));
        }
        self.assertion_lifetime = lifetime;
        Ok(self)
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn home_community_id(&self) -> &Oid {
        &self.home_community_id
    }

    pub fn organization_name(&self) -> &str {
        self.organization_name.as_str()
    }

    pub fn saml_issuer(&self) -> &str {
        self.saml_issuer.as_str()
    }

    pub fn saml_subject_name(&self) -> &str {
        self.saml_subject_name.as_str()
    }

    pub fn reply_to(&self) -> &str {
        &self.reply_to
    }

    pub fn assertion_lifetime(&self) -> chrono::Duration {
        self.assertion_lifetime
    }

    pub fn transport(&self) -> &TransportConfig {
        &self.transport
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse the HTTP timeout (whole seconds) from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the default timeout.
pub fn timeout_from_env_value(value: Option<String>) -> GatewayResult<Duration> {
    match non_blank(value) {
        None => Ok(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS)),
        Some(v) => match v.parse::<u64>() {
            Ok(0) | Err(_) => Err(GatewayError::InvalidConfig(format!(
                "HTTP timeout must be a positive number of seconds, got '{v}'"
            ))),
            Ok(secs) => Ok(Duration::from_secs(secs)),
        },
    }
}

/// Parse the trust-all-server-certificates flag from an optional string value.
///
/// Accepts `true`/`false`/`1`/`0`/`yes`/`no` in any case; unset means `false`.
pub fn trust_all_from_env_value(value: Option<String>) -> GatewayResult<bool> {
    match non_blank(value).map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("false" | "0" | "no") => Ok(false),
        Some("true" | "1" | "yes") => Ok(true),
        Some(other) => Err(GatewayError::InvalidConfig(format!(
            "trust-all-server-certificates must be a boolean, got '{other}'"
        ))),
    }
}
