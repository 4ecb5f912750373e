//! Envelope builders.
//!
//! Each protocol has its own body type (`PatientDiscoveryBody`, `DocumentQueryBody`,
//! `DocumentRetrievalBody`) built from a validated request, so a request that would produce a
//! protocol-invalid envelope fails with `GatewayError::InvalidRequest` before anything is
//! serialized. The shared SOAP frame (addressing headers plus the WS-Security header) is
//! assembled here.

pub mod dq;
pub mod dr;
pub mod xcpd;

pub use dq::{create_and_sign_bulk_dq_requests, create_iti38_envelope, DocumentQueryBody};
pub use dr::{create_and_sign_bulk_dr_requests, create_iti39_envelope, DocumentRetrievalBody};
pub use xcpd::{create_and_sign_bulk_xcpd_requests, create_iti55_envelope, PatientDiscoveryBody};

use crate::constants::{NS_SOAP, NS_WSA};
use crate::{GatewayConfig, GatewayError, GatewayResult};
use chrono::{DateTime, Utc};
use ihe_saml::{SamlAttributes, SecurityHeader};
use ihe_types::urn::wrap_id_in_urn_uuid;
use ihe_xml::{Document, Element};

/// A signed envelope, the gateway it targets and the request it was built from.
#[derive(Clone, Debug)]
pub struct SignedEnvelope<G, R> {
    pub gateway: G,
    pub signed_xml: String,
    pub outbound_request: R,
}

/// Inputs shared by every envelope in one build.
#[derive(Clone, Copy, Debug)]
pub struct EnvelopeContext<'a> {
    pub config: &'a GatewayConfig,
    /// PEM encoded signing certificate, embedded in the assertion.
    pub public_cert: &'a str,
    pub created: DateTime<Utc>,
}

impl EnvelopeContext<'_> {
    pub(crate) fn expires(&self) -> DateTime<Utc> {
        self.created + self.config.assertion_lifetime()
    }
}

/// WS-Addressing values for one message.
pub(crate) struct Addressing<'a> {
    pub to_url: &'a str,
    pub action: &'a str,
    pub message_id: &'a str,
}

pub(crate) fn soap_envelope(
    ctx: &EnvelopeContext<'_>,
    addressing: Addressing<'_>,
    attributes: &SamlAttributes,
    gateway_oid: Option<&str>,
    body: Element,
) -> GatewayResult<String> {
    let security = SecurityHeader {
        created: ctx.created,
        expires: ctx.expires(),
        to_url: addressing.to_url,
        gateway_oid,
        issuer: ctx.config.saml_issuer(),
        subject_name: ctx.config.saml_subject_name(),
        attributes,
        public_cert: ctx.public_cert,
    }
    .build()?;

    let must_understand = |name: &str, text: &str| {
        Element::new(name)
            .with_attr("soap:mustUnderstand", "1")
            .with_text(text)
    };

    let header = Element::new("soap:Header")
        .with_child(must_understand("wsa:To", addressing.to_url))
        .with_child(must_understand("wsa:Action", addressing.action))
        .with_child(
            Element::new("wsa:MessageID").with_text(wrap_id_in_urn_uuid(addressing.message_id)),
        )
        .with_child(
            Element::new("wsa:ReplyTo")
                .with_child(Element::new("wsa:Address").with_text(ctx.config.reply_to())),
        )
        .with_child(security);

    let root = Element::new("soap:Envelope")
        .with_attr("xmlns:soap", NS_SOAP)
        .with_attr("xmlns:wsa", NS_WSA)
        .with_child(header)
        .with_child(Element::new("soap:Body").with_child(body));

    Ok(Document::new(root).to_xml())
}

/// HL7 compact timestamp, `YYYYMMDDHHmmss` in UTC.
pub(crate) fn hl7_timestamp(instant: &DateTime<Utc>) -> String {
    instant.format("%Y%m%d%H%M%S").to_string()
}

pub(crate) fn require<'a>(value: &'a str, what: &str) -> GatewayResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::invalid_request(format!("{what} is required")));
    }
    Ok(trimmed)
}
