//! # IHE SAML
//!
//! WS-Security for outbound IHE SOAP requests: the SAML 2.0 security header, the XML-DSig
//! signing pipeline that signs it, and the verifier used both as a self-check and for inbound
//! responses. Canonicalization, digests and RSA signatures come from bergshamra.
//!
//! Signing always happens in the same order, enforced by the stage types in [`pipeline`]:
//!
//! 1. sign the `wsu:Timestamp` (signature inserted before it)
//! 2. sign the `saml2:Assertion` (signature inserted after its `Issuer`)
//! 3. attach `KeyInfo` to both signatures
//!
//! [`sign_full_saml`] runs all three, then verifies the result and refuses to return an
//! envelope it cannot verify itself.

pub mod constants;
mod dsig;
mod key_info;
pub mod pipeline;
mod security_header;
mod verify;

pub use pipeline::{
    sign_full_saml, AssertionSigned, SignedDocument, TimestampSigned, UnsignedEnvelope,
};
pub use security_header::{SamlAttributes, SecurityHeader, SubjectRole};
pub use verify::verify_xml_signatures;

use ihe_certificates::CertificateError;
use ihe_xml::XmlError;

#[derive(Debug, thiserror::Error)]
pub enum SamlError {
    #[error("certificate error: {0}")]
    Certificate(#[from] CertificateError),
    #[error("XML error: {0}")]
    Xml(#[from] XmlError),
    #[error("required element not found: {0}")]
    MissingElement(&'static str),
    #[error("{0} element has no Id attribute")]
    MissingId(&'static str),
    #[error("expected exactly one {kind} signature, found {found}")]
    SignatureCount { kind: &'static str, found: usize },
    #[error("XML signature error: {0}")]
    Dsig(#[from] bergshamra_core::Error),
    #[error("signed document failed self-verification")]
    SelfVerification,
}

pub type SamlResult<T> = std::result::Result<T, SamlError>;
