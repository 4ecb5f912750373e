//! Typed signing pipeline.
//!
//! Each stage consumes the previous stage's output, so the timestamp is always signed before the
//! assertion, and key info is only inserted once both signatures exist:
//!
//! ```text
//! UnsignedEnvelope -> TimestampSigned -> AssertionSigned -> SignedDocument
//! ```

use crate::constants::NS_DS;
use crate::dsig::{sign_element, signing_context, Placement};
use crate::key_info::{assertion_key_info, token_reference_key_info};
use crate::verify::verify_xml_signatures;
use crate::{SamlError, SamlResult};
use bergshamra_dsig::DsigContext;
use ihe_certificates::{SamlCertsAndKeys, SigningMaterial};
use ihe_xml::{Document, NodePath};

/// A SOAP envelope containing an unsigned `wsse:Security` header.
#[derive(Clone, Debug)]
pub struct UnsignedEnvelope {
    document: Document,
}

/// The timestamp has been signed; the assertion has not.
#[derive(Clone, Debug)]
pub struct TimestampSigned {
    document: Document,
}

/// Both signatures exist but carry no `KeyInfo` yet.
#[derive(Clone, Debug)]
pub struct AssertionSigned {
    document: Document,
}

/// Fully signed envelope, ready to send.
#[derive(Clone, Debug)]
pub struct SignedDocument {
    document: Document,
}

impl UnsignedEnvelope {
    pub fn parse(xml: &str) -> SamlResult<Self> {
        Ok(Self::from_document(Document::parse(xml)?))
    }

    pub fn from_document(document: Document) -> Self {
        Self { document }
    }

    /// Sign the `Timestamp`, inserting the signature immediately before it.
    pub fn sign_timestamp(self, context: &DsigContext) -> SamlResult<TimestampSigned> {
        let document = self.document;
        let target = document
            .find_first(|el| el.local_name() == "Timestamp")
            .ok_or(SamlError::MissingElement("Timestamp"))?;
        let id = element_id(&document, &target, "Timestamp")?;

        let document = sign_element(document, &id, Placement::Before(target), context)?;
        Ok(TimestampSigned { document })
    }
}

impl TimestampSigned {
    /// Sign the `Assertion`, inserting the signature immediately after its `Issuer`.
    pub fn sign_assertion(self, context: &DsigContext) -> SamlResult<AssertionSigned> {
        let document = self.document;
        let target = document
            .find_first(|el| el.local_name() == "Assertion")
            .ok_or(SamlError::MissingElement("Assertion"))?;
        let id = element_id(&document, &target, "Assertion")?;
        let issuer = document
            .child_path(&target, "Issuer")
            .ok_or(SamlError::MissingElement("Issuer"))?;

        let document = sign_element(document, &id, Placement::After(issuer), context)?;
        Ok(AssertionSigned { document })
    }
}

impl AssertionSigned {
    /// Attach `KeyInfo` to both signatures.
    ///
    /// The assertion's signature receives the RSA key value and certificate; the signature in
    /// the security header receives a token reference to the assertion id.
    pub fn insert_key_info(self, material: &SigningMaterial) -> SamlResult<SignedDocument> {
        let document = self.document;
        let assertion = document
            .find_first(|el| el.local_name() == "Assertion")
            .ok_or(SamlError::MissingElement("Assertion"))?;
        let assertion_id = element_id(&document, &assertion, "Assertion")?;

        let signatures = signature_paths(&document);
        let (inner, outer): (Vec<NodePath>, Vec<NodePath>) =
            signatures.into_iter().partition(|path| {
                path.split_last()
                    .is_some_and(|(parent, _)| parent == assertion)
            });

        let assertion_signature = exactly_one(inner, "assertion")?;
        let header_signature = exactly_one(outer, "security header")?;

        let document = document
            .append_child(&assertion_signature, assertion_key_info(material))?
            .append_child(&header_signature, token_reference_key_info(&assertion_id))?;
        Ok(SignedDocument { document })
    }
}

impl SignedDocument {
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn to_xml(&self) -> String {
        self.document.to_xml()
    }
}

fn element_id(document: &Document, path: &NodePath, kind: &'static str) -> SamlResult<String> {
    document
        .element_at(path)
        .and_then(|el| el.id())
        .map(str::to_owned)
        .ok_or(SamlError::MissingId(kind))
}

pub(crate) fn signature_paths(document: &Document) -> Vec<NodePath> {
    document
        .find_paths(|el| el.local_name() == "Signature")
        .into_iter()
        .filter(|path| document.namespace_uri(path).as_deref() == Some(NS_DS))
        .collect()
}

fn exactly_one(paths: Vec<NodePath>, kind: &'static str) -> SamlResult<NodePath> {
    let found = paths.len();
    let mut paths = paths.into_iter();
    match (paths.next(), paths.next()) {
        (Some(path), None) => Ok(path),
        _ => Err(SamlError::SignatureCount { kind, found }),
    }
}

/// Decrypt the key, sign timestamp then assertion, insert key info, and self-verify.
///
/// The decrypted key and the signing context holding it live only for the duration of this call.
///
/// # Errors
///
/// Returns `SamlError::Certificate` for bad key material or passphrase, structural errors if
/// the envelope lacks a timestamp or assertion, and `SamlError::SelfVerification` if the
/// produced document does not verify against `certs.public_cert`.
pub fn sign_full_saml(xml: &str, certs: &SamlCertsAndKeys) -> SamlResult<String> {
    let signed = {
        let material = SigningMaterial::load(certs)?;
        let context = signing_context(&material)?;
        UnsignedEnvelope::parse(xml)?
            .sign_timestamp(&context)?
            .sign_assertion(&context)?
            .insert_key_info(&material)?
    };

    let signed_xml = signed.to_xml();
    if !verify_xml_signatures(&signed_xml, &certs.public_cert) {
        tracing::error!("freshly signed envelope failed self-verification");
        return Err(SamlError::SelfVerification);
    }
    Ok(signed_xml)
}
