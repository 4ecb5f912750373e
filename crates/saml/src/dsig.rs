//! XML-DSig on bergshamra: the outbound `ds:Signature` template, its placement next to the
//! signed element, and the key contexts that signing and verification run under.

use crate::constants::*;
use crate::{SamlError, SamlResult};
use bergshamra_dsig::sign::sign_document_node;
use bergshamra_dsig::DsigContext;
use bergshamra_keys::{loader, KeysManager};
use ihe_certificates::{certificate_der, SigningMaterial};
use ihe_xml::{Document, Element, NodePath};
use uppsala::NodeId;

/// Where to put the new `ds:Signature` relative to an anchor element.
#[derive(Clone, Debug)]
pub(crate) enum Placement {
    Before(NodePath),
    After(NodePath),
}

/// Context holding the decrypted signing key.
///
/// `DsigContext::new` keeps bergshamra's strict defaults: keys come from the manager only and
/// references must sit next to or around their signature.
pub(crate) fn signing_context(material: &SigningMaterial) -> SamlResult<DsigContext> {
    let pem = material.private_key_pem()?;
    let mut keys = KeysManager::new();
    keys.add_key(loader::load_rsa_private_pem(pem.as_bytes())?);
    Ok(DsigContext::new(keys))
}

/// Context that trusts only the key in `public_cert` (PEM or DER).
pub(crate) fn verification_context(public_cert: &str) -> SamlResult<DsigContext> {
    let der = certificate_der(public_cert.as_bytes())?;
    let mut keys = KeysManager::new();
    keys.add_key(loader::load_x509_cert_der(&der)?);
    Ok(DsigContext::new(keys))
}

/// Outbound signature template: exclusive c14n, enveloped-signature, SHA-1, RSA-SHA1.
///
/// Digest and signature values are left empty for bergshamra to fill.
fn signature_template(reference_id: &str) -> Element {
    let algorithm = |name: &str, uri: &str| Element::new(name).with_attr("Algorithm", uri);

    let signed_info = Element::new("ds:SignedInfo")
        .with_child(algorithm("ds:CanonicalizationMethod", ALG_EXC_C14N))
        .with_child(algorithm("ds:SignatureMethod", ALG_RSA_SHA1))
        .with_child(
            Element::new("ds:Reference")
                .with_attr("URI", format!("#{reference_id}"))
                .with_child(
                    Element::new("ds:Transforms")
                        .with_child(algorithm("ds:Transform", ALG_ENVELOPED_SIGNATURE))
                        .with_child(algorithm("ds:Transform", ALG_EXC_C14N)),
                )
                .with_child(algorithm("ds:DigestMethod", ALG_SHA1))
                .with_child(Element::new("ds:DigestValue")),
        );

    Element::new("ds:Signature")
        .with_attr("xmlns:ds", NS_DS)
        .with_child(signed_info)
        .with_child(Element::new("ds:SignatureValue"))
}

/// The `ds:Signature` whose reference points at `#reference_id`.
fn find_template(doc: &uppsala::Document<'_>, reference_id: &str) -> Option<NodeId> {
    let uri = format!("#{reference_id}");
    let is_dsig = |node: NodeId, local: &str| {
        doc.element(node).is_some_and(|el| {
            el.name.local_name == local && el.name.namespace_uri.as_deref() == Some(NS_DS)
        })
    };

    doc.descendants(doc.root()).into_iter().find(|&node| {
        is_dsig(node, "Signature")
            && doc.descendants(node).into_iter().any(|child| {
                is_dsig(child, "Reference") && doc.get_attribute(child, "URI") == Some(uri.as_str())
            })
    })
}

/// Insert a signature template at `placement`, have bergshamra sign the element carrying
/// `reference_id`, and return the new document.
pub(crate) fn sign_element(
    document: Document,
    reference_id: &str,
    placement: Placement,
    context: &DsigContext,
) -> SamlResult<Document> {
    let template = signature_template(reference_id);
    let document = match placement {
        Placement::Before(anchor) => document.insert_before(&anchor, template)?,
        Placement::After(anchor) => document.insert_after(&anchor, template)?,
    };

    let xml = document.to_xml();
    let mut parsed = uppsala::parse(&xml)
        .map_err(|e| SamlError::Dsig(bergshamra_core::Error::XmlParse(e.to_string())))?;
    let signature = find_template(&parsed, reference_id)
        .ok_or(SamlError::MissingElement("signature template"))?;
    sign_document_node(context, &mut parsed, signature)?;

    Ok(Document::parse(&parsed.to_xml())?)
}
