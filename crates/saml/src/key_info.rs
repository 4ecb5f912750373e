use crate::constants::*;
use ihe_certificates::SigningMaterial;
use ihe_xml::Element;

/// `KeyInfo` for the assertion's own signature: RSA key value plus the raw certificate.
pub(crate) fn assertion_key_info(material: &SigningMaterial) -> Element {
    let key_value = material.rsa_key_value();
    Element::new("ds:KeyInfo")
        .with_child(
            Element::new("ds:KeyValue").with_child(
                Element::new("ds:RSAKeyValue")
                    .with_child(Element::new("ds:Modulus").with_text(key_value.modulus))
                    .with_child(Element::new("ds:Exponent").with_text(key_value.exponent)),
            ),
        )
        .with_child(
            Element::new("ds:X509Data").with_child(
                Element::new("ds:X509Certificate").with_text(material.certificate_base64()),
            ),
        )
}

/// `KeyInfo` for the timestamp signature: a token reference to the assertion by its id.
pub(crate) fn token_reference_key_info(assertion_id: &str) -> Element {
    Element::new("ds:KeyInfo").with_child(
        Element::new("wsse:SecurityTokenReference")
            .with_attr("xmlns:wsse11", NS_WSSE11)
            .with_attr("wsse11:TokenType", TOKEN_TYPE_SAML2)
            .with_child(
                Element::new("wsse:KeyIdentifier")
                    .with_attr("ValueType", VALUE_TYPE_SAML_ID)
                    .with_text(assertion_id),
            ),
    )
}
