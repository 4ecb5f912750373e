//! Namespaces, algorithm identifiers and fixed ids used by the security header.

pub const NS_WSSE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const NS_WSSE11: &str = "http://docs.oasis-open.org/wss/oasis-wss-wssecurity-secext-1.1.xsd";
pub const NS_WSU: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
pub const NS_DS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const NS_SAML2: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
pub const NS_XSD: &str = "http://www.w3.org/2001/XMLSchema";
pub const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const NS_HL7: &str = "urn:hl7-org:v3";

pub const ALG_EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const ALG_ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
pub const ALG_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
pub const ALG_SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
pub const ALG_RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
pub const ALG_RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";

pub const TOKEN_TYPE_SAML2: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLV2.0";
pub const VALUE_TYPE_SAML_ID: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLID";

pub const TIMESTAMP_ID: &str = "TS-7c229e85-d62b-471e-9112-a49d1c365004";
pub const ASSERTION_ID: &str = "TS_3e57269d-075d-4d3f-9f5d-c97ad6afc009";

/// Gateway that rejects `subject-id` unless its NameFormat is `basic`.
pub const BASIC_NAME_FORMAT_GATEWAY_OID: &str = "1.3.6.1.4.1.41800.100";

pub const NAME_FORMAT_URI: &str = "urn:oasis:names:tc:SAML:2.0:attrname-format:uri";
pub const NAME_FORMAT_BASIC: &str = "urn:oasis:names:tc:SAML:2.0:attrname-format:basic";

pub const SNOMED_CODE_SYSTEM: &str = "2.16.840.1.113883.6.96";
pub const NHIN_PURPOSE_CODE_SYSTEM: &str = "2.16.840.1.113883.3.18.7.1";
