//! WS-Security header carrying the caller's SAML 2.0 assertion.
//!
//! The assertion describes who is asking (subject, organization, home community) and why
//! (purpose of use). Its holder-of-key subject confirmation embeds the caller's RSA public key
//! and certificate, extracted from the supplied PEM on every build.

use crate::constants::*;
use crate::SamlResult;
use chrono::{DateTime, SecondsFormat, Utc};
use ihe_certificates::{extract_rsa_key_value, strip_pem_certificate};
use ihe_types::urn::wrap_id_in_urn_oid;
use ihe_xml::Element;
use serde::{Deserialize, Serialize};

/// Coded role of the requesting user (SNOMED CT).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRole {
    pub code: String,
    pub display: String,
}

/// Identity and authorization claims of the caller, asserted to every gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamlAttributes {
    pub subject_id: String,
    pub subject_role: SubjectRole,
    pub organization: String,
    pub organization_id: String,
    pub home_community_id: String,
    pub purpose_of_use: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_grantor_oid: Option<String>,
}

/// Inputs for one security header.
#[derive(Clone, Debug)]
pub struct SecurityHeader<'a> {
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    /// Destination endpoint; becomes the assertion's audience.
    pub to_url: &'a str,
    pub gateway_oid: Option<&'a str>,
    /// Issuer in e-mail form.
    pub issuer: &'a str,
    /// X.509 subject name used as the `NameID`.
    pub subject_name: &'a str,
    pub attributes: &'a SamlAttributes,
    /// PEM encoded signing certificate.
    pub public_cert: &'a str,
}

pub(crate) fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn purpose_of_use_display(code: &str) -> &str {
    match code {
        "TREATMENT" => "Treatment",
        "PAYMENT" => "Payment",
        "OPERATIONS" => "Healthcare Operations",
        "PUBLICHEALTH" => "Public Health",
        "REQUEST" => "Request of the Individual",
        "COVERAGE" => "Coverage",
        other => other,
    }
}

impl SecurityHeader<'_> {
    /// Build the `wsse:Security` element.
    ///
    /// # Errors
    ///
    /// Returns `SamlError::Certificate` if the public certificate cannot be parsed as RSA.
    pub fn build(&self) -> SamlResult<Element> {
        let key_value = extract_rsa_key_value(self.public_cert)?;
        let created = format_instant(&self.created);
        let expires = format_instant(&self.expires);

        let timestamp = Element::new("wsu:Timestamp")
            .with_attr("wsu:Id", TIMESTAMP_ID)
            .with_child(Element::new("wsu:Created").with_text(&created))
            .with_child(Element::new("wsu:Expires").with_text(&expires));

        let subject = Element::new("saml2:Subject")
            .with_child(
                Element::new("saml2:NameID")
                    .with_attr(
                        "Format",
                        "urn:oasis:names:tc:SAML:1.1:nameid-format:X509SubjectName",
                    )
                    .with_text(self.subject_name),
            )
            .with_child(
                Element::new("saml2:SubjectConfirmation")
                    .with_attr("Method", "urn:oasis:names:tc:SAML:2.0:cm:holder-of-key")
                    .with_child(
                        Element::new("saml2:SubjectConfirmationData").with_child(
                            Element::new("ds:KeyInfo")
                                .with_child(Element::new("ds:KeyValue").with_child(
                                    Element::new("ds:RSAKeyValue")
                                        .with_child(
                                            Element::new("ds:Modulus").with_text(&key_value.modulus),
                                        )
                                        .with_child(
                                            Element::new("ds:Exponent")
                                                .with_text(&key_value.exponent),
                                        ),
                                ))
                                .with_child(Element::new("ds:X509Data").with_child(
                                    Element::new("ds:X509Certificate")
                                        .with_text(strip_pem_certificate(self.public_cert)),
                                )),
                        ),
                    ),
            );

        let conditions = Element::new("saml2:Conditions")
            .with_attr("NotBefore", &created)
            .with_attr("NotOnOrAfter", &expires)
            .with_child(
                Element::new("saml2:AudienceRestriction")
                    .with_child(Element::new("saml2:Audience").with_text(self.to_url)),
            );

        let authn_statement = Element::new("saml2:AuthnStatement")
            .with_attr("AuthnInstant", &created)
            .with_child(
                Element::new("saml2:SubjectLocality")
                    .with_attr("Address", "127.0.0.1")
                    .with_attr("DNSName", "localhost"),
            )
            .with_child(Element::new("saml2:AuthnContext").with_child(
                Element::new("saml2:AuthnContextClassRef")
                    .with_text("urn:oasis:names:tc:SAML:2.0:ac:classes:X509"),
            ));

        let assertion = Element::new("saml2:Assertion")
            .with_attr("xmlns:saml2", NS_SAML2)
            .with_attr("xmlns:xsd", NS_XSD)
            .with_attr("xmlns:xsi", NS_XSI)
            .with_attr("ID", ASSERTION_ID)
            .with_attr("IssueInstant", &created)
            .with_attr("Version", "2.0")
            .with_attr("xsi:type", "saml2:AssertionType")
            .with_child(
                Element::new("saml2:Issuer")
                    .with_attr(
                        "Format",
                        "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress",
                    )
                    .with_text(self.issuer),
            )
            .with_child(subject)
            .with_child(conditions)
            .with_child(authn_statement)
            .with_child(self.attribute_statement());

        Ok(Element::new("wsse:Security")
            .with_attr("xmlns:wsse", NS_WSSE)
            .with_attr("xmlns:ds", NS_DS)
            .with_attr("xmlns:wsu", NS_WSU)
            .with_child(timestamp)
            .with_child(assertion))
    }

    fn attribute_statement(&self) -> Element {
        let attrs = self.attributes;
        let subject_id_format = if self.gateway_oid == Some(BASIC_NAME_FORMAT_GATEWAY_OID) {
            NAME_FORMAT_BASIC
        } else {
            NAME_FORMAT_URI
        };

        let text_attribute = |name: &str, format: &str, value: &str| {
            Element::new("saml2:Attribute")
                .with_attr("Name", name)
                .with_attr("NameFormat", format)
                .with_child(Element::new("saml2:AttributeValue").with_text(value))
        };

        let subject_id = Element::new("saml2:Attribute")
            .with_attr("Name", "urn:oasis:names:tc:xspa:1.0:subject:subject-id")
            .with_attr("NameFormat", subject_id_format)
            .with_child(
                Element::new("saml2:AttributeValue")
                    .with_attr("xsi:type", "xsd:string")
                    .with_text(&attrs.subject_id),
            );

        let role = Element::new("saml2:Attribute")
            .with_attr("Name", "urn:oasis:names:tc:xacml:2.0:subject:role")
            .with_child(
                Element::new("saml2:AttributeValue").with_child(
                    Element::new("hl7:Role")
                        .with_attr("xmlns:hl7", NS_HL7)
                        .with_attr("code", &attrs.subject_role.code)
                        .with_attr("codeSystem", SNOMED_CODE_SYSTEM)
                        .with_attr("codeSystemName", "SNOMED_CT")
                        .with_attr("displayName", &attrs.subject_role.display),
                ),
            );

        let purpose_of_use = Element::new("saml2:Attribute")
            .with_attr("Name", "urn:oasis:names:tc:xspa:1.0:subject:purposeofuse")
            .with_child(
                Element::new("saml2:AttributeValue").with_child(
                    Element::new("hl7:PurposeOfUse")
                        .with_attr("xmlns:hl7", NS_HL7)
                        .with_attr("xsi:type", "hl7:CE")
                        .with_attr("code", &attrs.purpose_of_use)
                        .with_attr("codeSystem", NHIN_PURPOSE_CODE_SYSTEM)
                        .with_attr("codeSystemName", "nhin-purpose")
                        .with_attr("displayName", purpose_of_use_display(&attrs.purpose_of_use)),
                ),
            );

        let query_grantor = attrs.query_grantor_oid.as_deref().map(|oid| {
            text_attribute(
                "QueryAuthGrantor",
                NAME_FORMAT_URI,
                &format!("Organization/{oid}"),
            )
        });

        Element::new("saml2:AttributeStatement")
            .with_child(subject_id)
            .with_child(text_attribute(
                "urn:oasis:names:tc:xspa:1.0:subject:organization",
                NAME_FORMAT_URI,
                &attrs.organization,
            ))
            .with_child(text_attribute(
                "urn:oasis:names:tc:xspa:1.0:subject:organization-id",
                NAME_FORMAT_URI,
                &wrap_id_in_urn_oid(&attrs.organization_id),
            ))
            .with_child(text_attribute(
                "urn:nhin:names:saml:homeCommunityId",
                NAME_FORMAT_URI,
                &wrap_id_in_urn_oid(&attrs.home_community_id),
            ))
            .with_child(role)
            .with_child(purpose_of_use)
            .with_optional_child(query_grantor)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) const CERT: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../testdata/saml-cert.pem"));

    pub(crate) fn attributes() -> SamlAttributes {
        SamlAttributes {
            subject_id: "America Inc".to_string(),
            subject_role: SubjectRole {
                code: "106331006".to_string(),
                display: "Administrative AND/OR managerial worker".to_string(),
            },
            organization: "White House Medical Inc".to_string(),
            organization_id: "2.16.840.1.113883.3.9621.5.213".to_string(),
            home_community_id: "2.16.840.1.113883.3.9621.5.213".to_string(),
            purpose_of_use: "TREATMENT".to_string(),
            query_grantor_oid: None,
        }
    }

    pub(crate) fn header<'a>(attrs: &'a SamlAttributes, gateway_oid: Option<&'a str>) -> SecurityHeader<'a> {
        let created = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .expect("valid instant");
        SecurityHeader {
            created,
            expires: created + chrono::Duration::minutes(5),
            to_url: "https://mock-metriport/soap/iti55",
            gateway_oid,
            issuer: "support@ihe.test.local",
            subject_name: "CN=ihe.test.local,OU=IHE,O=Test Gateway,ST=California,C=US",
            attributes: attrs,
            public_cert: CERT,
        }
    }

    fn attribute_named<'a>(security: &'a Element, name: &str) -> &'a Element {
        security
            .descendants_named("Attribute")
            .into_iter()
            .find(|a| a.attr("Name") == Some(name))
            .expect("attribute present")
    }

    #[test]
    fn builds_timestamp_and_assertion_with_fixed_ids() {
        let attrs = attributes();
        let security = header(&attrs, None).build().expect("build");

        let timestamp = security.child("Timestamp").expect("timestamp");
        assert_eq!(timestamp.attr("wsu:Id"), Some(TIMESTAMP_ID));
        assert_eq!(
            timestamp.child("Created").and_then(Element::trimmed_text).as_deref(),
            Some("2024-05-01T12:00:00.000Z")
        );
        assert_eq!(
            timestamp.child("Expires").and_then(Element::trimmed_text).as_deref(),
            Some("2024-05-01T12:05:00.000Z")
        );

        let assertion = security.child("Assertion").expect("assertion");
        assert_eq!(assertion.attr("ID"), Some(ASSERTION_ID));
        let first_child = assertion.child_elements().next().expect("first child");
        assert_eq!(first_child.local_name(), "Issuer");
        assert_eq!(
            assertion
                .descend(&["Conditions", "AudienceRestriction", "Audience"])
                .and_then(Element::trimmed_text)
                .as_deref(),
            Some("https://mock-metriport/soap/iti55")
        );
    }

    #[test]
    fn subject_confirmation_embeds_key_material() {
        let attrs = attributes();
        let security = header(&attrs, None).build().expect("build");
        let key_info = security
            .descend(&[
                "Assertion",
                "Subject",
                "SubjectConfirmation",
                "SubjectConfirmationData",
                "KeyInfo",
            ])
            .expect("key info");

        let exponent = key_info
            .descend(&["KeyValue", "RSAKeyValue", "Exponent"])
            .and_then(Element::trimmed_text);
        assert_eq!(exponent.as_deref(), Some("AQAB"));
        assert_eq!(
            key_info
                .descend(&["X509Data", "X509Certificate"])
                .and_then(Element::trimmed_text),
            Some(strip_pem_certificate(CERT))
        );
    }

    #[test]
    fn attribute_statement_wraps_ids_and_codes_purpose() {
        let attrs = attributes();
        let security = header(&attrs, None).build().expect("build");

        let home = attribute_named(&security, "urn:nhin:names:saml:homeCommunityId");
        assert_eq!(
            home.child("AttributeValue").and_then(Element::trimmed_text).as_deref(),
            Some("urn:oid:2.16.840.1.113883.3.9621.5.213")
        );

        let purpose = attribute_named(&security, "urn:oasis:names:tc:xspa:1.0:subject:purposeofuse")
            .find_descendant("PurposeOfUse")
            .expect("purpose");
        assert_eq!(purpose.attr("code"), Some("TREATMENT"));
        assert_eq!(purpose.attr("displayName"), Some("Treatment"));
        assert_eq!(purpose.attr("codeSystem"), Some(NHIN_PURPOSE_CODE_SYSTEM));

        let role = attribute_named(&security, "urn:oasis:names:tc:xacml:2.0:subject:role")
            .find_descendant("Role")
            .expect("role");
        assert_eq!(role.attr("code"), Some("106331006"));

        assert!(security
            .descendants_named("Attribute")
            .iter()
            .all(|a| a.attr("Name") != Some("QueryAuthGrantor")));
    }

    #[test]
    fn subject_id_name_format_depends_on_gateway() {
        let attrs = attributes();
        let name = "urn:oasis:names:tc:xspa:1.0:subject:subject-id";

        let default = header(&attrs, Some("2.16.840.1.113883.3.787.0.0")).build().expect("build");
        assert_eq!(attribute_named(&default, name).attr("NameFormat"), Some(NAME_FORMAT_URI));

        let basic = header(&attrs, Some(BASIC_NAME_FORMAT_GATEWAY_OID)).build().expect("build");
        assert_eq!(attribute_named(&basic, name).attr("NameFormat"), Some(NAME_FORMAT_BASIC));
    }

    #[test]
    fn query_grantor_is_added_when_present() {
        let mut attrs = attributes();
        attrs.query_grantor_oid = Some("1.2.3.4".to_string());
        let security = header(&attrs, None).build().expect("build");
        let grantor = attribute_named(&security, "QueryAuthGrantor");
        assert_eq!(
            grantor.child("AttributeValue").and_then(Element::trimmed_text).as_deref(),
            Some("Organization/1.2.3.4")
        );
    }
}
