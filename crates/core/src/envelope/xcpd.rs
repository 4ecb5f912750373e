//! ITI-55 Cross Gateway Patient Discovery request (`PRPA_IN201305UV02`).

use super::{hl7_timestamp, require, soap_envelope, Addressing, EnvelopeContext, SignedEnvelope};
use crate::constants::*;
use crate::models::{Address, OutboundPatientDiscoveryReq, XcpdGateway};
use crate::{GatewayConfig, GatewayError, GatewayResult};
use chrono::Utc;
use ihe_certificates::SamlCertsAndKeys;
use ihe_saml::sign_full_saml;
use ihe_xml::Element;

/// Validated content of one patient-discovery query body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientDiscoveryBody<'a> {
    pub message_id: &'a str,
    /// Root of the message and query ids: the requester's home community.
    pub requester_home_community_id: &'a str,
    pub sender_oid: &'a str,
    pub sender_organization: &'a str,
    pub receiver_oid: &'a str,
    pub to_url: &'a str,
    pub creation_time: String,
    pub gender_code: &'static str,
    pub birth_time: String,
    pub family_name: &'a str,
    pub given_name: &'a str,
    pub address: Option<&'a Address>,
    pub telecom: Option<&'a str>,
    pub provider_id: Option<&'a str>,
    /// Children are `urn:`-prefixed except for the one gateway that rejects it.
    pub prefixed: bool,
}

impl<'a> PatientDiscoveryBody<'a> {
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidRequest` when the request lacks an id, a first family or
    /// given name, or a well-formed birth date, or when the gateway has no URL or OID.
    pub fn from_request(
        request: &'a OutboundPatientDiscoveryReq,
        gateway: &'a XcpdGateway,
        ctx: &EnvelopeContext<'a>,
    ) -> GatewayResult<Self> {
        let patient = &request.patient_resource;
        let name = patient
            .name
            .first()
            .ok_or_else(|| GatewayError::invalid_request("patient name is required"))?;
        let given = name
            .given
            .first()
            .ok_or_else(|| GatewayError::invalid_request("patient given name is required"))?;
        let birth_date = patient
            .birth_date
            .as_deref()
            .ok_or_else(|| GatewayError::invalid_request("patient birth date is required"))?;

        Ok(Self {
            message_id: require(&request.id, "request id")?,
            requester_home_community_id: require(
                &request.saml_attributes.home_community_id,
                "SAML home community id",
            )?,
            sender_oid: ctx.config.home_community_id().as_str(),
            sender_organization: ctx.config.organization_name(),
            receiver_oid: require(&gateway.oid, "gateway oid")?,
            to_url: require(&gateway.url, "gateway url")?,
            creation_time: hl7_timestamp(&ctx.created),
            gender_code: patient.gender.to_hl7(),
            birth_time: hl7_birth_time(birth_date)?,
            family_name: require(&name.family, "patient family name")?,
            given_name: require(given, "patient given name")?,
            address: patient.address.first(),
            telecom: patient
                .telecom
                .first()
                .and_then(|t| t.value.as_deref())
                .filter(|v| !v.trim().is_empty()),
            provider_id: request
                .principal_care_provider_ids
                .first()
                .map(String::as_str)
                .filter(|v| !v.trim().is_empty()),
            prefixed: gateway.url != UNPREFIXED_BODY_GATEWAY_URL,
        })
    }

    pub fn to_element(&self) -> Element {
        let p = if self.prefixed { "urn:" } else { "" };
        let el = |name: &str| Element::new(format!("{p}{name}"));
        let id = |root: &str| el("id").with_attr("root", root);
        let parameter = |name: &str, value: Element, semantics: &str| {
            el(name)
                .with_child(value)
                .with_child(el("semanticsText").with_text(semantics))
        };

        let receiver = el("receiver").with_attr("typeCode", "RCV").with_child(
            el("device")
                .with_attr("classCode", "DEV")
                .with_attr("determinerCode", "INSTANCE")
                .with_child(id(self.receiver_oid))
                .with_child(el("telecom").with_attr("value", self.to_url))
                .with_child(
                    el("asAgent").with_attr("classCode", "AGNT").with_child(
                        el("representedOrganization")
                            .with_attr("classCode", "ORG")
                            .with_attr("determinerCode", "INSTANCE")
                            .with_child(id(self.receiver_oid)),
                    ),
                ),
        );

        let sender = el("sender").with_attr("typeCode", "SND").with_child(
            el("device")
                .with_attr("classCode", "DEV")
                .with_attr("determinerCode", "INSTANCE")
                .with_child(id(self.sender_oid))
                .with_child(
                    el("asAgent").with_attr("classCode", "AGNT").with_child(
                        el("representedOrganization")
                            .with_attr("classCode", "ORG")
                            .with_attr("determinerCode", "INSTANCE")
                            .with_child(id(self.sender_oid))
                            .with_child(el("name").with_text(self.sender_organization)),
                    ),
                ),
        );

        let address = self.address.map(|address| {
            let line = (!address.line.is_empty()).then(|| {
                el("streetAddressLine").with_text(address.line.join(", "))
            });
            let part = |name: &str, value: &Option<String>| {
                value.as_deref().map(|v| el(name).with_text(v))
            };
            parameter(
                "patientAddress",
                el("value")
                    .with_optional_child(line)
                    .with_optional_child(part("city", &address.city))
                    .with_optional_child(part("state", &address.state))
                    .with_optional_child(part("postalCode", &address.postal_code))
                    .with_optional_child(part("country", &address.country)),
                "Patient.addr",
            )
        });

        let telecom = self.telecom.map(|value| {
            parameter(
                "patientTelecom",
                el("value").with_attr("use", "HP").with_attr("value", value),
                "Patient.telecom",
            )
        });

        let provider = self.provider_id.map(|provider| {
            parameter(
                "principalCareProviderId",
                el("value")
                    .with_attr("extension", provider)
                    .with_attr("root", NPI_CODE_SYSTEM),
                "AssignedProvider.id",
            )
        });

        let parameter_list = el("parameterList")
            .with_child(parameter(
                "livingSubjectAdministrativeGender",
                el("value")
                    .with_attr("code", self.gender_code)
                    .with_attr("codeSystem", HL7_GENDER_CODE_SYSTEM),
                "LivingSubject.administrativeGender",
            ))
            .with_child(parameter(
                "livingSubjectBirthTime",
                el("value").with_attr("value", &self.birth_time),
                "LivingSubject.birthTime",
            ))
            .with_child(parameter(
                "livingSubjectName",
                el("value")
                    .with_child(el("family").with_text(self.family_name))
                    .with_child(el("given").with_text(self.given_name)),
                "LivingSubject.name",
            ))
            .with_optional_child(address)
            .with_optional_child(telecom)
            .with_optional_child(provider);

        let control_act = el("controlActProcess")
            .with_attr("classCode", "CACT")
            .with_attr("moodCode", "EVN")
            .with_child(
                el("code")
                    .with_attr("code", "PRPA_TE201305UV02")
                    .with_attr("codeSystem", HL7_INTERACTION_CODE_SYSTEM),
            )
            .with_child(
                el("queryByParameter")
                    .with_child(
                        el("queryId")
                            .with_attr("extension", self.message_id)
                            .with_attr("root", self.requester_home_community_id),
                    )
                    .with_child(el("statusCode").with_attr("code", "new"))
                    .with_child(el("responseModalityCode").with_attr("code", "R"))
                    .with_child(el("responsePriorityCode").with_attr("code", "I"))
                    .with_child(parameter_list),
            );

        Element::new("urn:PRPA_IN201305UV02")
            .with_attr("xmlns:urn", NS_HL7)
            .with_attr("ITSVersion", "XML_1.0")
            .with_child(
                el("id")
                    .with_attr("extension", self.message_id)
                    .with_attr("root", self.requester_home_community_id),
            )
            .with_child(el("creationTime").with_attr("value", &self.creation_time))
            .with_child(
                el("interactionId")
                    .with_attr("extension", "PRPA_IN201305UV02")
                    .with_attr("root", HL7_INTERACTION_CODE_SYSTEM),
            )
            .with_child(el("processingCode").with_attr("code", "P"))
            .with_child(el("processingModeCode").with_attr("code", "T"))
            .with_child(el("acceptAckCode").with_attr("code", "AL"))
            .with_child(receiver)
            .with_child(sender)
            .with_child(control_act)
    }
}

fn hl7_birth_time(birth_date: &str) -> GatewayResult<String> {
    let compact: String = birth_date.trim().chars().filter(|c| *c != '-').collect();
    if compact.len() != 8 || !compact.chars().all(|c| c.is_ascii_digit()) {
        return Err(GatewayError::invalid_request(format!(
            "patient birth date '{birth_date}' is not YYYY-MM-DD or YYYYMMDD"
        )));
    }
    Ok(compact)
}

/// Build the unsigned ITI-55 envelope for the request's first gateway.
///
/// # Errors
///
/// Returns `GatewayError::InvalidRequest` if the request has no gateway or fails validation,
/// and `GatewayError::Signing` if the certificate cannot be embedded.
pub fn create_iti55_envelope(
    request: &OutboundPatientDiscoveryReq,
    ctx: &EnvelopeContext<'_>,
) -> GatewayResult<String> {
    let gateway = request.gateways.first().ok_or_else(|| {
        GatewayError::invalid_request("a gateway is required to build an ITI-55 request")
    })?;
    let body = PatientDiscoveryBody::from_request(request, gateway, ctx)?;

    soap_envelope(
        ctx,
        Addressing {
            to_url: body.to_url,
            action: ACTION_XCPD,
            message_id: &request.id,
        },
        &request.saml_attributes,
        Some(body.receiver_oid),
        body.to_element(),
    )
}

/// Build and sign one envelope per gateway in the request.
///
/// Every gateway shares one certificate and key, so any build or signing failure aborts the
/// whole batch.
pub fn create_and_sign_bulk_xcpd_requests(
    request: &OutboundPatientDiscoveryReq,
    config: &GatewayConfig,
    certs: &SamlCertsAndKeys,
) -> GatewayResult<Vec<SignedEnvelope<XcpdGateway, OutboundPatientDiscoveryReq>>> {
    if request.gateways.is_empty() {
        return Err(GatewayError::invalid_request(
            "patient discovery request has no gateways",
        ));
    }
    let ctx = EnvelopeContext {
        config,
        public_cert: &certs.public_cert,
        created: Utc::now(),
    };

    request
        .gateways
        .iter()
        .map(|gateway| -> GatewayResult<_> {
            let outbound_request = request.for_gateway(gateway);
            let xml = create_iti55_envelope(&outbound_request, &ctx)?;
            let signed_xml = sign_full_saml(&xml, certs)?;
            Ok(SignedEnvelope {
                gateway: gateway.clone(),
                signed_xml,
                outbound_request,
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::envelope::tests::{certs, config, created, saml_attributes, CERT};
    use crate::models::{Gender, HumanName, PatientResource, Telecom};
    use ihe_saml::verify_xml_signatures;
    use ihe_xml::Document;

    pub(crate) fn request() -> OutboundPatientDiscoveryReq {
        OutboundPatientDiscoveryReq {
            id: "6f7c1a52-1a9b-4b8e-9d0a-3b5f0b9a1c11".into(),
            cx_id: "cx-1".into(),
            patient_id: Some("patient-1".into()),
            timestamp: created(),
            principal_care_provider_ids: vec!["1234567890".into()],
            saml_attributes: saml_attributes(),
            patient_resource: PatientResource {
                name: vec![HumanName {
                    given: vec!["NWHINONE".into()],
                    family: "NWHINZZZTESTPATIENT".into(),
                }],
                gender: Gender::Male,
                birth_date: Some("1981-01-01".into()),
                address: vec![Address {
                    line: vec!["1100 Test Street".into()],
                    city: Some("Helena".into()),
                    state: Some("AL".into()),
                    postal_code: Some("35080".into()),
                    country: Some("USA".into()),
                }],
                telecom: vec![],
                identifier: vec![],
            },
            gateways: vec![XcpdGateway {
                url: "https://mock-metriport/soap/iti55".into(),
                oid: "2.16.840.1.113883.3.787.0.0".into(),
                id: Some("018ea97e-7b1c-78e9-8aa1-47c7caf85afe".into()),
            }],
        }
    }

    fn build(request: &OutboundPatientDiscoveryReq) -> GatewayResult<String> {
        let config = config();
        let ctx = EnvelopeContext {
            config: &config,
            public_cert: CERT,
            created: created(),
        };
        create_iti55_envelope(request, &ctx)
    }

    fn parameter_list(doc: &Document) -> &Element {
        doc.root()
            .descend(&[
                "Body",
                "PRPA_IN201305UV02",
                "controlActProcess",
                "queryByParameter",
                "parameterList",
            ])
            .expect("parameter list")
    }

    #[test]
    fn body_carries_demographics() {
        let xml = build(&request()).expect("envelope");
        let doc = Document::parse(&xml).expect("parse");
        let params = parameter_list(&doc);

        let gender = params
            .descend(&["livingSubjectAdministrativeGender", "value"])
            .and_then(|v| v.attr("code"));
        assert_eq!(gender, Some("M"));
        let birth = params
            .descend(&["livingSubjectBirthTime", "value"])
            .and_then(|v| v.attr("value"));
        assert_eq!(birth, Some("19810101"));
        let family = params
            .descend(&["livingSubjectName", "value", "family"])
            .and_then(Element::trimmed_text);
        assert_eq!(family.as_deref(), Some("NWHINZZZTESTPATIENT"));
        let city = params
            .descend(&["patientAddress", "value", "city"])
            .and_then(Element::trimmed_text);
        assert_eq!(city.as_deref(), Some("Helena"));
        let provider = params
            .descend(&["principalCareProviderId", "value"])
            .and_then(|v| v.attr("extension"));
        assert_eq!(provider, Some("1234567890"));
        assert!(params.child("patientTelecom").is_none());
    }

    #[test]
    fn header_targets_gateway_with_discovery_action() {
        let xml = build(&request()).expect("envelope");
        let doc = Document::parse(&xml).expect("parse");
        let header = doc.root().child("Header").expect("header");
        assert_eq!(
            header.child("Action").and_then(Element::trimmed_text).as_deref(),
            Some(ACTION_XCPD)
        );
        assert_eq!(
            header.child("To").and_then(Element::trimmed_text).as_deref(),
            Some("https://mock-metriport/soap/iti55")
        );
        let creation = doc
            .root()
            .descend(&["Body", "PRPA_IN201305UV02", "creationTime"])
            .and_then(|c| c.attr("value"));
        assert_eq!(creation, Some("20240404191155"));
    }

    #[test]
    fn telecom_is_rendered_when_present() {
        let mut req = request();
        req.patient_resource.telecom = vec![Telecom {
            system: Some("phone".into()),
            value: Some("tel:+1310-000-0000".into()),
        }];
        let xml = build(&req).expect("envelope");
        let doc = Document::parse(&xml).expect("parse");
        let telecom = parameter_list(&doc).descend(&["patientTelecom", "value"]).expect("telecom");
        assert_eq!(telecom.attr("use"), Some("HP"));
        assert_eq!(telecom.attr("value"), Some("tel:+1310-000-0000"));
    }

    #[test]
    fn unprefixed_gateway_gets_unprefixed_children() {
        let mut req = request();
        req.gateways[0].url = UNPREFIXED_BODY_GATEWAY_URL.into();
        let xml = build(&req).expect("envelope");
        assert!(xml.contains("<urn:PRPA_IN201305UV02"));
        assert!(xml.contains("<creationTime "));
        assert!(!xml.contains("<urn:creationTime"));
    }

    #[test]
    fn missing_demographics_fail_fast() {
        let mut req = request();
        req.patient_resource.name.clear();
        assert!(matches!(build(&req), Err(GatewayError::InvalidRequest(_))));

        let mut req = request();
        req.patient_resource.birth_date = Some("01/01/1981".into());
        assert!(matches!(build(&req), Err(GatewayError::InvalidRequest(_))));

        let mut req = request();
        req.gateways.clear();
        assert!(matches!(build(&req), Err(GatewayError::InvalidRequest(_))));
    }

    #[test]
    fn bulk_signs_one_envelope_per_gateway() {
        let mut req = request();
        req.gateways.push(XcpdGateway {
            url: "https://second.test/iti55".into(),
            oid: "1.2.3.4".into(),
            id: None,
        });

        let signed = create_and_sign_bulk_xcpd_requests(&req, &config(), &certs()).expect("sign");
        assert_eq!(signed.len(), 2);
        assert_eq!(signed[1].gateway.url, "https://second.test/iti55");
        assert_eq!(signed[1].outbound_request.gateways, vec![signed[1].gateway.clone()]);
        for envelope in &signed {
            assert!(verify_xml_signatures(&envelope.signed_xml, CERT));
        }
    }

    #[test]
    fn bulk_with_wrong_passphrase_aborts() {
        let mut bad = certs();
        bad.private_key_password = "wrong".into();
        let err = create_and_sign_bulk_xcpd_requests(&request(), &config(), &bad).unwrap_err();
        assert!(matches!(err, GatewayError::Signing(_)));
    }
}
