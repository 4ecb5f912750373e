//! ITI-55 (`PRPA_IN201306UV02`) response classification.

use super::{
    http_error_outcome, non_blank, schema_error_outcome, with_soap_body, ISSUE_NOT_FOUND,
    ISSUE_PROCESSING,
};
use crate::models::{
    Address, ExternalGatewayPatient, Gender, HumanName, Issue, IssueSeverity,
    OperationOutcome, OutboundPatientDiscoveryReq, OutboundPatientDiscoveryResp,
    PatientDiscoveryMatch, PatientDiscoveryOutcome, PatientResource, PersonalIdentifier,
    Telecom, XcpdGateway,
};
use crate::transport::TransportOutcome;
use chrono::Utc;
use ihe_types::urn::strip_urn_prefix;
use ihe_xml::Element;

const RESPONSE_ROOT: &str = "PRPA_IN201306UV02";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckClassification {
    Match,
    NoMatch,
    Error,
}

/// `AA`/`OK` is a match, `AA`/`NF` is no match, everything else is an error.
pub fn classify_ack(ack: &str, query_response_code: &str) -> AckClassification {
    match (ack, query_response_code) {
        ("AA", "OK") => AckClassification::Match,
        ("AA", "NF") => AckClassification::NoMatch,
        _ => AckClassification::Error,
    }
}

pub fn process_xcpd_response(
    outcome: &TransportOutcome,
    request: &OutboundPatientDiscoveryReq,
    gateway: &XcpdGateway,
) -> OutboundPatientDiscoveryResp {
    let outcome = match outcome {
        TransportOutcome::Failed { error } => {
            tracing::warn!(request_id = %request.id, gateway = %gateway.oid, %error, "patient discovery transport failure");
            PatientDiscoveryOutcome::Fault(http_error_outcome(&request.id, error))
        }
        TransportOutcome::Response(response) => {
            with_soap_body(&response.text(), RESPONSE_ROOT, |body| {
                classify_registry_profile(body, &request.id)
            })
            .unwrap_or_else(|error| {
                tracing::warn!(request_id = %request.id, gateway = %gateway.oid, %error, "unreadable patient discovery response");
                PatientDiscoveryOutcome::Fault(schema_error_outcome(&request.id, error))
            })
        }
    };

    match &outcome {
        PatientDiscoveryOutcome::Successful(_) => {
            tracing::info!(request_id = %request.id, gateway = %gateway.oid, "patient match found")
        }
        PatientDiscoveryOutcome::NotFound(_) => {
            tracing::debug!(request_id = %request.id, gateway = %gateway.oid, "no patient match")
        }
        PatientDiscoveryOutcome::Fault(_) => {}
    }

    OutboundPatientDiscoveryResp {
        id: request.id.clone(),
        patient_id: request.patient_id.clone(),
        timestamp: request.timestamp,
        response_timestamp: Utc::now(),
        gateway: gateway.clone(),
        outcome,
    }
}

fn classify_registry_profile(profile: &Element, request_id: &str) -> PatientDiscoveryOutcome {
    let ack = profile
        .descend(&["acknowledgement", "typeCode"])
        .and_then(|el| el.attr("code"))
        .map(str::trim);
    let query_response_code = profile
        .descend(&["controlActProcess", "queryAck", "queryResponseCode"])
        .and_then(|el| el.attr("code"))
        .map(str::trim);

    let (Some(ack), Some(query_response_code)) = (ack, query_response_code) else {
        return PatientDiscoveryOutcome::Fault(schema_error_outcome(
            request_id,
            "response has no acknowledgement type code or query response code",
        ));
    };

    match classify_ack(ack, query_response_code) {
        AckClassification::Match => match patient_match(profile) {
            Some(found) => PatientDiscoveryOutcome::Successful(found),
            None => PatientDiscoveryOutcome::Fault(OperationOutcome::single(
                request_id,
                Issue::new(
                    IssueSeverity::Error,
                    ISSUE_PROCESSING,
                    "match response carries no patient identifier",
                ),
            )),
        },
        AckClassification::NoMatch => PatientDiscoveryOutcome::NotFound(OperationOutcome::single(
            request_id,
            Issue::new(IssueSeverity::Information, ISSUE_NOT_FOUND, query_response_code),
        )),
        AckClassification::Error => PatientDiscoveryOutcome::Fault(gateway_error_outcome(
            profile,
            request_id,
            ack,
            query_response_code,
        )),
    }
}

/// Code and text from `acknowledgementDetail`, falling back to the detected event.
fn gateway_error_outcome(
    profile: &Element,
    request_id: &str,
    ack: &str,
    query_response_code: &str,
) -> OperationOutcome {
    let detail = profile.descend(&["acknowledgement", "acknowledgementDetail"]);
    let detail_code = detail.and_then(|d| d.child("code"));
    let event_code = profile.descend(&["controlActProcess", "reasonOf", "detectedEvent", "code"]);

    let code = detail_code
        .or(event_code)
        .and_then(|c| c.attr("code"))
        .filter(|c| !c.trim().is_empty())
        .unwrap_or(ISSUE_PROCESSING);
    let text = detail
        .and_then(|d| d.child("text"))
        .and_then(Element::trimmed_text)
        .or_else(|| {
            detail_code
                .or(event_code)
                .and_then(|c| c.attr("displayName"))
                .map(str::to_owned)
        })
        .unwrap_or_else(|| {
            format!("acknowledgement {ack} with query response code {query_response_code}")
        });

    OperationOutcome::single(request_id, Issue::new(IssueSeverity::Error, code, text))
}

fn patient_match(profile: &Element) -> Option<PatientDiscoveryMatch> {
    let patient = profile.descend(&[
        "controlActProcess",
        "subject",
        "registrationEvent",
        "subject1",
        "patient",
    ])?;
    let id = patient.child("id")?;
    let extension = non_blank(id.attr("extension"))?;
    let root = strip_urn_prefix(non_blank(id.attr("root"))?);

    Some(PatientDiscoveryMatch {
        external_gateway_patient: ExternalGatewayPatient {
            id: extension.to_owned(),
            system: root.to_owned(),
        },
        gateway_home_community_id: root.to_owned(),
        patient_resource: patient_resource(patient.child("patientPerson")),
    })
}

fn patient_resource(person: Option<&Element>) -> PatientResource {
    let children = |local: &'static str| person.into_iter().flat_map(move |p| p.children_named(local));

    PatientResource {
        name: children("name").map(human_name).collect(),
        gender: Gender::from_hl7(
            person
                .and_then(|p| p.child("administrativeGenderCode"))
                .and_then(|g| g.attr("code")),
        ),
        birth_date: person
            .and_then(|p| p.child("birthTime"))
            .and_then(|b| non_blank(b.attr("value")))
            .map(str::to_owned),
        address: children("addr").filter_map(address).collect(),
        telecom: children("telecom").filter_map(telecom).collect(),
        identifier: children("asOtherIDs")
            .flat_map(|other| other.children_named("id"))
            .filter_map(identifier)
            .collect(),
    }
}

fn human_name(name: &Element) -> HumanName {
    HumanName {
        given: name
            .children_named("given")
            .filter_map(Element::trimmed_text)
            .collect(),
        family: name
            .child("family")
            .and_then(Element::trimmed_text)
            .unwrap_or_default(),
    }
}

/// Addresses without a city, state or postal code are dropped.
fn address(addr: &Element) -> Option<Address> {
    let part = |local: &str| addr.child(local).and_then(Element::trimmed_text);
    let city = part("city");
    let state = part("state");
    let postal_code = part("postalCode");
    if city.is_none() && state.is_none() && postal_code.is_none() {
        return None;
    }

    Some(Address {
        line: addr
            .children_named("streetAddressLine")
            .filter_map(Element::trimmed_text)
            .collect(),
        city,
        state,
        postal_code,
        country: part("country"),
    })
}

fn telecom(telecom: &Element) -> Option<Telecom> {
    let system = non_blank(telecom.attr("use")).map(str::to_owned);
    let value = non_blank(telecom.attr("value")).map(str::to_owned);
    if system.is_none() && value.is_none() {
        return None;
    }
    Some(Telecom { system, value })
}

fn identifier(id: &Element) -> Option<PersonalIdentifier> {
    let system = non_blank(id.attr("root")).map(str::to_owned);
    let value = non_blank(id.attr("extension")).map(str::to_owned);
    if system.is_none() && value.is_none() {
        return None;
    }
    Some(PersonalIdentifier { system, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::xcpd::tests::request;
    use crate::process::{ISSUE_HTTP_ERROR, ISSUE_SCHEMA_ERROR};
    use crate::transport::SoapResponse;
    use proptest::prelude::*;

    const MATCH_RESPONSE: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../testdata/xcpd-match-response.xml"
    ));
    const EXTERNAL_ID: &str = "ODFmMmVjNGUtYzcxYy00MDkwLWJmMWMtOWQ4NTI5ZjY1YjVhLzAxOGUxMDU4LTllMWEtN2MzMy1hMmRkLTVhNzg4NGU2ZmMzOA==";

    fn received(xml: &str) -> TransportOutcome {
        TransportOutcome::Response(SoapResponse {
            content_type: Some("application/soap+xml; charset=utf-8".into()),
            body: xml.as_bytes().to_vec(),
        })
    }

    /// A minimal response with the given codes and extra profile content.
    fn profile_response(ack: &str, query_response_code: &str, ack_detail: &str, subject: &str) -> String {
        format!(
            r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope">
  <env:Body>
    <PRPA_IN201306UV02 xmlns="urn:hl7-org:v3">
      <acknowledgement>
        <typeCode code="{ack}"/>
        {ack_detail}
      </acknowledgement>
      <controlActProcess classCode="CACT" moodCode="EVN">
        {subject}
        <queryAck>
          <queryResponseCode code="{query_response_code}"/>
        </queryAck>
      </controlActProcess>
    </PRPA_IN201306UV02>
  </env:Body>
</env:Envelope>"#
        )
    }

    fn classify(outcome: &TransportOutcome) -> OutboundPatientDiscoveryResp {
        let request = request();
        let gateway = request.gateways[0].clone();
        process_xcpd_response(outcome, &request, &gateway)
    }

    fn only_issue(resp: &OutboundPatientDiscoveryResp) -> &Issue {
        let outcome = resp.operation_outcome().expect("operation outcome");
        assert_eq!(outcome.issue.len(), 1);
        &outcome.issue[0]
    }

    #[test]
    fn match_response_is_successful() {
        let resp = classify(&received(MATCH_RESPONSE));
        assert_eq!(resp.patient_match(), Some(true));

        let found = resp.matched().expect("match");
        assert_eq!(found.external_gateway_patient.id, EXTERNAL_ID);
        assert_eq!(found.external_gateway_patient.system, "2.16.840.1.113883.3.9621");
        assert_eq!(found.gateway_home_community_id, "2.16.840.1.113883.3.9621");

        let patient = &found.patient_resource;
        assert_eq!(
            patient.name,
            vec![HumanName {
                given: vec!["NWHINONE".into()],
                family: "NWHINZZZTESTPATIENT".into(),
            }]
        );
        assert_eq!(patient.gender, Gender::Male);
        assert_eq!(patient.birth_date.as_deref(), Some("19810101"));
        assert_eq!(patient.address.len(), 1, "address without city/state/zip is dropped");
        assert_eq!(patient.address[0].city.as_deref(), Some("Helena"));
        assert_eq!(patient.address[0].line, vec!["1100 Test Street".to_string()]);
        assert_eq!(
            patient.telecom,
            vec![Telecom {
                system: Some("HP".into()),
                value: Some("tel:+1-205-111-1111".into()),
            }]
        );
        assert_eq!(
            patient.identifier,
            vec![PersonalIdentifier {
                system: Some("2.16.840.1.113883.4.1".into()),
                value: Some("666-10-0001".into()),
            }]
        );
    }

    #[test]
    fn response_echoes_request_identity() {
        let request = request();
        let resp = classify(&received(MATCH_RESPONSE));
        assert_eq!(resp.id, request.id);
        assert_eq!(resp.patient_id, request.patient_id);
        assert_eq!(resp.timestamp, request.timestamp);
        assert_eq!(resp.gateway, request.gateways[0]);
    }

    #[test]
    fn not_found_is_informational() {
        let resp = classify(&received(&profile_response("AA", "NF", "", "")));
        assert_eq!(resp.patient_match(), Some(false));
        let issue = only_issue(&resp);
        assert_eq!(issue.severity, IssueSeverity::Information);
        assert_eq!(issue.code, ISSUE_NOT_FOUND);
    }

    #[test]
    fn transport_failure_is_an_http_error() {
        let resp = classify(&TransportOutcome::failed("HTTP 503 error"));
        assert_eq!(resp.patient_match(), None);
        let issue = only_issue(&resp);
        assert_eq!(issue.severity, IssueSeverity::Error);
        assert_eq!(issue.code, ISSUE_HTTP_ERROR);
        assert!(issue.details.text.contains("HTTP 503 error"));
    }

    #[test]
    fn gateway_error_uses_acknowledgement_detail() {
        let detail = r#"<acknowledgementDetail typeCode="E">
            <code code="InternalError" codeSystem="1.3.6.1.4.1.19376.1.2.27.3"/>
            <text>Patient registry is offline</text>
        </acknowledgementDetail>"#;
        let resp = classify(&received(&profile_response("AE", "AE", detail, "")));
        assert_eq!(resp.patient_match(), None);
        let issue = only_issue(&resp);
        assert_eq!(issue.severity, IssueSeverity::Error);
        assert_eq!(issue.code, "InternalError");
        assert_eq!(issue.details.text, "Patient registry is offline");
    }

    #[test]
    fn gateway_error_without_detail_is_generic() {
        let resp = classify(&received(&profile_response("AA", "QE", "", "")));
        let issue = only_issue(&resp);
        assert_eq!(issue.code, ISSUE_PROCESSING);
        assert!(issue.details.text.contains("QE"));
    }

    #[test]
    fn match_without_patient_id_is_an_error() {
        let subject = r#"<subject typeCode="SUBJ">
            <registrationEvent classCode="REG" moodCode="EVN">
              <subject1 typeCode="SBJ">
                <patient classCode="PAT">
                  <id nullFlavor="NA"/>
                </patient>
              </subject1>
            </registrationEvent>
          </subject>"#;
        let resp = classify(&received(&profile_response("AA", "OK", "", subject)));
        assert_eq!(resp.patient_match(), None);
        assert_eq!(only_issue(&resp).code, ISSUE_PROCESSING);
    }

    #[test]
    fn unparseable_body_is_a_schema_error() {
        let resp = classify(&received("<html><body>Bad Gateway"));
        assert_eq!(resp.patient_match(), None);
        assert_eq!(only_issue(&resp).code, ISSUE_SCHEMA_ERROR);

        let resp = classify(&received(
            r#"<Envelope><Body><Fault><Reason>nope</Reason></Fault></Body></Envelope>"#,
        ));
        assert_eq!(only_issue(&resp).code, ISSUE_SCHEMA_ERROR);
    }

    #[test]
    fn missing_query_response_code_is_a_schema_error() {
        let xml = MATCH_RESPONSE.replace(r#"<queryResponseCode code="OK"/>"#, "");
        let resp = classify(&received(&xml));
        assert_eq!(only_issue(&resp).code, ISSUE_SCHEMA_ERROR);
    }

    proptest! {
        #[test]
        fn classify_ack_is_total_and_deterministic(ack in "[A-Z]{0,3}", code in "[A-Z]{0,3}") {
            let expected = match (ack.as_str(), code.as_str()) {
                ("AA", "OK") => AckClassification::Match,
                ("AA", "NF") => AckClassification::NoMatch,
                _ => AckClassification::Error,
            };
            prop_assert_eq!(classify_ack(&ack, &code), expected);
            prop_assert_eq!(classify_ack(&ack, &code), classify_ack(&ack, &code));
        }

        #[test]
        fn transport_failures_never_depend_on_content(error in "[ -~]{1,40}") {
            let resp = classify(&TransportOutcome::failed(error.clone()));
            prop_assert_eq!(resp.patient_match(), None);
            let issue = only_issue(&resp);
            prop_assert_eq!(issue.code.as_str(), ISSUE_HTTP_ERROR);
            prop_assert_eq!(&issue.details.text, &error);
        }
    }
}
