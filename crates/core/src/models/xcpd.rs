//! Patient discovery (ITI-55) request and response models.
//!
//! The response has a domain form ([`PatientDiscoveryOutcome`]) and a flat wire form matching
//! the gateway SDK's JSON, where `patientMatch` is `true`, `false` or `null`. Translation
//! happens in `From`/`TryFrom` so an invalid combination (a match without an external
//! identifier, a fault without an outcome) cannot be deserialized.

use super::gateway::XcpdGateway;
use super::patient::PatientResource;
use super::shared::{ExternalGatewayPatient, OperationOutcome};
use chrono::{DateTime, Utc};
use ihe_saml::SamlAttributes;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundPatientDiscoveryReq {
    pub id: String,
    pub cx_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub principal_care_provider_ids: Vec<String>,
    pub saml_attributes: SamlAttributes,
    pub patient_resource: PatientResource,
    pub gateways: Vec<XcpdGateway>,
}

impl OutboundPatientDiscoveryReq {
    /// The same request narrowed to a single gateway.
    pub fn for_gateway(&self, gateway: &XcpdGateway) -> Self {
        Self {
            gateways: vec![gateway.clone()],
            ..self.clone()
        }
    }
}

/// Demographics and identifiers returned by a matching gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientDiscoveryMatch {
    pub external_gateway_patient: ExternalGatewayPatient,
    pub gateway_home_community_id: String,
    pub patient_resource: PatientResource,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatientDiscoveryOutcome {
    /// `patientMatch = true`.
    Successful(PatientDiscoveryMatch),
    /// The gateway answered and found nothing: `patientMatch = false`.
    NotFound(OperationOutcome),
    /// The query could not be answered: `patientMatch = null`.
    Fault(OperationOutcome),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    into = "PatientDiscoveryRespWire",
    try_from = "PatientDiscoveryRespWire"
)]
pub struct OutboundPatientDiscoveryResp {
    pub id: String,
    pub patient_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub response_timestamp: DateTime<Utc>,
    pub gateway: XcpdGateway,
    pub outcome: PatientDiscoveryOutcome,
}

impl OutboundPatientDiscoveryResp {
    pub fn patient_match(&self) -> Option<bool> {
        match self.outcome {
            PatientDiscoveryOutcome::Successful(_) => Some(true),
            PatientDiscoveryOutcome::NotFound(_) => Some(false),
            PatientDiscoveryOutcome::Fault(_) => None,
        }
    }

    pub fn operation_outcome(&self) -> Option<&OperationOutcome> {
        match &self.outcome {
            PatientDiscoveryOutcome::Successful(_) => None,
            PatientDiscoveryOutcome::NotFound(outcome) | PatientDiscoveryOutcome::Fault(outcome) => {
                Some(outcome)
            }
        }
    }

    pub fn matched(&self) -> Option<&PatientDiscoveryMatch> {
        match &self.outcome {
            PatientDiscoveryOutcome::Successful(found) => Some(found),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatientDiscoveryRespWire {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    patient_id: Option<String>,
    timestamp: DateTime<Utc>,
    response_timestamp: DateTime<Utc>,
    gateway: XcpdGateway,
    patient_match: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gateway_home_community_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    external_gateway_patient: Option<ExternalGatewayPatient>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    patient_resource: Option<PatientResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    operation_outcome: Option<OperationOutcome>,
}

impl From<OutboundPatientDiscoveryResp> for PatientDiscoveryRespWire {
    fn from(resp: OutboundPatientDiscoveryResp) -> Self {
        let patient_match = resp.patient_match();
        let mut wire = PatientDiscoveryRespWire {
            id: resp.id,
            patient_id: resp.patient_id,
            timestamp: resp.timestamp,
            response_timestamp: resp.response_timestamp,
            gateway: resp.gateway,
            patient_match,
            gateway_home_community_id: None,
            external_gateway_patient: None,
            patient_resource: None,
            operation_outcome: None,
        };
        match resp.outcome {
            PatientDiscoveryOutcome::Successful(found) => {
                wire.gateway_home_community_id = Some(found.gateway_home_community_id);
                wire.external_gateway_patient = Some(found.external_gateway_patient);
                wire.patient_resource = Some(found.patient_resource);
            }
            PatientDiscoveryOutcome::NotFound(outcome) | PatientDiscoveryOutcome::Fault(outcome) => {
                wire.operation_outcome = Some(outcome);
            }
        }
        wire
    }
}

impl TryFrom<PatientDiscoveryRespWire> for OutboundPatientDiscoveryResp {
    type Error = String;

    fn try_from(wire: PatientDiscoveryRespWire) -> Result<Self, Self::Error> {
        let outcome = match wire.patient_match {
            Some(true) => PatientDiscoveryOutcome::Successful(PatientDiscoveryMatch {
                external_gateway_patient: wire
                    .external_gateway_patient
                    .ok_or("successful response is missing externalGatewayPatient")?,
                gateway_home_community_id: wire
                    .gateway_home_community_id
                    .ok_or("successful response is missing gatewayHomeCommunityId")?,
                patient_resource: wire
                    .patient_resource
                    .ok_or("successful response is missing patientResource")?,
            }),
            Some(false) => PatientDiscoveryOutcome::NotFound(
                wire.operation_outcome
                    .ok_or("not-found response is missing operationOutcome")?,
            ),
            None => PatientDiscoveryOutcome::Fault(
                wire.operation_outcome
                    .ok_or("fault response is missing operationOutcome")?,
            ),
        };

        Ok(Self {
            id: wire.id,
            patient_id: wire.patient_id,
            timestamp: wire.timestamp,
            response_timestamp: wire.response_timestamp,
            gateway: wire.gateway,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::patient::Gender;
    use crate::models::shared::{Issue, IssueSeverity};

    fn gateway() -> XcpdGateway {
        XcpdGateway {
            url: "https://mock-metriport/soap/iti55".into(),
            oid: "2.16.840.1.113883.3.787.0.0".into(),
            id: None,
        }
    }

    fn response(outcome: PatientDiscoveryOutcome) -> OutboundPatientDiscoveryResp {
        let at = DateTime::parse_from_rfc3339("2024-04-04T19:11:55.879Z")
            .unwrap()
            .with_timezone(&Utc);
        OutboundPatientDiscoveryResp {
            id: "req-1".into(),
            patient_id: Some("patient-1".into()),
            timestamp: at,
            response_timestamp: at,
            gateway: gateway(),
            outcome,
        }
    }

    #[test]
    fn fault_serializes_patient_match_as_null() {
        let resp = response(PatientDiscoveryOutcome::Fault(OperationOutcome::single(
            "req-1",
            Issue::new(IssueSeverity::Error, "http-error", "HTTP 503 error"),
        )));
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json["patientMatch"].is_null());
        assert_eq!(json["operationOutcome"]["issue"][0]["code"], "http-error");
        assert!(json.get("patientResource").is_none());
    }

    #[test]
    fn successful_round_trips_through_json() {
        let resp = response(PatientDiscoveryOutcome::Successful(PatientDiscoveryMatch {
            external_gateway_patient: ExternalGatewayPatient {
                id: "abc".into(),
                system: "2.16.840.1.113883.3.9621".into(),
            },
            gateway_home_community_id: "2.16.840.1.113883.3.9621".into(),
            patient_resource: PatientResource {
                name: vec![],
                gender: Gender::Male,
                birth_date: Some("19810101".into()),
                address: vec![],
                telecom: vec![],
                identifier: vec![],
            },
        }));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""patientMatch":true"#));
        let back: OutboundPatientDiscoveryResp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resp);
    }

    #[test]
    fn match_without_external_patient_is_rejected() {
        let json = r#"{
            "id": "req-1",
            "timestamp": "2024-04-04T19:11:55.879Z",
            "responseTimestamp": "2024-04-04T19:11:55.879Z",
            "gateway": {"url": "https://g", "oid": "1.2.3"},
            "patientMatch": true
        }"#;
        let err = serde_json::from_str::<OutboundPatientDiscoveryResp>(json).unwrap_err();
        assert!(err.to_string().contains("externalGatewayPatient"));
    }

    #[test]
    fn not_found_deserializes_from_false() {
        let json = r#"{
            "id": "req-1",
            "timestamp": "2024-04-04T19:11:55.879Z",
            "responseTimestamp": "2024-04-04T19:11:55.879Z",
            "gateway": {"url": "https://g", "oid": "1.2.3"},
            "patientMatch": false,
            "operationOutcome": {"resourceType": "OperationOutcome", "id": "req-1", "issue": []}
        }"#;
        let resp: OutboundPatientDiscoveryResp = serde_json::from_str(json).unwrap();
        assert_eq!(resp.patient_match(), Some(false));
    }
}
