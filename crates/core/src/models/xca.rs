//! Document query (ITI-38) and document retrieval (ITI-39) models.

use super::gateway::XcaGateway;
use super::shared::{Coding, DateRange, ExternalGatewayPatient, OperationOutcome};
use chrono::{DateTime, Utc};
use ihe_saml::SamlAttributes;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundDocumentQueryReq {
    pub id: String,
    pub cx_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub saml_attributes: SamlAttributes,
    pub gateway: XcaGateway,
    pub external_gateway_patient: ExternalGatewayPatient,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_code: Option<Coding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practice_setting_code: Option<Coding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_type_code: Option<Coding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_date: Option<DateRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_creation_date: Option<DateRange>,
}

/// Registry metadata for one document available at a remote gateway.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReference {
    pub home_community_id: String,
    pub repository_unique_id: String,
    pub doc_unique_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_stop_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_person: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_institution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_coding: Option<Coding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_coding: Option<Coding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_coding: Option<Coding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidentiality_coding: Option<Coding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practice_setting_coding: Option<Coding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcare_facility_type_coding: Option<Coding>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundDocumentQueryResp {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub response_timestamp: DateTime<Utc>,
    pub gateway: XcaGateway,
    pub external_gateway_patient: ExternalGatewayPatient,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_reference: Option<Vec<DocumentReference>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_outcome: Option<OperationOutcome>,
}

/// One document to fetch, as previously returned by a document query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRetrievalReference {
    pub home_community_id: String,
    pub repository_unique_id: String,
    pub doc_unique_id: String,
    /// Caller-assigned id, echoed on the retrieved document.
    pub document_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundDocumentRetrievalReq {
    pub id: String,
    pub cx_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub saml_attributes: SamlAttributes,
    pub gateway: XcaGateway,
    pub document_reference: Vec<DocumentRetrievalReference>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedDocument {
    pub home_community_id: String,
    pub repository_unique_id: String,
    pub doc_unique_id: String,
    pub document_id: String,
    pub content_type: String,
    pub size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_document_unique_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_repository_unique_id: Option<String>,
    #[serde(with = "base64_content")]
    pub content: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundDocumentRetrievalResp {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub response_timestamp: DateTime<Utc>,
    pub gateway: XcaGateway,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_reference: Option<Vec<RetrievedDocument>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_outcome: Option<OperationOutcome>,
}

mod base64_content {
    use base64::{engine::general_purpose, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}
