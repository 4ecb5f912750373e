//! Outbound request and response models.
//!
//! JSON shapes follow the gateway SDK (`camelCase` fields), so requests produced by other
//! services deserialize directly.

pub mod gateway;
pub mod patient;
pub mod shared;
pub mod xca;
pub mod xcpd;

pub use gateway::{Gateway, XcaGateway, XcpdGateway};
pub use patient::{Address, Gender, HumanName, PatientResource, PersonalIdentifier, Telecom};
pub use shared::{
    Coding, DateRange, ExternalGatewayPatient, Issue, IssueDetails, IssueSeverity,
    OperationOutcome,
};
pub use xca::{
    DocumentReference, DocumentRetrievalReference, OutboundDocumentQueryReq,
    OutboundDocumentQueryResp, OutboundDocumentRetrievalReq, OutboundDocumentRetrievalResp,
    RetrievedDocument,
};
pub use xcpd::{
    OutboundPatientDiscoveryReq, OutboundPatientDiscoveryResp, PatientDiscoveryMatch,
    PatientDiscoveryOutcome,
};

use serde::{Deserialize, Serialize};

/// Any outbound request, tagged by `kind`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OutboundRequest {
    PatientDiscovery(OutboundPatientDiscoveryReq),
    DocumentQuery(OutboundDocumentQueryReq),
    DocumentRetrieval(OutboundDocumentRetrievalReq),
}

/// Any classified response, tagged by `kind`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OutboundResponse {
    PatientDiscovery(OutboundPatientDiscoveryResp),
    DocumentQuery(OutboundDocumentQueryResp),
    DocumentRetrieval(OutboundDocumentRetrievalResp),
}
