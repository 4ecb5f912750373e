//! ITI-38 (`AdhocQueryResponse`) classification.

use super::{
    http_error_outcome, is_success_status, no_documents_outcome, non_blank, parse_hl7_datetime,
    registry_error_outcome, schema_error_outcome, with_soap_body, Classified,
};
use crate::constants::*;
use crate::models::{Coding, DocumentReference, OutboundDocumentQueryReq, OutboundDocumentQueryResp};
use crate::transport::TransportOutcome;
use chrono::Utc;
use ihe_types::urn::{strip_urn_prefix, wrap_id_in_urn_oid};
use ihe_xml::Element;

const RESPONSE_ROOT: &str = "AdhocQueryResponse";

pub fn process_dq_response(
    outcome: &TransportOutcome,
    request: &OutboundDocumentQueryReq,
) -> OutboundDocumentQueryResp {
    let classified = match outcome {
        TransportOutcome::Failed { error } => {
            tracing::warn!(request_id = %request.id, gateway = %request.gateway.home_community_id, %error, "document query transport failure");
            Classified::Outcome(http_error_outcome(&request.id, error))
        }
        TransportOutcome::Response(response) => {
            with_soap_body(&response.text(), RESPONSE_ROOT, |body| {
                classify_query_response(body, request)
            })
            .unwrap_or_else(|error| {
                tracing::warn!(request_id = %request.id, gateway = %request.gateway.home_community_id, %error, "unreadable document query response");
                Classified::Outcome(schema_error_outcome(&request.id, error))
            })
        }
    };
    let (document_reference, operation_outcome) = classified.into_parts();

    if let Some(documents) = &document_reference {
        tracing::info!(request_id = %request.id, gateway = %request.gateway.home_community_id, documents = documents.len(), "document query complete");
    }

    OutboundDocumentQueryResp {
        id: request.id.clone(),
        patient_id: request.patient_id.clone(),
        timestamp: request.timestamp,
        response_timestamp: Utc::now(),
        gateway: request.gateway.clone(),
        external_gateway_patient: request.external_gateway_patient.clone(),
        document_reference,
        operation_outcome,
    }
}

fn classify_query_response(
    response: &Element,
    request: &OutboundDocumentQueryReq,
) -> Classified<DocumentReference> {
    let entries: Vec<&Element> = response
        .child("RegistryObjectList")
        .map(|list| list.children_named("ExtrinsicObject").collect())
        .unwrap_or_default();

    if is_success_status(response.attr("status")) && !entries.is_empty() {
        return Classified::Entries(
            entries
                .into_iter()
                .filter_map(|entry| document_reference(entry, request))
                .collect(),
        );
    }
    if let Some(errors) = response.child("RegistryErrorList") {
        return Classified::Outcome(registry_error_outcome(&request.id, errors));
    }
    Classified::Outcome(no_documents_outcome(&request.id))
}

/// Entries without an `XDSDocumentEntry.uniqueId` are dropped.
fn document_reference(entry: &Element, request: &OutboundDocumentQueryReq) -> Option<DocumentReference> {
    let Some(doc_unique_id) = external_identifier(entry, XDS_UNIQUE_ID) else {
        tracing::warn!(request_id = %request.id, entry = entry.attr("id").unwrap_or_default(), "document entry has no unique id");
        return None;
    };

    let home_community_id = non_blank(entry.attr("home"))
        .map(strip_urn_prefix)
        .unwrap_or(request.gateway.home_community_id.as_str())
        .to_owned();
    let service_start = slot_value(entry, "serviceStartTime");
    let service_stop = slot_value(entry, "serviceStopTime");
    let creation = slot_value(entry, "creationTime")
        .or_else(|| service_start.clone())
        .or_else(|| service_stop.clone());
    let author = classification(entry, XDS_AUTHOR);

    Some(DocumentReference {
        repository_unique_id: slot_value(entry, "repositoryUniqueId")
            .unwrap_or_else(|| home_community_id.clone()),
        home_community_id,
        doc_unique_id: strip_urn_prefix(doc_unique_id).to_owned(),
        content_type: non_blank(entry.attr("mimeType")).map(str::to_owned),
        language: slot_value(entry, "languageCode"),
        size: slot_value(entry, "size").and_then(|size| size.parse().ok()),
        title: localized_name(entry).or_else(|| {
            classification(entry, XDS_CLASS_CODE).and_then(localized_name)
        }),
        creation: creation.as_deref().and_then(parse_hl7_datetime),
        service_start_time: service_start.as_deref().and_then(parse_hl7_datetime),
        service_stop_time: service_stop.as_deref().and_then(parse_hl7_datetime),
        author_person: author.and_then(|a| slot_value(a, "authorPerson")),
        author_institution: author.and_then(|a| slot_value(a, "authorInstitution")),
        class_coding: coding(entry, XDS_CLASS_CODE),
        type_coding: coding(entry, XDS_TYPE_CODE),
        format_coding: coding(entry, XDS_FORMAT_CODE),
        confidentiality_coding: coding(entry, XDS_CONFIDENTIALITY_CODE),
        practice_setting_coding: coding(entry, XDS_PRACTICE_SETTING_CODE),
        healthcare_facility_type_coding: coding(entry, XDS_FACILITY_TYPE_CODE),
    })
}

/// First value of the named slot.
fn slot_value(element: &Element, name: &str) -> Option<String> {
    element
        .children_named("Slot")
        .find(|slot| slot.attr("name") == Some(name))
        .and_then(|slot| slot.descend(&["ValueList", "Value"]))
        .and_then(Element::trimmed_text)
}

fn external_identifier<'a>(entry: &'a Element, scheme: &str) -> Option<&'a str> {
    entry
        .children_named("ExternalIdentifier")
        .find(|id| id.attr("identificationScheme") == Some(scheme))
        .and_then(|id| non_blank(id.attr("value")))
}

fn classification<'a>(entry: &'a Element, scheme: &str) -> Option<&'a Element> {
    entry
        .children_named("Classification")
        .find(|c| c.attr("classificationScheme") == Some(scheme))
}

fn localized_name(element: &Element) -> Option<String> {
    element
        .descend(&["Name", "LocalizedString"])
        .and_then(|s| non_blank(s.attr("value")))
        .map(str::to_owned)
}

fn coding(entry: &Element, scheme: &str) -> Option<Coding> {
    let classification = classification(entry, scheme)?;
    let code = non_blank(classification.attr("nodeRepresentation")).map(str::to_owned);
    let display = localized_name(classification);
    if code.is_none() && display.is_none() {
        return None;
    }
    Some(Coding {
        system: code_system_for_scheme(scheme),
        code,
        display,
    })
}

fn code_system_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        XDS_CLASS_CODE | XDS_TYPE_CODE => Some(LOINC_SYSTEM_URI.to_owned()),
        XDS_PRACTICE_SETTING_CODE | XDS_FACILITY_TYPE_CODE => Some(SNOMED_SYSTEM_URI.to_owned()),
        XDS_FORMAT_CODE => Some(wrap_id_in_urn_oid(DEFAULT_FORMAT_CODE_SYSTEM)),
        XDS_CONFIDENTIALITY_CODE => Some(wrap_id_in_urn_oid(CONFIDENTIALITY_CODE_SYSTEM)),
        _ => None,
    }
}
