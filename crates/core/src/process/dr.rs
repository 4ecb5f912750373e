//! ITI-39 (`RetrieveDocumentSetResponse`) classification.
//!
//! Document content arrives either inline as base64 or as an MTOM attachment referenced by
//! `xop:Include`. A document that cannot be decoded or matched to the request is dropped with a
//! warning; the rest of the set is still returned.

use super::mtom::{cid_reference, content_type_param, parse_multipart, MtomPart};
use super::{
    http_error_outcome, is_success_status, no_documents_outcome, non_blank,
    registry_error_outcome, schema_error_outcome, with_soap_body, Classified,
};
use crate::constants::FALLBACK_MIME_TYPE;
use crate::models::{
    DocumentRetrievalReference, OutboundDocumentRetrievalReq, OutboundDocumentRetrievalResp,
    RetrievedDocument,
};
use crate::transport::{SoapResponse, TransportOutcome};
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use ihe_types::urn::{strip_brackets, strip_urn_prefix};
use ihe_xml::Element;

const RESPONSE_ROOT: &str = "RetrieveDocumentSetResponse";

pub fn process_dr_response(
    outcome: &TransportOutcome,
    request: &OutboundDocumentRetrievalReq,
) -> OutboundDocumentRetrievalResp {
    let classified = match outcome {
        TransportOutcome::Failed { error } => {
            tracing::warn!(request_id = %request.id, gateway = %request.gateway.home_community_id, %error, "document retrieval transport failure");
            Classified::Outcome(http_error_outcome(&request.id, error))
        }
        TransportOutcome::Response(response) => classify_retrieval(response, request),
    };
    let (document_reference, operation_outcome) = classified.into_parts();

    if let Some(documents) = &document_reference {
        tracing::info!(request_id = %request.id, gateway = %request.gateway.home_community_id, documents = documents.len(), "document retrieval complete");
    }

    OutboundDocumentRetrievalResp {
        id: request.id.clone(),
        patient_id: request.patient_id.clone(),
        timestamp: request.timestamp,
        response_timestamp: Utc::now(),
        gateway: request.gateway.clone(),
        document_reference,
        operation_outcome,
    }
}

fn classify_retrieval(
    response: &SoapResponse,
    request: &OutboundDocumentRetrievalReq,
) -> Classified<RetrievedDocument> {
    let unreadable = |error: String| {
        tracing::warn!(request_id = %request.id, gateway = %request.gateway.home_community_id, %error, "unreadable document retrieval response");
        Classified::Outcome(schema_error_outcome(&request.id, error))
    };

    let (soap, attachments) = if response.is_multipart() {
        match split_mtom(response) {
            Ok(split) => split,
            Err(error) => return unreadable(error),
        }
    } else {
        (response.text(), Vec::new())
    };

    with_soap_body(&soap, RESPONSE_ROOT, |body| {
        classify_document_set(body, &attachments, request)
    })
    .unwrap_or_else(unreadable)
}

/// The root SOAP part (named by the `start` parameter, else the first part) and every part.
fn split_mtom(response: &SoapResponse) -> Result<(String, Vec<MtomPart>), String> {
    let content_type = response.content_type.as_deref().unwrap_or_default();
    let boundary = content_type_param(content_type, "boundary")
        .ok_or("multipart response has no boundary parameter")?;
    let parts = parse_multipart(&response.body, &boundary)?;

    let start = content_type_param(content_type, "start");
    let root = start
        .as_deref()
        .and_then(|start| {
            let start = strip_brackets(start.trim());
            parts.iter().find(|part| part.content_id() == Some(start))
        })
        .or_else(|| parts.first())
        .ok_or("multipart response has no parts")?;

    let soap = String::from_utf8_lossy(&root.decoded_body()?).into_owned();
    Ok((soap, parts))
}

fn classify_document_set(
    body: &Element,
    attachments: &[MtomPart],
    request: &OutboundDocumentRetrievalReq,
) -> Classified<RetrievedDocument> {
    let registry = body.child("RegistryResponse");
    let entries: Vec<&Element> = body.children_named("DocumentResponse").collect();

    if is_success_status(registry.and_then(|r| r.attr("status"))) && !entries.is_empty() {
        let documents: Vec<_> = entries
            .into_iter()
            .filter_map(|entry| match retrieved_document(entry, attachments, request) {
                Ok(document) => Some(document),
                Err(reason) => {
                    tracing::warn!(request_id = %request.id, %reason, "dropping retrieved document");
                    None
                }
            })
            .collect();
        if !documents.is_empty() {
            return Classified::Entries(documents);
        }
    }
    if let Some(errors) = registry.and_then(|r| r.child("RegistryErrorList")) {
        return Classified::Outcome(registry_error_outcome(&request.id, errors));
    }
    Classified::Outcome(no_documents_outcome(&request.id))
}

fn retrieved_document(
    entry: &Element,
    attachments: &[MtomPart],
    request: &OutboundDocumentRetrievalReq,
) -> Result<RetrievedDocument, String> {
    let text = |local: &str| entry.child(local).and_then(Element::trimmed_text);

    let unique_id = text("DocumentUniqueId").ok_or("document response has no DocumentUniqueId")?;
    let unique_id = normalized_unique_id(&unique_id).to_owned();
    let reference = requested(request, &unique_id)
        .ok_or_else(|| format!("document {unique_id} was not requested"))?;

    let document = entry
        .child("Document")
        .ok_or_else(|| format!("document {unique_id} has no content"))?;
    let content = document_content(document, attachments)?;

    let content_type = text("mimeType")
        .or_else(|| infer::get(&content).map(|kind| kind.mime_type().to_owned()))
        .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_owned());

    Ok(RetrievedDocument {
        home_community_id: text("HomeCommunityId")
            .map(|id| strip_urn_prefix(&id).to_owned())
            .unwrap_or_else(|| strip_urn_prefix(reference.home_community_id.trim()).to_owned()),
        repository_unique_id: text("RepositoryUniqueId")
            .map(|id| strip_urn_prefix(&id).to_owned())
            .unwrap_or_else(|| reference.repository_unique_id.trim().to_owned()),
        doc_unique_id: unique_id,
        document_id: reference.document_id.clone(),
        content_type,
        size: content.len(),
        new_document_unique_id: text("NewDocumentUniqueId"),
        new_repository_unique_id: text("NewRepositoryUniqueId"),
        content,
    })
}

fn requested<'a>(
    request: &'a OutboundDocumentRetrievalReq,
    unique_id: &str,
) -> Option<&'a DocumentRetrievalReference> {
    request
        .document_reference
        .iter()
        .find(|reference| normalized_unique_id(&reference.doc_unique_id) == unique_id)
}

/// Document unique id without any `urn:` prefix or angle brackets.
fn normalized_unique_id(id: &str) -> &str {
    strip_brackets(strip_urn_prefix(strip_brackets(id.trim())).trim())
}

fn document_content(document: &Element, attachments: &[MtomPart]) -> Result<Vec<u8>, String> {
    if let Some(include) = document.child("Include") {
        let href = non_blank(include.attr("href")).ok_or("xop:Include has no href")?;
        let cid = cid_reference(href);
        let attachment = attachments
            .iter()
            .find(|part| part.content_id() == Some(cid.as_str()))
            .ok_or_else(|| format!("attachment {cid} not found"))?;
        return Ok(attachment.decoded_body()?.into_owned());
    }

    let encoded: String = document.text().split_whitespace().collect();
    if encoded.is_empty() {
        return Err("document has no content".to_owned());
    }
    general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| format!("invalid base64 document content: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::dr::tests::request;
    use crate::models::IssueSeverity;
    use crate::process::{ISSUE_HTTP_ERROR, ISSUE_NO_DOCUMENTS, ISSUE_SCHEMA_ERROR};

    const BOUNDARY: &str = "MIMEBoundary_4f3c2b1a";
    const PDF: &[u8] = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n1 0 obj\n<< /Type /Catalog >>\nendobj\n";

    fn document_response(unique_id: &str, mime_type: Option<&str>, document: &str) -> String {
        let mime_type = mime_type
            .map(|m| format!("<xds:mimeType>{m}</xds:mimeType>"))
            .unwrap_or_default();
        format!(
            r#"<xds:DocumentResponse>
          <xds:HomeCommunityId>urn:oid:2.16.840.1.113883.3.9621</xds:HomeCommunityId>
          <xds:RepositoryUniqueId>2.16.840.1.113883.3.9621.1</xds:RepositoryUniqueId>
          <xds:DocumentUniqueId>{unique_id}</xds:DocumentUniqueId>
          {mime_type}
          <xds:Document>{document}</xds:Document>
        </xds:DocumentResponse>"#
        )
    }

    fn retrieve_response(status: &str, content: &str) -> String {
        format!(
            r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
  <s:Body>
    <xds:RetrieveDocumentSetResponse xmlns:xds="urn:ihe:iti:xds-b:2007"
        xmlns:rs="urn:oasis:names:tc:ebxml-regrep:xsd:rs:3.0"
        xmlns:rim="urn:oasis:names:tc:ebxml-regrep:xsd:rim:3.0"
        xmlns:xop="http://www.w3.org/2004/08/xop/include">
      <rs:RegistryResponse status="urn:oasis:names:tc:ebxml-regrep:ResponseStatusType:{status}"/>
      {content}
    </xds:RetrieveDocumentSetResponse>
  </s:Body>
</s:Envelope>"#
        )
    }

    fn soap(xml: String) -> TransportOutcome {
        TransportOutcome::Response(SoapResponse {
            content_type: Some("application/soap+xml; charset=UTF-8".into()),
            body: xml.into_bytes(),
        })
    }

    fn mtom(xml: &str, attachments: &[(&str, &[u8])]) -> TransportOutcome {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Type: application/xop+xml; charset=UTF-8; type=\"application/soap+xml\"\r\n");
        body.extend_from_slice(b"Content-ID: <root.message@cxf.apache.org>\r\n\r\n");
        body.extend_from_slice(xml.as_bytes());
        for (cid, bytes) in attachments {
            body.extend_from_slice(format!("\r\n--{BOUNDARY}\r\n").as_bytes());
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n");
            body.extend_from_slice(format!("Content-ID: <{cid}>\r\n\r\n").as_bytes());
            body.extend_from_slice(bytes);
        }
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        TransportOutcome::Response(SoapResponse {
            content_type: Some(format!(
                "multipart/related; type=\"application/xop+xml\"; boundary=\"{BOUNDARY}\"; start=\"<root.message@cxf.apache.org>\""
            )),
            body,
        })
    }

    #[test]
    fn inline_base64_documents_are_decoded_and_correlated() {
        let xml = retrieve_response(
            "Success",
            &document_response("123456789", Some("text/xml"), "PENsaW5pY2FsRG9jdW1lbnQvPg=="),
        );
        let resp = process_dr_response(&soap(xml), &request());
        assert!(resp.operation_outcome.is_none());

        let documents = resp.document_reference.expect("documents");
        assert_eq!(documents.len(), 1);
        let doc = &documents[0];
        assert_eq!(doc.content, b"<ClinicalDocument/>");
        assert_eq!(doc.size, 19);
        assert_eq!(doc.content_type, "text/xml");
        assert_eq!(doc.document_id, "local-doc-1");
        assert_eq!(doc.home_community_id, "2.16.840.1.113883.3.9621");
        assert_eq!(doc.repository_unique_id, "2.16.840.1.113883.3.9621.1");
        assert_eq!(doc.doc_unique_id, "123456789");
    }

    #[test]
    fn mtom_attachments_are_resolved_by_content_id() {
        let include = r#"<xop:Include href="cid:1.doc%40cxf.apache.org"/>"#;
        let xml = retrieve_response("Success", &document_response("987654321", None, include));
        let resp = process_dr_response(&mtom(&xml, &[("1.doc@cxf.apache.org", PDF)]), &request());

        let documents = resp.document_reference.expect("documents");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].content, PDF);
        assert_eq!(documents[0].content_type, "application/pdf");
        assert_eq!(documents[0].document_id, "local-doc-2");
    }

    #[test]
    fn undecodable_or_unrequested_documents_are_dropped() {
        let entries = [
            document_response("123456789", Some("text/xml"), "PENsaW5pY2FsRG9jdW1lbnQvPg=="),
            document_response("555", Some("text/xml"), "PENsaW5pY2FsRG9jdW1lbnQvPg=="),
            document_response("987654321", None, r#"<xop:Include href="cid:missing"/>"#),
        ]
        .concat();
        let xml = retrieve_response("PartialSuccess", &entries);
        let resp = process_dr_response(&mtom(&xml, &[]), &request());

        let documents = resp.document_reference.expect("documents");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].document_id, "local-doc-1");
    }

    #[test]
    fn success_with_every_document_dropped_reports_no_documents() {
        let xml = retrieve_response(
            "Success",
            &document_response("555", Some("text/xml"), "PENsaW5pY2FsRG9jdW1lbnQvPg=="),
        );
        let resp = process_dr_response(&soap(xml), &request());

        assert!(resp.document_reference.is_none());
        let issue = &resp.operation_outcome.expect("outcome").issue[0];
        assert_eq!(issue.code, ISSUE_NO_DOCUMENTS);
        assert_eq!(issue.severity, IssueSeverity::Information);
    }

    #[test]
    fn bracketed_and_prefixed_request_ids_still_correlate() {
        let mut request = request();
        request.document_reference[0].doc_unique_id = " <urn:oid:123456789> ".into();
        let xml = retrieve_response(
            "Success",
            &document_response("&lt;123456789&gt;", Some("text/xml"), "PENsaW5pY2FsRG9jdW1lbnQvPg=="),
        );
        let resp = process_dr_response(&soap(xml), &request);

        let documents = resp.document_reference.expect("documents");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].document_id, "local-doc-1");
        assert_eq!(documents[0].doc_unique_id, "123456789");
    }

    #[test]
    fn unknown_binary_content_falls_back_to_octet_stream() {
        let xml = retrieve_response("Success", &document_response("123456789", None, "AAECAw=="));
        let resp = process_dr_response(&soap(xml), &request());
        let documents = resp.document_reference.expect("documents");
        assert_eq!(documents[0].content_type, FALLBACK_MIME_TYPE);
    }

    #[test]
    fn registry_errors_and_empty_sets_are_outcomes() {
        let errors = r#"<rs:RegistryResponse status="urn:oasis:names:tc:ebxml-regrep:ResponseStatusType:Failure">
            <rs:RegistryErrorList>
              <rs:RegistryError errorCode="XDSDocumentUniqueIdError" codeContext="Document not found"
                  severity="urn:oasis:names:tc:ebxml-regrep:ErrorSeverityType:Error"/>
            </rs:RegistryErrorList>
          </rs:RegistryResponse>"#;
        let xml = format!(
            r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body>
              <xds:RetrieveDocumentSetResponse xmlns:xds="urn:ihe:iti:xds-b:2007"
                  xmlns:rs="urn:oasis:names:tc:ebxml-regrep:xsd:rs:3.0">{errors}</xds:RetrieveDocumentSetResponse>
            </s:Body></s:Envelope>"#
        );
        let resp = process_dr_response(&soap(xml), &request());
        assert!(resp.document_reference.is_none());
        assert_eq!(
            resp.operation_outcome.expect("outcome").issue[0].code,
            "XDSDocumentUniqueIdError"
        );

        let resp = process_dr_response(&soap(retrieve_response("Success", "")), &request());
        let issue = &resp.operation_outcome.expect("outcome").issue[0];
        assert_eq!(issue.code, ISSUE_NO_DOCUMENTS);
        assert_eq!(issue.severity, IssueSeverity::Information);
    }

    #[test]
    fn transport_and_framing_failures_are_reported() {
        let resp = process_dr_response(&TransportOutcome::failed("HTTP 502 error"), &request());
        assert_eq!(resp.operation_outcome.expect("outcome").issue[0].code, ISSUE_HTTP_ERROR);

        let broken = TransportOutcome::Response(SoapResponse {
            content_type: Some("multipart/related; boundary=nowhere".into()),
            body: b"<Envelope/>".to_vec(),
        });
        let resp = process_dr_response(&broken, &request());
        assert_eq!(resp.operation_outcome.expect("outcome").issue[0].code, ISSUE_SCHEMA_ERROR);
    }
}
