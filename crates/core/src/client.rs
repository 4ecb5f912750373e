//! Outbound gateway client.
//!
//! Each operation runs the same pipeline: build and sign every envelope, send them
//! concurrently, then classify each transport outcome against the request that produced it.
//! Only configuration and signing problems surface as errors; everything that happens on the
//! wire becomes part of the returned responses.

use crate::config::GatewayConfig;
use crate::envelope::{
    create_and_sign_bulk_dq_requests, create_and_sign_bulk_dr_requests,
    create_and_sign_bulk_xcpd_requests,
};
use crate::models::{
    OutboundDocumentQueryReq, OutboundDocumentQueryResp, OutboundDocumentRetrievalReq,
    OutboundDocumentRetrievalResp, OutboundPatientDiscoveryReq, OutboundPatientDiscoveryResp,
    OutboundRequest, OutboundResponse,
};
use crate::process::{process_dq_response, process_dr_response, process_xcpd_response};
use crate::transport::{dispatch_all, HttpsTransport, SoapTransport};
use crate::GatewayResult;
use ihe_certificates::SamlCertsAndKeys;

/// Client for the XCPD and XCA transactions of one initiating community.
///
/// Generic over the transport so tests can answer envelopes without a network.
pub struct GatewayClient<T = HttpsTransport> {
    config: GatewayConfig,
    certs: SamlCertsAndKeys,
    transport: T,
}

impl GatewayClient<HttpsTransport> {
    /// Creates a client that sends over mutual-TLS HTTPS using the SAML signing identity.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` if the private key cannot be decrypted or the HTTPS client
    /// cannot be built.
    pub fn new(config: GatewayConfig, certs: SamlCertsAndKeys) -> GatewayResult<Self> {
        let transport = HttpsTransport::new(config.transport(), &certs)?;
        Ok(Self::with_transport(config, certs, transport))
    }
}

impl<T: SoapTransport> GatewayClient<T> {
    pub fn with_transport(config: GatewayConfig, certs: SamlCertsAndKeys, transport: T) -> Self {
        Self {
            config,
            certs,
            transport,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// ITI-55 against every gateway in the request.
    ///
    /// Returns one response per gateway, in request order.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` if the request has no gateways, is missing required demographics,
    /// or an envelope cannot be signed. Nothing is sent in that case.
    pub async fn patient_discovery(
        &self,
        request: &OutboundPatientDiscoveryReq,
    ) -> GatewayResult<Vec<OutboundPatientDiscoveryResp>> {
        let envelopes = create_and_sign_bulk_xcpd_requests(request, &self.config, &self.certs)?;
        tracing::info!(request_id = %request.id, gateways = envelopes.len(), "sending patient discovery");

        let outcomes = dispatch_all(&self.transport, &envelopes).await;
        let responses: Vec<_> = envelopes
            .iter()
            .zip(&outcomes)
            .map(|(envelope, outcome)| {
                process_xcpd_response(outcome, &envelope.outbound_request, &envelope.gateway)
            })
            .collect();

        let matched = responses
            .iter()
            .filter(|resp| resp.patient_match() == Some(true))
            .count();
        tracing::info!(request_id = %request.id, matched, "patient discovery complete");
        Ok(responses)
    }

    /// ITI-38, one query per request.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` if any request is invalid or cannot be signed.
    pub async fn document_query(
        &self,
        requests: &[OutboundDocumentQueryReq],
    ) -> GatewayResult<Vec<OutboundDocumentQueryResp>> {
        let envelopes = create_and_sign_bulk_dq_requests(requests, &self.config, &self.certs)?;
        tracing::info!(queries = envelopes.len(), "sending document queries");

        let outcomes = dispatch_all(&self.transport, &envelopes).await;
        Ok(envelopes
            .iter()
            .zip(&outcomes)
            .map(|(envelope, outcome)| process_dq_response(outcome, &envelope.outbound_request))
            .collect())
    }

    /// ITI-39, one retrieve per request.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` if any request is invalid or cannot be signed.
    pub async fn document_retrieval(
        &self,
        requests: &[OutboundDocumentRetrievalReq],
    ) -> GatewayResult<Vec<OutboundDocumentRetrievalResp>> {
        let envelopes = create_and_sign_bulk_dr_requests(requests, &self.config, &self.certs)?;
        tracing::info!(retrievals = envelopes.len(), "sending document retrievals");

        let outcomes = dispatch_all(&self.transport, &envelopes).await;
        Ok(envelopes
            .iter()
            .zip(&outcomes)
            .map(|(envelope, outcome)| process_dr_response(outcome, &envelope.outbound_request))
            .collect())
    }

    /// Run any tagged request and wrap each response in the matching variant.
    ///
    /// # Errors
    ///
    /// Same as the operation the request selects.
    pub async fn execute(&self, request: &OutboundRequest) -> GatewayResult<Vec<OutboundResponse>> {
        let responses = match request {
            OutboundRequest::PatientDiscovery(req) => self
                .patient_discovery(req)
                .await?
                .into_iter()
                .map(OutboundResponse::PatientDiscovery)
                .collect(),
            OutboundRequest::DocumentQuery(req) => self
                .document_query(std::slice::from_ref(req))
                .await?
                .into_iter()
                .map(OutboundResponse::DocumentQuery)
                .collect(),
            OutboundRequest::DocumentRetrieval(req) => self
                .document_retrieval(std::slice::from_ref(req))
                .await?
                .into_iter()
                .map(OutboundResponse::DocumentRetrieval)
                .collect(),
        };
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::tests::{certs, config};
    use crate::models::{IssueSeverity, PatientDiscoveryOutcome, XcpdGateway};
    use crate::process::ISSUE_HTTP_ERROR;
    use crate::transport::tests::FakeTransport;
    use crate::transport::{SoapResponse, TransportOutcome};
    use crate::GatewayError;

    const MATCH_RESPONSE: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../testdata/xcpd-match-response.xml"
    ));
    const DQ_RESPONSE: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../testdata/dq-response.xml"
    ));
    const RETRIEVE_RESPONSE: &str = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
  <s:Body>
    <xds:RetrieveDocumentSetResponse xmlns:xds="urn:ihe:iti:xds-b:2007"
        xmlns:rs="urn:oasis:names:tc:ebxml-regrep:xsd:rs:3.0">
      <rs:RegistryResponse status="urn:oasis:names:tc:ebxml-regrep:ResponseStatusType:Success"/>
      <xds:DocumentResponse>
        <xds:HomeCommunityId>urn:oid:2.16.840.1.113883.3.9621</xds:HomeCommunityId>
        <xds:RepositoryUniqueId>2.16.840.1.113883.3.9621.1</xds:RepositoryUniqueId>
        <xds:DocumentUniqueId>123456789</xds:DocumentUniqueId>
        <xds:mimeType>text/xml</xds:mimeType>
        <xds:Document>PENsaW5pY2FsRG9jdW1lbnQvPg==</xds:Document>
      </xds:DocumentResponse>
    </xds:RetrieveDocumentSetResponse>
  </s:Body>
</s:Envelope>"#;

    fn soap(xml: &str) -> TransportOutcome {
        TransportOutcome::Response(SoapResponse {
            content_type: Some("application/soap+xml; charset=UTF-8".into()),
            body: xml.as_bytes().to_vec(),
        })
    }

    fn client(responses: Vec<(&str, TransportOutcome)>) -> GatewayClient<FakeTransport> {
        let transport = FakeTransport {
            responses: responses
                .into_iter()
                .map(|(url, outcome)| (url.to_string(), outcome))
                .collect(),
        };
        GatewayClient::with_transport(config(), certs(), transport)
    }

    #[tokio::test]
    async fn patient_discovery_returns_one_response_per_gateway() {
        let mut request = crate::envelope::xcpd::tests::request();
        request.gateways.push(XcpdGateway {
            url: "https://unreachable.test/iti55".into(),
            oid: "2.16.840.1.113883.3.1000".into(),
            id: None,
        });
        let client = client(vec![(
            "https://mock-metriport/soap/iti55",
            soap(MATCH_RESPONSE),
        )]);

        let responses = client.patient_discovery(&request).await.expect("responses");
        assert_eq!(responses.len(), 2);

        assert_eq!(responses[0].gateway.oid, "2.16.840.1.113883.3.787.0.0");
        assert_eq!(responses[0].patient_match(), Some(true));

        assert_eq!(responses[1].gateway.oid, "2.16.840.1.113883.3.1000");
        match &responses[1].outcome {
            PatientDiscoveryOutcome::Fault(outcome) => {
                assert_eq!(outcome.issue[0].code, ISSUE_HTTP_ERROR);
                assert_eq!(outcome.issue[0].severity, IssueSeverity::Error);
                assert_eq!(outcome.issue[0].details.text, "connection refused");
            }
            other => panic!("expected a fault, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn signing_failure_aborts_before_sending() {
        let mut bad_certs = certs();
        bad_certs.private_key_password = "wrong".into();
        let client = GatewayClient::with_transport(
            config(),
            bad_certs,
            FakeTransport { responses: vec![] },
        );

        let err = client
            .patient_discovery(&crate::envelope::xcpd::tests::request())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Signing(_)));
    }

    #[tokio::test]
    async fn patient_discovery_without_gateways_is_rejected() {
        let mut request = crate::envelope::xcpd::tests::request();
        request.gateways.clear();

        let err = client(vec![]).patient_discovery(&request).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn document_query_classifies_each_request() {
        let query = crate::envelope::dq::tests::request();
        let url = query.gateway.url.clone();
        let mut unreachable = query.clone();
        unreachable.gateway.url = "https://unreachable.test/iti38".into();

        let responses = client(vec![(url.as_str(), soap(DQ_RESPONSE))])
            .document_query(&[query, unreachable])
            .await
            .expect("responses");

        assert_eq!(responses.len(), 2);
        let documents = responses[0].document_reference.as_ref().expect("documents");
        assert_eq!(documents.len(), 1);
        assert!(responses[0].operation_outcome.is_none());

        assert!(responses[1].document_reference.is_none());
        let outcome = responses[1].operation_outcome.as_ref().expect("outcome");
        assert_eq!(outcome.issue[0].code, ISSUE_HTTP_ERROR);
    }

    #[tokio::test]
    async fn execute_wraps_responses_by_kind() {
        let retrieval = crate::envelope::dr::tests::request();
        let client = client(vec![("https://gateway.test/iti39", soap(RETRIEVE_RESPONSE))]);

        let responses = client
            .execute(&OutboundRequest::DocumentRetrieval(retrieval))
            .await
            .expect("responses");

        assert_eq!(responses.len(), 1);
        match &responses[0] {
            OutboundResponse::DocumentRetrieval(resp) => {
                let documents = resp.document_reference.as_ref().expect("documents");
                assert_eq!(documents[0].document_id, "local-doc-1");
                assert_eq!(documents[0].content, b"<ClinicalDocument/>");
            }
            other => panic!("expected a retrieval response, got {other:?}"),
        }
    }
}
