//! ITI-39 Cross Gateway Retrieve request (`RetrieveDocumentSetRequest`).

use super::{require, soap_envelope, Addressing, EnvelopeContext, SignedEnvelope};
use crate::constants::{ACTION_DR, NS_XDS};
use crate::models::{OutboundDocumentRetrievalReq, XcaGateway};
use crate::{GatewayConfig, GatewayError, GatewayResult};
use chrono::Utc;
use ihe_certificates::SamlCertsAndKeys;
use ihe_saml::sign_full_saml;
use ihe_types::urn::wrap_id_in_urn_oid;
use ihe_xml::Element;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentRequestEntry<'a> {
    pub home_community_id: &'a str,
    pub repository_unique_id: &'a str,
    pub document_unique_id: &'a str,
}

/// Validated content of one document retrieval body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentRetrievalBody<'a> {
    pub message_id: &'a str,
    pub to_url: &'a str,
    pub documents: Vec<DocumentRequestEntry<'a>>,
}

impl<'a> DocumentRetrievalBody<'a> {
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidRequest` if there are no documents or any document has a
    /// blank home community, repository or document id.
    pub fn from_request(request: &'a OutboundDocumentRetrievalReq) -> GatewayResult<Self> {
        if request.document_reference.is_empty() {
            return Err(GatewayError::invalid_request(
                "document retrieval request has no documents",
            ));
        }
        let documents = request
            .document_reference
            .iter()
            .map(|doc| -> GatewayResult<DocumentRequestEntry<'a>> {
                Ok(DocumentRequestEntry {
                    home_community_id: require(&doc.home_community_id, "document home community id")?,
                    repository_unique_id: require(&doc.repository_unique_id, "repository unique id")?,
                    document_unique_id: require(&doc.doc_unique_id, "document unique id")?,
                })
            })
            .collect::<GatewayResult<Vec<_>>>()?;

        Ok(Self {
            message_id: require(&request.id, "request id")?,
            to_url: require(&request.gateway.url, "gateway url")?,
            documents,
        })
    }

    pub fn to_element(&self) -> Element {
        let requests = self.documents.iter().map(|doc| {
            Element::new("xds:DocumentRequest")
                .with_child(
                    Element::new("xds:HomeCommunityId")
                        .with_text(wrap_id_in_urn_oid(doc.home_community_id)),
                )
                .with_child(Element::new("xds:RepositoryUniqueId").with_text(doc.repository_unique_id))
                .with_child(Element::new("xds:DocumentUniqueId").with_text(doc.document_unique_id))
        });

        Element::new("xds:RetrieveDocumentSetRequest")
            .with_attr("xmlns:xds", NS_XDS)
            .with_children(requests)
    }
}

/// Build the unsigned ITI-39 envelope.
pub fn create_iti39_envelope(
    request: &OutboundDocumentRetrievalReq,
    ctx: &EnvelopeContext<'_>,
) -> GatewayResult<String> {
    let body = DocumentRetrievalBody::from_request(request)?;
    soap_envelope(
        ctx,
        Addressing {
            to_url: body.to_url,
            action: ACTION_DR,
            message_id: body.message_id,
        },
        &request.saml_attributes,
        None,
        body.to_element(),
    )
}

/// Build and sign one envelope per request. Any failure aborts the batch.
pub fn create_and_sign_bulk_dr_requests(
    requests: &[OutboundDocumentRetrievalReq],
    config: &GatewayConfig,
    certs: &SamlCertsAndKeys,
) -> GatewayResult<Vec<SignedEnvelope<XcaGateway, OutboundDocumentRetrievalReq>>> {
    let ctx = EnvelopeContext {
        config,
        public_cert: &certs.public_cert,
        created: Utc::now(),
    };

    requests
        .iter()
        .map(|request| -> GatewayResult<_> {
            let xml = create_iti39_envelope(request, &ctx)?;
            Ok(SignedEnvelope {
                gateway: request.gateway.clone(),
                signed_xml: sign_full_saml(&xml, certs)?,
                outbound_request: request.clone(),
            })
        })
        .collect()
}
