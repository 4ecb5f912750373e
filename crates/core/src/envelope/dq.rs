//! ITI-38 Cross Gateway Query request (`AdhocQueryRequest`, FindDocuments).

use super::{hl7_timestamp, require, soap_envelope, Addressing, EnvelopeContext, SignedEnvelope};
use crate::constants::*;
use crate::models::{Coding, DateRange, OutboundDocumentQueryReq, XcaGateway};
use crate::{GatewayConfig, GatewayResult};
use chrono::Utc;
use ihe_certificates::SamlCertsAndKeys;
use ihe_saml::sign_full_saml;
use ihe_types::urn::{wrap_id_in_urn_oid, wrap_id_in_urn_uuid};
use ihe_xml::Element;

/// A named query slot and its single value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuerySlot {
    pub name: &'static str,
    pub value: String,
}

/// Validated content of one document query body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentQueryBody<'a> {
    pub message_id: &'a str,
    pub to_url: &'a str,
    pub gateway_home_community_id: &'a str,
    /// Present filters only, in protocol order.
    pub slots: Vec<QuerySlot>,
}

impl<'a> DocumentQueryBody<'a> {
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidRequest` when the request id, gateway URL, gateway home
    /// community id, or external patient id/system is blank.
    pub fn from_request(request: &'a OutboundDocumentQueryReq) -> GatewayResult<Self> {
        let patient_id = require(&request.external_gateway_patient.id, "external patient id")?;
        let patient_system = require(
            &request.external_gateway_patient.system,
            "external patient system",
        )?;

        let mut slots = vec![
            QuerySlot {
                name: "$XDSDocumentEntryPatientId",
                value: format!("'{patient_id}^^^&{patient_system}&ISO'"),
            },
            QuerySlot {
                name: "$XDSDocumentEntryStatus",
                value: format!("('{REGREP_STATUS_APPROVED}')"),
            },
        ];

        let coded = [
            ("$XDSDocumentEntryClassCode", &request.class_code),
            ("$XDSDocumentEntryPracticeSettingCode", &request.practice_setting_code),
            ("$XDSDocumentEntryHealthcareFacilityTypeCode", &request.facility_type_code),
        ];
        for (name, coding) in coded {
            if let Some((code, system)) = coding.as_ref().and_then(Coding::code_and_system) {
                slots.push(QuerySlot {
                    name,
                    value: format!("('{code}^^{system}')"),
                });
            }
        }

        push_range(
            &mut slots,
            request.service_date.as_ref(),
            "$XDSDocumentEntryServiceStartTimeFrom",
            "$XDSDocumentEntryServiceStartTimeTo",
        );
        push_range(
            &mut slots,
            request.document_creation_date.as_ref(),
            "$XDSDocumentEntryCreationTimeFrom",
            "$XDSDocumentEntryCreationTimeTo",
        );

        slots.push(QuerySlot {
            name: "$XDSDocumentEntryType",
            value: format!(
                "({},{})",
                wrap_id_in_urn_uuid(STABLE_DOCUMENT_TYPE),
                wrap_id_in_urn_uuid(ON_DEMAND_DOCUMENT_TYPE)
            ),
        });

        Ok(Self {
            message_id: require(&request.id, "request id")?,
            to_url: require(&request.gateway.url, "gateway url")?,
            gateway_home_community_id: require(
                &request.gateway.home_community_id,
                "gateway home community id",
            )?,
            slots,
        })
    }

    pub fn to_element(&self) -> Element {
        let slots = self.slots.iter().map(|slot| {
            Element::new("rim:Slot")
                .with_attr("name", slot.name)
                .with_child(
                    Element::new("rim:ValueList")
                        .with_child(Element::new("rim:Value").with_text(&slot.value)),
                )
        });

        Element::new("query:AdhocQueryRequest")
            .with_attr("xmlns:query", NS_QUERY)
            .with_attr("xmlns:rim", NS_RIM)
            .with_attr("federated", "false")
            .with_attr("id", wrap_id_in_urn_uuid(self.message_id))
            .with_attr("maxResults", "-1")
            .with_attr("startIndex", "0")
            .with_child(Element::new("query:ResponseOption").with_attr("returnType", "LeafClass"))
            .with_child(
                Element::new("rim:AdhocQuery")
                    .with_attr("home", wrap_id_in_urn_oid(self.gateway_home_community_id))
                    .with_attr("id", wrap_id_in_urn_uuid(FIND_DOCUMENTS_QUERY_ID))
                    .with_children(slots),
            )
    }
}

fn push_range(slots: &mut Vec<QuerySlot>, range: Option<&DateRange>, from: &'static str, to: &'static str) {
    let Some(range) = range else {
        return;
    };
    if let Some(date) = &range.date_from {
        slots.push(QuerySlot {
            name: from,
            value: hl7_timestamp(date),
        });
    }
    if let Some(date) = &range.date_to {
        slots.push(QuerySlot {
            name: to,
            value: hl7_timestamp(date),
        });
    }
}

/// Build the unsigned ITI-38 envelope.
pub fn create_iti38_envelope(
    request: &OutboundDocumentQueryReq,
    ctx: &EnvelopeContext<'_>,
) -> GatewayResult<String> {
    let body = DocumentQueryBody::from_request(request)?;
    soap_envelope(
        ctx,
        Addressing {
            to_url: body.to_url,
            action: ACTION_DQ,
            message_id: body.message_id,
        },
        &request.saml_attributes,
        None,
        body.to_element(),
    )
}

/// Build and sign one envelope per request. Any failure aborts the batch.
pub fn create_and_sign_bulk_dq_requests(
    requests: &[OutboundDocumentQueryReq],
    config: &GatewayConfig,
    certs: &SamlCertsAndKeys,
) -> GatewayResult<Vec<SignedEnvelope<XcaGateway, OutboundDocumentQueryReq>>> {
    let ctx = EnvelopeContext {
        config,
        public_cert: &certs.public_cert,
        created: Utc::now(),
    };

    requests
        .iter()
        .map(|request| -> GatewayResult<_> {
            let xml = create_iti38_envelope(request, &ctx)?;
            Ok(SignedEnvelope {
                gateway: request.gateway.clone(),
                signed_xml: sign_full_saml(&xml, certs)?,
                outbound_request: request.clone(),
            })
        })
        .collect()
}
