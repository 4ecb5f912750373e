//! Protocol constants: SOAP actions, namespaces and XDS identifiers.

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_ASSERTION_LIFETIME_MINUTES: i64 = 5;
pub const REPLY_TO_ANONYMOUS: &str = "http://www.w3.org/2005/08/addressing/anonymous";

pub const SOAP_CONTENT_TYPE: &str = "application/soap+xml;charset=UTF-8";

pub const ACTION_XCPD: &str = "urn:hl7-org:v3:PRPA_IN201305UV02:CrossGatewayPatientDiscovery";
pub const ACTION_DQ: &str = "urn:ihe:iti:2007:CrossGatewayQuery";
pub const ACTION_DR: &str = "urn:ihe:iti:2007:CrossGatewayRetrieve";

pub const NS_SOAP: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const NS_WSA: &str = "http://www.w3.org/2005/08/addressing";
pub const NS_HL7: &str = "urn:hl7-org:v3";
pub const NS_QUERY: &str = "urn:oasis:names:tc:ebxml-regrep:xsd:query:3.0";
pub const NS_RIM: &str = "urn:oasis:names:tc:ebxml-regrep:xsd:rim:3.0";
pub const NS_XDS: &str = "urn:ihe:iti:xds-b:2007";

/// Responding gateway that rejects the `urn:` prefix on body children.
pub const UNPREFIXED_BODY_GATEWAY_URL: &str =
    "https://www.medentcq.com:14430/MedentRespondingGateway-1.0-SNAPSHOT/RespondingGateway/xcpd-iti55";

pub const HL7_INTERACTION_CODE_SYSTEM: &str = "2.16.840.1.113883.1.6";
pub const HL7_GENDER_CODE_SYSTEM: &str = "2.16.840.1.113883.5.1";
pub const NPI_CODE_SYSTEM: &str = "2.16.840.1.113883.4.6";

pub const FIND_DOCUMENTS_QUERY_ID: &str = "14d4debf-8f97-4251-9a74-a90016b0af0d";
pub const STABLE_DOCUMENT_TYPE: &str = "7edca82f-054d-47f2-a032-9b2a5b5186c1";
pub const ON_DEMAND_DOCUMENT_TYPE: &str = "34268e47-fdf5-41a6-ba33-82133c465248";
pub const REGREP_STATUS_APPROVED: &str = "urn:oasis:names:tc:ebxml-regrep:StatusType:Approved";

pub const STATUS_SUCCESS: &str = "Success";
pub const STATUS_PARTIAL_SUCCESS: &str = "PartialSuccess";

// XDSDocumentEntry classification and identification schemes.
pub const XDS_UNIQUE_ID: &str = "urn:uuid:2e82c1f6-a085-4c72-9da3-8640a32e42ab";
pub const XDS_CLASS_CODE: &str = "urn:uuid:41a5887f-8865-4c09-adf7-e362475b143a";
pub const XDS_TYPE_CODE: &str = "urn:uuid:f0306f51-975f-434e-a61c-c59651d33983";
pub const XDS_FORMAT_CODE: &str = "urn:uuid:a09d5840-386c-46f2-b5ad-9c3699a4309d";
pub const XDS_CONFIDENTIALITY_CODE: &str = "urn:uuid:f4f85eac-e6cb-4883-b524-f2705394840f";
pub const XDS_PRACTICE_SETTING_CODE: &str = "urn:uuid:cccf5598-8b07-4b77-a05e-ae952c785ead";
pub const XDS_FACILITY_TYPE_CODE: &str = "urn:uuid:f33fb8ac-18af-42cc-ae0e-ed0b0bdb91e1";
pub const XDS_AUTHOR: &str = "urn:uuid:93606bcf-9494-43ec-9b4e-a7748d1a838d";

pub const LOINC_SYSTEM_URI: &str = "http://loinc.org";
pub const SNOMED_SYSTEM_URI: &str = "http://snomed.info/sct";
pub const CONFIDENTIALITY_CODE_SYSTEM: &str = "2.16.840.1.113883.5.25";
pub const DEFAULT_FORMAT_CODE_SYSTEM: &str = "1.3.6.1.4.1.19376.1.2.3";

pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";
