//! Signature verification for signed SOAP documents.
//!
//! Verification is a total predicate: it answers `true` only when the document contains at
//! least one `ds:Signature` and every one of them validates against the supplied certificate,
//! with every reference digest checked locally. Anything else (parse failures, unsupported
//! algorithms, a bad certificate) is `false`, with the reason logged at debug level.
//!
//! Documents go through the `ihe-xml` parser first, so a DOCTYPE is refused before bergshamra
//! sees the text.

use crate::dsig::verification_context;
use bergshamra_dsig::verify::verify_all;
use bergshamra_dsig::VerifyResult;
use ihe_xml::Document;

/// Verify every signature in `xml` against the RSA key in `public_cert` (PEM or DER).
pub fn verify_xml_signatures(xml: &str, public_cert: &str) -> bool {
    if let Err(e) = Document::parse(xml) {
        tracing::debug!(error = %e, "signature verification: document rejected");
        return false;
    }

    let context = match verification_context(public_cert) {
        Ok(context) => context,
        Err(e) => {
            tracing::debug!(error = %e, "signature verification: unusable certificate");
            return false;
        }
    };

    let results = match verify_all(&context, xml) {
        Ok(results) => results,
        Err(e) => {
            tracing::debug!(error = %e, "signature verification failed");
            return false;
        }
    };

    results.iter().enumerate().all(|(index, result)| match result {
        VerifyResult::Valid { .. } if result.all_reference_digests_verified() => true,
        VerifyResult::Valid { .. } => {
            tracing::debug!(index, "signature leaves a reference digest unchecked");
            false
        }
        VerifyResult::Invalid { reason } => {
            tracing::debug!(index, %reason, "signature does not verify");
            false
        }
    })
}
