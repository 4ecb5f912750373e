//! URN helpers for identifiers exchanged with remote gateways.

const URN_OID_PREFIX: &str = "urn:oid:";
const URN_UUID_PREFIX: &str = "urn:uuid:";

/// Remove a leading `urn:oid:` or `urn:uuid:` prefix, if present.
pub fn strip_urn_prefix(value: &str) -> &str {
    value
        .strip_prefix(URN_OID_PREFIX)
        .or_else(|| value.strip_prefix(URN_UUID_PREFIX))
        .unwrap_or(value)
}

/// Remove surrounding angle brackets, as found on MTOM `Content-ID` values.
pub fn strip_brackets(value: &str) -> &str {
    value
        .strip_prefix('<')
        .and_then(|v| v.strip_suffix('>'))
        .unwrap_or(value)
}

/// Wrap an id as `urn:oid:{id}` unless it is already a URN or a URL.
pub fn wrap_id_in_urn_oid(id: &str) -> String {
    if id.starts_with("urn:") || id.starts_with("http://") || id.starts_with("https://") {
        id.to_owned()
    } else {
        format!("{URN_OID_PREFIX}{id}")
    }
}

/// Wrap an id as `urn:uuid:{id}` unless it already carries that prefix.
pub fn wrap_id_in_urn_uuid(id: &str) -> String {
    if id.starts_with(URN_UUID_PREFIX) {
        id.to_owned()
    } else {
        format!("{URN_UUID_PREFIX}{id}")
    }
}
