//! `multipart/related` bodies as used by MTOM/XOP responses.

use base64::{engine::general_purpose, Engine as _};
use ihe_types::urn::strip_brackets;
use std::borrow::Cow;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct MtomPart {
    /// Header names are lowercased.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MtomPart {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// `Content-ID` without its angle brackets.
    pub(crate) fn content_id(&self) -> Option<&str> {
        self.header("content-id").map(|id| strip_brackets(id.trim()))
    }

    /// Body bytes with any `base64` transfer encoding removed.
    pub(crate) fn decoded_body(&self) -> Result<Cow<'_, [u8]>, String> {
        match self.header("content-transfer-encoding") {
            Some(encoding) if encoding.trim().eq_ignore_ascii_case("base64") => {
                let compact: Vec<u8> = self
                    .body
                    .iter()
                    .copied()
                    .filter(|b| !b.is_ascii_whitespace())
                    .collect();
                general_purpose::STANDARD
                    .decode(compact)
                    .map(Cow::Owned)
                    .map_err(|e| format!("invalid base64 attachment: {e}"))
            }
            _ => Ok(Cow::Borrowed(&self.body)),
        }
    }
}

/// A parameter of a `Content-Type` header value, unquoted.
pub(crate) fn content_type_param(content_type: &str, name: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case(name) {
            return None;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        Some(value.to_owned())
    })
}

/// The id a `cid:` URL refers to, percent-decoded.
pub(crate) fn cid_reference(href: &str) -> String {
    let href = href.trim();
    let raw = match href.get(..4) {
        Some(scheme) if scheme.eq_ignore_ascii_case("cid:") => &href[4..],
        _ => href,
    };
    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.to_owned())
}

/// Split a multipart body into its parts.
///
/// A missing closing delimiter ends the last part at the end of the body.
pub(crate) fn parse_multipart(body: &[u8], boundary: &str) -> Result<Vec<MtomPart>, String> {
    let delimiter = format!("--{boundary}").into_bytes();
    let mut cursor =
        find_delimiter(body, &delimiter, 0).ok_or("multipart body has no boundary delimiter")?;
    let mut parts = Vec::new();

    loop {
        cursor += delimiter.len();
        if body[cursor..].starts_with(b"--") {
            break;
        }
        cursor = skip_line(body, cursor);

        let (end, next) = match find_delimiter(body, &delimiter, cursor) {
            Some(at) => (trim_line_ending(body, at), Some(at)),
            None => (body.len(), None),
        };
        parts.push(parse_part(&body[cursor..end.max(cursor)]));

        match next {
            Some(at) => cursor = at,
            None => break,
        }
    }

    Ok(parts)
}

/// Next delimiter at or after `from` that starts a line.
fn find_delimiter(body: &[u8], delimiter: &[u8], from: usize) -> Option<usize> {
    let mut start = from;
    while start + delimiter.len() <= body.len() {
        let offset = body[start..]
            .windows(delimiter.len())
            .position(|window| window == delimiter)?;
        let at = start + offset;
        if at == 0 || body[at - 1] == b'\n' {
            return Some(at);
        }
        start = at + 1;
    }
    None
}

fn skip_line(body: &[u8], from: usize) -> usize {
    body[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(body.len(), |offset| from + offset + 1)
}

fn trim_line_ending(body: &[u8], at: usize) -> usize {
    let mut end = at;
    if end > 0 && body[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && body[end - 1] == b'\r' {
        end -= 1;
    }
    end
}

fn parse_part(raw: &[u8]) -> MtomPart {
    let (head, body) = match find_blank_line(raw) {
        Some((head_end, body_start)) => (&raw[..head_end], &raw[body_start..]),
        None => (raw, &raw[raw.len()..]),
    };

    let mut headers: Vec<(String, String)> = Vec::new();
    for line in String::from_utf8_lossy(head).lines() {
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_owned()));
        }
    }

    MtomPart {
        headers,
        body: body.to_vec(),
    }
}

/// End of the header block and start of the body.
fn find_blank_line(raw: &[u8]) -> Option<(usize, usize)> {
    if raw.starts_with(b"\r\n") {
        return Some((0, 2));
    }
    if raw.starts_with(b"\n") {
        return Some((0, 1));
    }
    let crlf = raw.windows(4).position(|w| w == b"\r\n\r\n").map(|at| (at, at + 4));
    let lf = raw.windows(2).position(|w| w == b"\n\n").map(|at| (at, at + 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}
