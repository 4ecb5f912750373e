//! Owned XML tree for SOAP messages.
//!
//! Outbound envelopes are built as nested [`Element`] expressions, and the signing pipeline needs
//! to locate and rewrite specific elements (insert a `Signature` before a `Timestamp`). A
//! streaming parser alone cannot give us either.
//!
//! Responsibilities:
//! - Parse XML text into an owned [`Element`] tree (quick-xml underneath)
//! - Serialise trees back to text
//! - Address elements by [`NodePath`] and apply consuming (non-aliasing) insert transforms
//!
//! Notes:
//! - Comments and processing instructions are dropped on parse.
//! - DOCTYPE declarations are rejected outright, so entity expansion never happens.

mod dom;

pub use dom::{Attribute, Document, Element, Node, NodePath};

#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Parse(#[from] quick_xml::Error),
    #[error("malformed XML attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),
    #[error("invalid XML escape: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),
    #[error("XML is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("DOCTYPE declarations are not accepted")]
    DocType,
    #[error("document has no root element")]
    NoRoot,
    #[error("unexpected content after the root element")]
    TrailingContent,
    #[error("element '{0}' is never closed")]
    Unclosed(String),
    #[error("end tag without a matching start tag")]
    UnbalancedEnd,
    #[error("no element at the given path")]
    InvalidPath,
}

pub type XmlResult<T> = std::result::Result<T, XmlError>;
