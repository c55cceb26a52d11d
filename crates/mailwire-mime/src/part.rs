//! MIME part tree.
//!
//! A message is a root [`Part`]: either a [`Leaf`] carrying a body, or a
//! [`Multipart`] container with a boundary token and ordered children. The
//! renderer walks this tree read-only; any content transfer encoding must
//! already have been applied to leaf bodies.

use crate::content_type::ContentType;
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::source::SharedSource;
use bytes::Bytes;
use std::fmt;

/// Longest boundary token allowed by RFC 2046.
pub const MAX_BOUNDARY_LEN: usize = 70;

/// Content of a leaf part.
#[derive(Clone)]
pub enum Body {
    /// Already-encoded bytes held in memory.
    Bytes(Bytes),
    /// A device-backed stream drained while rendering.
    Source(SharedSource),
}

impl Body {
    /// Returns true if the content comes from a streaming source.
    #[must_use]
    pub const fn is_source(&self) -> bool {
        matches!(self, Self::Source(_))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Source(_) => f.write_str("Source(..)"),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::Bytes(Bytes::new())
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Bytes(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

impl From<SharedSource> for Body {
    fn from(source: SharedSource) -> Self {
        Self::Source(source)
    }
}

/// A leaf body part.
#[derive(Debug, Clone, Default)]
pub struct Leaf {
    /// Part headers.
    pub headers: Headers,
    /// Part content.
    pub body: Body,
}

impl Leaf {
    /// Creates a new leaf part.
    #[must_use]
    pub fn new(headers: Headers, body: impl Into<Body>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }

    /// Creates a `text/plain; charset=utf-8` leaf.
    #[must_use]
    pub fn text(text: impl Into<Body>) -> Self {
        let mut headers = Headers::new();
        headers.add("Content-Type", ContentType::text_plain().to_string());
        Self::new(headers, text)
    }

    /// Creates a leaf whose content is streamed from `source`.
    #[must_use]
    pub fn from_source(headers: Headers, source: SharedSource) -> Self {
        Self::new(headers, Body::Source(source))
    }
}

/// A multipart container.
#[derive(Debug, Clone)]
pub struct Multipart {
    /// Container headers, including its `Content-Type`.
    pub headers: Headers,
    /// Delimiter token separating the children.
    pub boundary: Bytes,
    /// Ordered children.
    pub children: Vec<Part>,
}

impl Multipart {
    /// Creates an empty `multipart/<sub_type>` container.
    ///
    /// # Errors
    ///
    /// Returns an error if the boundary is not a valid RFC 2046 token.
    pub fn new(sub_type: &str, boundary: impl Into<String>) -> Result<Self> {
        Self::with_headers(Headers::new(), sub_type, boundary)
    }

    /// Creates an empty container with the given headers.
    ///
    /// A `Content-Type: multipart/<sub_type>; boundary="..."` header is added
    /// when `headers` has none.
    ///
    /// # Errors
    ///
    /// Returns an error if the boundary is not a valid RFC 2046 token.
    pub fn with_headers(
        mut headers: Headers,
        sub_type: &str,
        boundary: impl Into<String>,
    ) -> Result<Self> {
        let boundary = boundary.into();
        validate_boundary(&boundary)?;
        if !headers.contains("content-type") {
            headers.add(
                "Content-Type",
                ContentType::multipart(sub_type, boundary.as_str()).to_string(),
            );
        }
        Ok(Self {
            headers,
            boundary: Bytes::from(boundary),
            children: Vec::new(),
        })
    }

    /// Appends a child part.
    pub fn push(&mut self, child: impl Into<Part>) {
        self.children.push(child.into());
    }

    /// Appends a child part, builder style.
    #[must_use]
    pub fn with_child(mut self, child: impl Into<Part>) -> Self {
        self.push(child);
        self
    }
}

/// A node of the message tree.
#[derive(Debug, Clone)]
pub enum Part {
    /// Leaf body.
    Leaf(Leaf),
    /// Multipart container.
    Multipart(Multipart),
}

impl Part {
    /// Gets the part's headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        match self {
            Self::Leaf(leaf) => &leaf.headers,
            Self::Multipart(multipart) => &multipart.headers,
        }
    }

    /// Returns true for a leaf body part.
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Gets the Message-ID header.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.headers().get("message-id")
    }

    /// Gets the content type.
    ///
    /// Defaults to `text/plain; charset=utf-8` when the header is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the content type header is invalid.
    pub fn content_type(&self) -> Result<ContentType> {
        self.headers()
            .get("content-type")
            .map_or_else(|| Ok(ContentType::text_plain()), ContentType::parse)
    }
}

impl From<Leaf> for Part {
    fn from(leaf: Leaf) -> Self {
        Self::Leaf(leaf)
    }
}

impl From<Multipart> for Part {
    fn from(multipart: Multipart) -> Self {
        Self::Multipart(multipart)
    }
}

/// Generates a fresh boundary token.
#[must_use]
pub fn generate_boundary() -> String {
    format!("=_{}", uuid::Uuid::new_v4().simple())
}

/// Checks a boundary against the RFC 2046 `boundary` grammar.
///
/// # Errors
///
/// Returns an error if the token is empty, too long, ends with a space, or
/// contains a character outside `bchars`.
pub fn validate_boundary(boundary: &str) -> Result<()> {
    if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LEN {
        return Err(Error::InvalidBoundary(format!(
            "length must be 1..={MAX_BOUNDARY_LEN}: {boundary:?}"
        )));
    }
    if boundary.ends_with(' ') {
        return Err(Error::InvalidBoundary(format!(
            "trailing space: {boundary:?}"
        )));
    }
    let valid = boundary
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b"'()+_,-./:=? ".contains(&b));
    if !valid {
        return Err(Error::InvalidBoundary(format!(
            "invalid character: {boundary:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_text() {
        let leaf = Leaf::text("Hello");
        assert_eq!(
            leaf.headers.get("content-type"),
            Some("text/plain; charset=utf-8")
        );
        match &leaf.body {
            Body::Bytes(bytes) => assert_eq!(&bytes[..], b"Hello"),
            Body::Source(_) => panic!("expected in-memory body"),
        }
    }

    #[test]
    fn test_multipart_new_adds_content_type() {
        let mp = Multipart::new("mixed", "B1").unwrap();
        assert_eq!(&mp.boundary[..], b"B1");
        assert_eq!(
            mp.headers.get("Content-Type"),
            Some("multipart/mixed; boundary=B1")
        );
    }

    #[test]
    fn test_multipart_keeps_existing_content_type() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "multipart/related; boundary=\"x\"; type=\"text/html\"");
        let mp = Multipart::with_headers(headers, "related", "x").unwrap();
        assert_eq!(mp.headers.get_all("content-type").len(), 1);
        assert!(mp.headers.get("content-type").unwrap().contains("type="));
    }

    #[test]
    fn test_multipart_children_order() {
        let mp = Multipart::new("mixed", "B1")
            .unwrap()
            .with_child(Leaf::text("A"))
            .with_child(Multipart::new("alternative", "B2").unwrap())
            .with_child(Leaf::text("B"));
        let kinds: Vec<bool> = mp.children.iter().map(Part::is_leaf).collect();
        assert_eq!(kinds, vec![true, false, true]);
    }

    #[test]
    fn test_part_message_id_and_content_type() {
        let mut headers = Headers::new();
        headers.add("Message-ID", "<abc@example.com>");
        let part = Part::from(Leaf::new(headers, "x"));
        assert_eq!(part.message_id(), Some("<abc@example.com>"));
        assert!(part.content_type().unwrap().is_text());

        let mp = Part::from(Multipart::new("mixed", "q").unwrap());
        assert!(mp.content_type().unwrap().is_multipart());
        assert!(!mp.is_leaf());
    }

    #[test]
    fn test_validate_boundary() {
        assert!(validate_boundary("simple boundary").is_ok());
        assert!(validate_boundary("=_Part_0.123").is_ok());
        assert!(validate_boundary("").is_err());
        assert!(validate_boundary("trailing ").is_err());
        assert!(validate_boundary("semi;colon").is_err());
        assert!(validate_boundary(&"x".repeat(71)).is_err());
        assert!(validate_boundary(&"x".repeat(70)).is_ok());
    }

    #[test]
    fn test_generate_boundary() {
        let a = generate_boundary();
        let b = generate_boundary();
        assert_ne!(a, b);
        assert_eq!(a.len(), 34);
        assert!(validate_boundary(&a).is_ok());
    }

    #[test]
    fn test_body_debug_hides_source() {
        let body = Body::from("abc");
        assert_eq!(format!("{body:?}"), "Bytes(3)");
        assert!(!body.is_source());
    }
}
