//! Render request keys and requests
//!
//! A request key addresses one page of one open document, optionally with
//! crop margins: `"<documentId>/<page>"` or
//! `"<documentId>/<page>/(<left>,<top>,<right>,<bottom>)"`.
//!
//! Decoding is permissive. A malformed id or page becomes [`INVALID_FIELD`]
//! and malformed margins become "no margins", so a bad key degrades to
//! "render the full page" or to an empty result, never to a parse failure.

use std::fmt;

use super::geometry::{Margins, Size};
use super::types::DocumentId;

/// Sentinel for a key field that is missing or not a number
pub const INVALID_FIELD: i32 = -1;

/// Unique identifier for render submissions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Soft-parsed request key.
///
/// Fields keep the [`INVALID_FIELD`] sentinel instead of failing; use
/// [`RequestKey::target`] to find out whether the key addresses a page.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RequestKey {
    pub document_id: i32,
    pub page: i32,
    pub margins: Option<Margins>,
}

impl RequestKey {
    #[must_use]
    pub const fn new(document_id: i32, page: i32, margins: Option<Margins>) -> Self {
        Self {
            document_id,
            page,
            margins,
        }
    }

    /// Decode a request key. Never fails.
    #[must_use]
    pub fn decode(key: &str) -> Self {
        let parts: Vec<&str> = key.split('/').collect();
        if parts.len() < 2 {
            return Self::new(INVALID_FIELD, INVALID_FIELD, None);
        }

        let document_id = parts[0].trim().parse().unwrap_or(INVALID_FIELD);
        let page = parts[1].trim().parse().unwrap_or(INVALID_FIELD);
        let margins = parts.get(2).and_then(|token| decode_margins(token));

        Self {
            document_id,
            page,
            margins,
        }
    }

    /// Canonical key without margins
    #[must_use]
    pub fn encode(document_id: DocumentId, page: usize) -> String {
        format!("{document_id}/{page}")
    }

    /// Document and page this key addresses, if both are non-negative
    #[must_use]
    pub fn target(&self) -> Option<(DocumentId, usize)> {
        let document_id = DocumentId::from_raw(self.document_id)?;
        let page = usize::try_from(self.page).ok()?;
        Some((document_id, page))
    }

    /// Margins to crop, `Margins::NONE` when the key has none
    #[must_use]
    pub fn margins_or_none(&self) -> Margins {
        self.margins.unwrap_or(Margins::NONE)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.document_id, self.page)?;
        if let Some(m) = &self.margins {
            write!(f, "/({},{},{},{})", m.left, m.top, m.right, m.bottom)?;
        }
        Ok(())
    }
}

/// Margins token: the first and last characters are dropped (the
/// parentheses), the rest is split on commas. Anything but four elements is
/// ignored, and an element that is not a number counts as zero. Whitespace
/// around the token and its elements is ignored.
fn decode_margins(token: &str) -> Option<Margins> {
    let mut chars = token.trim().chars();
    chars.next();
    chars.next_back();
    let values: Vec<f32> = chars
        .as_str()
        .split(',')
        .map(|v| v.trim().parse().unwrap_or(0.0))
        .collect();

    match values.as_slice() {
        &[left, top, right, bottom] => Some(Margins::new(left, top, right, bottom)),
        _ => None,
    }
}

/// Fully resolved render request, built by the gateway from a valid key
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderRequest {
    pub document_id: DocumentId,
    pub page: usize,
    pub margins: Margins,
    pub size: Size,
}
