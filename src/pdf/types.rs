//! Core types for document rendering

use std::fmt;

use serde::Serialize;

/// Decoded page raster handed back to the display layer.
pub type Bitmap = image::RgbaImage;

/// Identifier of an open document.
///
/// Allocated monotonically starting at 0 and never reused while the
/// registry lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DocumentId(pub u32);

impl DocumentId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Convert a soft-parsed key field. Negative values have no document.
    #[must_use]
    pub fn from_raw(raw: i32) -> Option<Self> {
        u32::try_from(raw).ok().map(Self)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Intrinsic page size in points (1/72 inch).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn aspect_ratio(self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

/// Document information fields exposed through the metadata query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetadataField {
    Title,
    Subject,
    Author,
    Keywords,
    Producer,
    Creator,
    CreationDate,
    ModificationDate,
}

impl MetadataField {
    pub const ALL: [Self; 8] = [
        Self::Title,
        Self::Subject,
        Self::Author,
        Self::Keywords,
        Self::Producer,
        Self::Creator,
        Self::CreationDate,
        Self::ModificationDate,
    ];

    /// Key under which the field appears in the metadata map
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Title => "Title",
            Self::Subject => "Subject",
            Self::Author => "Author",
            Self::Keywords => "Keywords",
            Self::Producer => "Producer",
            Self::Creator => "Creator",
            Self::CreationDate => "CreationDate",
            Self::ModificationDate => "ModificationDate",
        }
    }

    #[must_use]
    pub const fn is_date(self) -> bool {
        matches!(self, Self::CreationDate | Self::ModificationDate)
    }
}

/// Metadata key carrying the URI the document was opened with.
pub const URL_METADATA_KEY: &str = "Url";

/// One row of a page listing.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PageEntry {
    /// Render request key without margins, e.g. `"3/0"`
    pub key: String,
    pub page_number: usize,
    pub doc_id: DocumentId,
    pub page_width: f64,
    pub page_height: f64,
    /// `page_width / page_height`
    pub page_ar: f64,
}
