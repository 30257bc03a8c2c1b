//! Page decoder seam
//!
//! A [`DocumentBackend`] parses a file into a [`PageSource`], which answers
//! page queries and rasterizes pages. Each open document owns one
//! [`DecoderHandle`]; render tasks hold it through an `Arc`, so a document
//! closed mid-render stays valid memory until the task lets go.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use super::geometry::Size;
use super::types::{Bitmap, MetadataField, PageSize};

/// Errors from the underlying page decoder
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[cfg(feature = "pdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("{detail}")]
    Generic { detail: String },
}

impl DecodeError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// Parses documents. Called on a worker thread.
pub trait DocumentBackend: Send + Sync {
    fn load(&self, path: &Path) -> Result<Box<dyn PageSource>, DecodeError>;
}

/// A parsed document.
///
/// Rendering must not mutate shared state: several workers may render
/// pages of the same source at once.
pub trait PageSource: Send + Sync {
    fn page_count(&self) -> usize;

    /// Intrinsic size of `page` in points, `None` when out of range
    fn page_size(&self, page: usize) -> Option<PageSize>;

    /// Size of the document in bytes
    fn bytes_count(&self) -> u64;

    /// Value of a document information field, empty when absent
    fn metadata_field(&self, field: MetadataField) -> String;

    /// Rasterize `page` scaled to exactly `size` pixels
    fn render(&self, page: usize, size: Size) -> Result<Bitmap, DecodeError>;
}

/// Per-document decoder state shared between the registry and render tasks
pub struct DecoderHandle {
    path: PathBuf,
    source: OnceLock<Box<dyn PageSource>>,
    closed: AtomicBool,
}

impl DecoderHandle {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            source: OnceLock::new(),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parsed source, once the load has been applied
    #[must_use]
    pub fn source(&self) -> Option<&dyn PageSource> {
        self.source.get().map(|s| &**s)
    }

    /// Install the parsed source. Returns false if one was already set.
    pub(crate) fn install(&self, source: Box<dyn PageSource>) -> bool {
        self.source.set(source).is_ok()
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for DecoderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderHandle")
            .field("path", &self.path)
            .field("loaded", &self.source.get().is_some())
            .field("closed", &self.is_closed())
            .finish()
    }
}
