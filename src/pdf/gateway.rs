//! Entry point for the display layer

use std::sync::Arc;

use log::debug;

use super::geometry::Size;
use super::handle::{RenderFault, RenderHandle};
use super::registry::DocumentRegistry;
use super::request::{RenderRequest, RequestKey};
use super::service::JobQueue;
use super::types::{DocumentId, PageEntry};

/// Turns request keys into render submissions
#[derive(Clone, Debug)]
pub struct RenderGateway {
    registry: Arc<DocumentRegistry>,
    jobs: JobQueue,
}

impl RenderGateway {
    #[must_use]
    pub fn new(registry: Arc<DocumentRegistry>, jobs: JobQueue) -> Self {
        Self { registry, jobs }
    }

    /// Render the page addressed by `key` at `size`.
    ///
    /// Never blocks on decoding. Keys that do not address a page resolve
    /// immediately with [`RenderFault::InvalidKey`].
    pub fn request_render(&self, key: &str, size: Size) -> RenderHandle {
        let parsed = RequestKey::decode(key);
        let Some((document_id, page)) = parsed.target() else {
            let id = self.jobs.next_request_id();
            debug!("Render {id} rejected: invalid key {key:?}");
            return RenderHandle::resolved(id, Err(RenderFault::InvalidKey));
        };

        let request = RenderRequest {
            document_id,
            page,
            margins: parsed.margins_or_none(),
            size,
        };
        self.jobs.submit_render(request, Arc::clone(&self.registry))
    }

    /// One entry per page of a ready document; empty otherwise
    #[must_use]
    pub fn list_pages(&self, document_id: DocumentId) -> Vec<PageEntry> {
        let page_count = self.registry.page_count(document_id);
        (0..page_count)
            .filter_map(|page| {
                let size = self.registry.page_size(document_id, page)?;
                Some(PageEntry {
                    key: RequestKey::encode(document_id, page),
                    page_number: page,
                    doc_id: document_id,
                    page_width: f64::from(size.width),
                    page_height: f64::from(size.height),
                    page_ar: size.aspect_ratio(),
                })
            })
            .collect()
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<DocumentRegistry> {
        &self.registry
    }
}
