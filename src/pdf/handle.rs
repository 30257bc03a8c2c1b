//! One-shot render results
//!
//! Every submission gets a [`RenderHandle`] immediately. The worker that runs
//! the task resolves it exactly once through the paired [`ReplySlot`]; a
//! slot dropped without a reply resolves the handle as
//! [`RenderFault::Abandoned`].

use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use super::backend::DecodeError;
use super::geometry::GeometryError;
use super::request::RequestId;
use super::types::{Bitmap, DocumentId};

/// Why a render produced no bitmap
#[derive(Debug, thiserror::Error)]
pub enum RenderFault {
    #[error("request key does not address a page")]
    InvalidKey,

    #[error("document {0} is not open")]
    UnknownDocument(DocumentId),

    #[error("document {0} is not ready")]
    NotReady(DocumentId),

    #[error("page {page} is out of range (document has {page_count} pages)")]
    PageOutOfRange { page: usize, page_count: usize },

    #[error("geometry: {0}")]
    Geometry(#[from] GeometryError),

    #[error("decode: {0}")]
    Decode(#[from] DecodeError),

    #[error("document {0} was closed during the render")]
    Closed(DocumentId),

    #[error("render executor has stopped")]
    ExecutorStopped,

    #[error("render task ended without a result")]
    Abandoned,
}

/// Bitmap on success; any error is an empty result
pub type RenderResult = Result<Bitmap, RenderFault>;

/// Pending result of one render submission
#[derive(Debug)]
pub struct RenderHandle {
    id: RequestId,
    rx: Receiver<RenderResult>,
}

/// Sending half of a [`RenderHandle`], consumed by the reply
#[derive(Debug)]
pub struct ReplySlot {
    id: RequestId,
    tx: Sender<RenderResult>,
}

impl RenderHandle {
    /// Create a handle and the slot that resolves it
    #[must_use]
    pub fn channel(id: RequestId) -> (ReplySlot, Self) {
        let (tx, rx) = flume::bounded(1);
        (ReplySlot { id, tx }, Self { id, rx })
    }

    /// Handle that is already resolved, for requests rejected up front
    #[must_use]
    pub fn resolved(id: RequestId, result: RenderResult) -> Self {
        let (slot, handle) = Self::channel(id);
        slot.resolve(result);
        handle
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.id
    }

    /// Block until the result arrives
    pub fn wait(self) -> RenderResult {
        self.rx.recv().unwrap_or(Err(RenderFault::Abandoned))
    }

    /// Block for at most `timeout`. `None` means still pending; the result
    /// can be collected by a later call.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<RenderResult> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(RenderFault::Abandoned)),
        }
    }

    /// Take the result if it has arrived
    pub fn try_take(&self) -> Option<RenderResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(RenderFault::Abandoned)),
        }
    }
}

impl ReplySlot {
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.id
    }

    /// Deliver the result. A dropped handle just discards it.
    pub fn resolve(self, result: RenderResult) {
        let _ = self.tx.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_once_with_the_sent_bitmap() {
        let (slot, handle) = RenderHandle::channel(RequestId::new(7));
        assert_eq!(handle.request_id(), RequestId::new(7));
        assert!(handle.try_take().is_none());

        slot.resolve(Ok(Bitmap::new(4, 3)));

        let bitmap = handle.wait().unwrap();
        assert_eq!(bitmap.dimensions(), (4, 3));
    }

    #[test]
    fn dropped_slot_resolves_as_abandoned() {
        let (slot, handle) = RenderHandle::channel(RequestId::new(1));
        drop(slot);
        assert!(matches!(handle.wait(), Err(RenderFault::Abandoned)));
    }

    #[test]
    fn pending_handle_times_out_without_losing_result() {
        let (slot, handle) = RenderHandle::channel(RequestId::new(2));
        assert!(handle.wait_timeout(Duration::from_millis(10)).is_none());

        slot.resolve(Err(RenderFault::InvalidKey));
        assert!(matches!(
            handle.wait_timeout(Duration::from_secs(1)),
            Some(Err(RenderFault::InvalidKey))
        ));
    }

    #[test]
    fn pre_resolved_handle_is_ready_immediately() {
        let handle = RenderHandle::resolved(RequestId::new(3), Err(RenderFault::ExecutorStopped));
        assert!(matches!(handle.try_take(), Some(Err(RenderFault::ExecutorStopped))));
    }
}
