//! Open documents and their readiness
//!
//! The registry is the single owner of document entries. `open` creates an
//! entry and queues its load on the worker pool; the parsed result comes
//! back as a [`LoadEvent`] on the registry's event thread, which is the only
//! place readiness ever flips. Accessors never fail: unknown or not yet
//! ready documents answer with zero/empty values.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use flume::{Receiver, Sender};
use log::{debug, info, warn};

use super::backend::{DecoderHandle, DocumentBackend, PageSource};
use super::handle::RenderFault;
use super::service::JobQueue;
use super::types::{DocumentId, MetadataField, PageSize, URL_METADATA_KEY};
use super::worker::{LoadEvent, LoadJob};

const FILE_URI_PREFIX: &str = "file://";

/// Why `open` created no document
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("empty document URI")]
    EmptyUri,

    #[error("not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("render executor has stopped")]
    ExecutorStopped,

    #[error("no document ids left to allocate")]
    IdsExhausted,
}

struct DocumentEntry {
    uri: String,
    file_name: String,
    handle: Arc<DecoderHandle>,
    ready: bool,
}

#[derive(Default)]
struct RegistryState {
    documents: HashMap<DocumentId, DocumentEntry>,
    next_id: u32,
    subscribers: Vec<Sender<DocumentId>>,
}

impl RegistryState {
    fn ready_entry(&self, id: DocumentId) -> Option<(&DocumentEntry, &dyn PageSource)> {
        let entry = self.documents.get(&id).filter(|e| e.ready)?;
        let source = entry.handle.source()?;
        Some((entry, source))
    }

    /// Apply a finished load. Returns true only the first time a load is
    /// applied to a live entry; stale or duplicate messages change nothing.
    fn on_load_complete(
        &mut self,
        id: DocumentId,
        handle: &Arc<DecoderHandle>,
        source: Box<dyn PageSource>,
    ) -> bool {
        let Some(entry) = self.documents.get_mut(&id) else {
            debug!("Ignoring load of document {id}: no longer open");
            return false;
        };
        if !Arc::ptr_eq(&entry.handle, handle) || handle.is_closed() {
            debug!("Ignoring load of document {id}: stale handle");
            return false;
        }
        if entry.ready || !handle.install(source) {
            debug!("Ignoring duplicate load of document {id}");
            return false;
        }

        entry.ready = true;
        // Broadcast under the same lock that flipped readiness
        self.subscribers.retain(|tx| tx.send(id).is_ok());
        true
    }
}

/// Registry of open documents
pub struct DocumentRegistry {
    state: Arc<RwLock<RegistryState>>,
    backend: Arc<dyn DocumentBackend>,
    jobs: JobQueue,
    events: Sender<LoadEvent>,
}

impl DocumentRegistry {
    /// Create an empty registry that loads documents through `backend` on
    /// the pool behind `jobs`.
    pub fn new(backend: Arc<dyn DocumentBackend>, jobs: JobQueue) -> std::io::Result<Self> {
        let state = Arc::new(RwLock::new(RegistryState::default()));
        let (events, events_rx) = flume::unbounded();

        let event_state = Arc::clone(&state);
        std::thread::Builder::new()
            .name("pdf-registry".to_string())
            .spawn(move || registry_events(&event_state, events_rx))?;

        Ok(Self {
            state,
            backend,
            jobs,
            events,
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a document and start loading it in the background.
    ///
    /// Accepts a plain path or a `file://` URI. The returned id is not ready
    /// yet; watch [`subscribe`](Self::subscribe) or poll
    /// [`is_ready`](Self::is_ready).
    pub fn open(&self, uri: &str) -> Result<DocumentId, OpenError> {
        let raw_path = uri.strip_prefix(FILE_URI_PREFIX).unwrap_or(uri);
        if raw_path.is_empty() {
            return Err(OpenError::EmptyUri);
        }

        let path = PathBuf::from(raw_path);
        if !path.is_file() {
            return Err(OpenError::NotAFile(path));
        }

        let file_name = display_file_name(&path);
        let handle = Arc::new(DecoderHandle::new(path));

        let id = {
            let mut state = self.write();
            let id = DocumentId::new(state.next_id);
            state.next_id = state
                .next_id
                .checked_add(1)
                .ok_or(OpenError::IdsExhausted)?;
            state.documents.insert(
                id,
                DocumentEntry {
                    uri: uri.to_string(),
                    file_name,
                    handle: Arc::clone(&handle),
                    ready: false,
                },
            );
            id
        };

        let queued = self.jobs.submit_load(LoadJob {
            id,
            handle: Arc::clone(&handle),
            backend: Arc::clone(&self.backend),
            done: self.events.clone(),
        });
        if !queued {
            self.write().documents.remove(&id);
            handle.mark_closed();
            return Err(OpenError::ExecutorStopped);
        }

        info!("Opened document {id}: {}", handle.path().display());
        Ok(id)
    }

    /// Integer form of [`open`](Self::open): the new id, or `-1`
    pub fn open_raw(&self, uri: &str) -> i64 {
        match self.open(uri) {
            Ok(id) => i64::from(id.get()),
            Err(e) => {
                warn!("Cannot open {uri:?}: {e}");
                -1
            }
        }
    }

    /// Forget a document. Unknown ids are ignored.
    pub fn close(&self, id: DocumentId) {
        let removed = self.write().documents.remove(&id);
        if let Some(entry) = removed {
            entry.handle.mark_closed();
            info!("Closed document {id}");
        }
    }

    #[must_use]
    pub fn is_ready(&self, id: DocumentId) -> bool {
        self.read().documents.get(&id).is_some_and(|e| e.ready)
    }

    #[must_use]
    pub fn contains(&self, id: DocumentId) -> bool {
        self.read().documents.contains_key(&id)
    }

    #[must_use]
    pub fn document_count(&self) -> usize {
        self.read().documents.len()
    }

    #[must_use]
    pub fn page_count(&self, id: DocumentId) -> usize {
        self.read()
            .ready_entry(id)
            .map_or(0, |(_, source)| source.page_count())
    }

    #[must_use]
    pub fn bytes_count(&self, id: DocumentId) -> u64 {
        self.read()
            .ready_entry(id)
            .map_or(0, |(_, source)| source.bytes_count())
    }

    #[must_use]
    pub fn file_name(&self, id: DocumentId) -> String {
        self.read()
            .ready_entry(id)
            .map(|(entry, _)| entry.file_name.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn page_size(&self, id: DocumentId, page: usize) -> Option<PageSize> {
        self.read()
            .ready_entry(id)
            .and_then(|(_, source)| source.page_size(page))
    }

    /// Document information plus the `Url` it was opened with
    #[must_use]
    pub fn metadata(&self, id: DocumentId) -> BTreeMap<String, String> {
        let state = self.read();
        let Some((entry, source)) = state.ready_entry(id) else {
            return BTreeMap::new();
        };

        let mut metadata: BTreeMap<String, String> = MetadataField::ALL
            .iter()
            .map(|&field| (field.key().to_string(), source.metadata_field(field)))
            .collect();
        metadata.insert(URL_METADATA_KEY.to_string(), entry.uri.clone());
        metadata
    }

    /// Receive the id of every document that becomes ready from now on
    #[must_use]
    pub fn subscribe(&self) -> Receiver<DocumentId> {
        let (tx, rx) = flume::unbounded();
        self.write().subscribers.push(tx);
        rx
    }

    /// Decoder handle for a render task
    pub(crate) fn decoder_for_render(
        &self,
        id: DocumentId,
    ) -> Result<Arc<DecoderHandle>, RenderFault> {
        let state = self.read();
        let entry = state
            .documents
            .get(&id)
            .ok_or(RenderFault::UnknownDocument(id))?;
        if !entry.ready {
            return Err(RenderFault::NotReady(id));
        }
        Ok(Arc::clone(&entry.handle))
    }
}

impl std::fmt::Debug for DocumentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentRegistry")
            .field("documents", &self.document_count())
            .finish_non_exhaustive()
    }
}

fn display_file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Event loop: applies load results until every sender is gone
fn registry_events(state: &RwLock<RegistryState>, events: Receiver<LoadEvent>) {
    for event in events {
        let LoadEvent {
            id,
            handle,
            outcome,
        } = event;

        match outcome {
            Ok(source) => {
                let page_count = source.page_count();
                let applied = state
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .on_load_complete(id, &handle, source);
                if applied {
                    info!("Document {id} ready: {page_count} pages");
                }
            }
            Err(e) => warn!(
                "Failed to load document {id} ({}): {e}",
                handle.path().display()
            ),
        }
    }
    debug!("Registry event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::backend::DecodeError;
    use crate::pdf::geometry::Size;
    use crate::pdf::service::RenderExecutor;
    use crate::pdf::types::Bitmap;

    struct StubSource;

    impl PageSource for StubSource {
        fn page_count(&self) -> usize {
            2
        }

        fn page_size(&self, _page: usize) -> Option<PageSize> {
            Some(PageSize::new(100.0, 200.0))
        }

        fn bytes_count(&self) -> u64 {
            10
        }

        fn metadata_field(&self, _field: MetadataField) -> String {
            String::new()
        }

        fn render(&self, _page: usize, size: Size) -> Result<Bitmap, DecodeError> {
            Ok(Bitmap::new(size.width, size.height))
        }
    }

    struct StubBackend;

    impl DocumentBackend for StubBackend {
        fn load(&self, _path: &Path) -> Result<Box<dyn PageSource>, DecodeError> {
            Ok(Box::new(StubSource))
        }
    }

    fn state_with_entry(id: DocumentId) -> (RegistryState, Arc<DecoderHandle>) {
        let handle = Arc::new(DecoderHandle::new(PathBuf::from("a.pdf")));
        let mut state = RegistryState::default();
        state.documents.insert(
            id,
            DocumentEntry {
                uri: "a.pdf".to_string(),
                file_name: "a.pdf".to_string(),
                handle: Arc::clone(&handle),
                ready: false,
            },
        );
        (state, handle)
    }

    #[test]
    fn duplicate_load_completion_is_a_noop() {
        let id = DocumentId::new(0);
        let (mut state, handle) = state_with_entry(id);
        let (tx, rx) = flume::unbounded();
        state.subscribers.push(tx);

        assert!(state.on_load_complete(id, &handle, Box::new(StubSource)));
        assert!(!state.on_load_complete(id, &handle, Box::new(StubSource)));

        assert!(state.documents[&id].ready);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![id]);
    }

    #[test]
    fn load_for_replaced_handle_is_ignored() {
        let id = DocumentId::new(3);
        let (mut state, _handle) = state_with_entry(id);
        let stale = Arc::new(DecoderHandle::new(PathBuf::from("a.pdf")));

        assert!(!state.on_load_complete(id, &stale, Box::new(StubSource)));
        assert!(!state.documents[&id].ready);
        assert!(stale.source().is_none());
    }

    #[test]
    fn load_for_closed_document_is_ignored() {
        let id = DocumentId::new(1);
        let (mut state, handle) = state_with_entry(id);
        state.documents.remove(&id);
        handle.mark_closed();

        assert!(!state.on_load_complete(id, &handle, Box::new(StubSource)));
        assert!(handle.source().is_none());
    }

    #[test]
    fn dead_subscribers_are_pruned_on_broadcast() {
        let id = DocumentId::new(0);
        let (mut state, handle) = state_with_entry(id);
        let (live_tx, live_rx) = flume::unbounded();
        let (dead_tx, dead_rx) = flume::unbounded::<DocumentId>();
        drop(dead_rx);
        state.subscribers.push(dead_tx);
        state.subscribers.push(live_tx);

        assert!(state.on_load_complete(id, &handle, Box::new(StubSource)));
        assert_eq!(state.subscribers.len(), 1);
        assert_eq!(live_rx.try_recv().unwrap(), id);
    }

    #[test]
    fn exhausted_ids_are_never_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last.pdf");
        std::fs::write(&path, b"%PDF-1.4\n").unwrap();
        let uri = path.to_string_lossy();

        let executor = RenderExecutor::new(1).unwrap();
        let registry = DocumentRegistry::new(Arc::new(StubBackend), executor.queue()).unwrap();
        registry.write().next_id = u32::MAX - 1;

        assert_eq!(registry.open(&uri).unwrap(), DocumentId::new(u32::MAX - 1));
        assert!(matches!(registry.open(&uri), Err(OpenError::IdsExhausted)));
        assert_eq!(registry.open_raw(&uri), -1);
        assert_eq!(registry.document_count(), 1);
    }

    #[test]
    fn file_names_come_from_the_last_component() {
        assert_eq!(display_file_name(Path::new("/tmp/docs/sample.pdf")), "sample.pdf");
        assert_eq!(display_file_name(Path::new("/")), "");
    }
}
