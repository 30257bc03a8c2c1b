//! Test doubles for the render pipeline
//!
//! [`MockBackend`] stands in for MuPDF: it "parses" any existing file into a
//! configurable set of pages and renders deterministic gradients. Gates let
//! a test hold a load or render at a known point to exercise lifecycle
//! races without sleeps.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use flume::{Receiver, Sender};
use image::Rgba;

use crate::pdf::{
    Bitmap, DecodeError, DocumentBackend, DocumentId, DocumentRegistry, MetadataField, PageBroker,
    PageSize, PageSource, Size,
};

/// US Letter in points
pub const LETTER: PageSize = PageSize::new(612.0, 792.0);

/// Pauses a mocked operation until the test releases it
#[derive(Clone)]
pub struct Gate {
    started_tx: Sender<()>,
    started_rx: Receiver<()>,
    release_tx: Sender<()>,
    release_rx: Receiver<()>,
}

impl Gate {
    pub fn new() -> Self {
        let (started_tx, started_rx) = flume::unbounded();
        let (release_tx, release_rx) = flume::unbounded();
        Self {
            started_tx,
            started_rx,
            release_tx,
            release_rx,
        }
    }

    /// Called by the mocked operation: announce arrival, then block
    fn pass(&self) {
        let _ = self.started_tx.send(());
        let _ = self.release_rx.recv();
    }

    /// Wait until one gated operation has arrived
    pub fn wait_started(&self, timeout: Duration) -> bool {
        self.started_rx.recv_timeout(timeout).is_ok()
    }

    /// Let one gated operation continue
    pub fn release(&self) {
        let _ = self.release_tx.send(());
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

/// Scriptable [`DocumentBackend`]
#[derive(Clone, Default)]
pub struct MockBackend {
    pages: Vec<PageSize>,
    metadata: HashMap<MetadataField, String>,
    fail_load: bool,
    failing_pages: HashSet<usize>,
    render_calls: Arc<AtomicUsize>,
    load_gate: Option<Gate>,
    render_gate: Option<Gate>,
}

impl MockBackend {
    /// Backend whose documents have `page_count` letter-sized pages
    pub fn new(page_count: usize) -> Self {
        Self::with_pages(vec![LETTER; page_count])
    }

    pub fn with_pages(pages: Vec<PageSize>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    pub fn metadata(mut self, field: MetadataField, value: &str) -> Self {
        self.metadata.insert(field, value.to_string());
        self
    }

    /// Every load fails with a decode error
    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// Rendering `page` fails with a decode error
    pub fn failing_page(mut self, page: usize) -> Self {
        self.failing_pages.insert(page);
        self
    }

    pub fn load_gate(mut self, gate: Gate) -> Self {
        self.load_gate = Some(gate);
        self
    }

    pub fn render_gate(mut self, gate: Gate) -> Self {
        self.render_gate = Some(gate);
        self
    }

    /// Number of render calls that reached the backend so far
    pub fn render_calls(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }
}

impl DocumentBackend for MockBackend {
    fn load(&self, path: &Path) -> Result<Box<dyn PageSource>, DecodeError> {
        if let Some(gate) = &self.load_gate {
            gate.pass();
        }
        if self.fail_load {
            return Err(DecodeError::generic(format!(
                "mock refuses to load {}",
                path.display()
            )));
        }

        let bytes_count = std::fs::metadata(path)?.len();
        Ok(Box::new(MockSource {
            pages: self.pages.clone(),
            metadata: self.metadata.clone(),
            bytes_count,
            failing_pages: self.failing_pages.clone(),
            render_calls: Arc::clone(&self.render_calls),
            render_gate: self.render_gate.clone(),
        }))
    }
}

struct MockSource {
    pages: Vec<PageSize>,
    metadata: HashMap<MetadataField, String>,
    bytes_count: u64,
    failing_pages: HashSet<usize>,
    render_calls: Arc<AtomicUsize>,
    render_gate: Option<Gate>,
}

impl PageSource for MockSource {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_size(&self, page: usize) -> Option<PageSize> {
        self.pages.get(page).copied()
    }

    fn bytes_count(&self) -> u64 {
        self.bytes_count
    }

    fn metadata_field(&self, field: MetadataField) -> String {
        self.metadata.get(&field).cloned().unwrap_or_default()
    }

    fn render(&self, page: usize, size: Size) -> Result<Bitmap, DecodeError> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.render_gate {
            gate.pass();
        }
        if self.failing_pages.contains(&page) {
            return Err(DecodeError::generic(format!("mock cannot render page {page}")));
        }
        Ok(gradient(page, size))
    }
}

/// Pixels the mock renders: red and green follow x and y, blue is the page
pub fn gradient(page: usize, size: Size) -> Bitmap {
    Bitmap::from_fn(size.width, size.height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, (page % 256) as u8, 255])
    })
}

/// Write a small placeholder document to `dir`
pub fn sample_file(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"%PDF-1.4\n%mock document\n%%EOF\n").expect("write sample file");
    path
}

pub fn broker(backend: &MockBackend, workers: usize) -> PageBroker {
    PageBroker::new(Arc::new(backend.clone()), workers).expect("start broker")
}

/// Poll until `id` is ready or `timeout` passes
pub fn wait_ready(registry: &DocumentRegistry, id: DocumentId, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if registry.is_ready(id) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    registry.is_ready(id)
}
