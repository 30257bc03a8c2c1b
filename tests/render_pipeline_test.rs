use std::time::Duration;

use image::Rgba;
use pdfpages::pdf::{DocumentId, GeometryError, PageBroker, RenderFault, Size};
use pdfpages::test_utils::{Gate, MockBackend, broker, gradient, sample_file, wait_ready};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Open a sample file and wait for it to load
fn open_ready(broker: &PageBroker, dir: &tempfile::TempDir) -> DocumentId {
    let path = sample_file(dir.path(), "sample.pdf");
    let id = broker.registry().open(&path.to_string_lossy()).unwrap();
    assert!(wait_ready(broker.registry(), id, TIMEOUT), "document should load");
    id
}

/// Margins widen the raster, then the crop keeps the requested width
#[test]
fn test_cropped_render_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MockBackend::new(3);
    let broker = broker(&backend, 2);
    let id = open_ready(&broker, &dir);

    let bitmap = broker
        .gateway()
        .request_render(&format!("{id}/1/(0.1,0.0,0.1,0.0)"), Size::new(800, 600))
        .wait()
        .unwrap();

    // Oversized raster is 1000x750; the crop starts at (100, 0)
    assert_eq!(bitmap.dimensions(), (800, 750));
    assert_eq!(bitmap.get_pixel(0, 0), &Rgba([100, 0, 1, 255]));
    assert_eq!(bitmap.get_pixel(799, 749), &Rgba([(899 % 256) as u8, (749 % 256) as u8, 1, 255]));
    assert_eq!(backend.render_calls(), 1);
}

/// Without margins the raster is returned exactly as rendered
#[test]
fn test_full_page_render_matches_requested_size() {
    let dir = tempfile::tempdir().unwrap();
    let broker = broker(&MockBackend::new(1), 1);
    let id = open_ready(&broker, &dir);

    let size = Size::new(300, 200);
    let bitmap = broker
        .gateway()
        .request_render(&format!("{id}/0"), size)
        .wait()
        .unwrap();

    assert_eq!(bitmap, gradient(0, size));
}

/// A margins token that does not hold four values means "no margins"
#[test]
fn test_malformed_margins_render_full_page() {
    let dir = tempfile::tempdir().unwrap();
    let broker = broker(&MockBackend::new(1), 1);
    let id = open_ready(&broker, &dir);

    let bitmap = broker
        .gateway()
        .request_render(&format!("{id}/0/(0.1,0.1)"), Size::new(120, 90))
        .wait()
        .unwrap();

    assert_eq!(bitmap.dimensions(), (120, 90));
}

/// Keys that do not address a page never reach the decoder
#[test]
fn test_invalid_keys_resolve_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MockBackend::new(1);
    let broker = broker(&backend, 1);
    let _id = open_ready(&broker, &dir);

    for key in ["", "garbage", "0", "-1/0", "0/-1", "a/b", "0/x/(0,0,0,0)"] {
        let handle = broker.gateway().request_render(key, Size::new(10, 10));
        assert!(
            matches!(handle.try_take(), Some(Err(RenderFault::InvalidKey))),
            "key {key:?} should be rejected up front"
        );
    }
    assert_eq!(backend.render_calls(), 0);
}

/// Unknown ids, documents still loading and pages past the end all yield
/// empty results
#[test]
fn test_unaddressable_pages_fail_fast() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Gate::new();
    let backend = MockBackend::new(2).load_gate(gate.clone());
    let broker = broker(&backend, 2);
    let gateway = broker.gateway();

    let path = sample_file(dir.path(), "slow.pdf");
    let id = broker.registry().open(&path.to_string_lossy()).unwrap();
    assert!(gate.wait_started(TIMEOUT));

    let not_ready = gateway.request_render(&format!("{id}/0"), Size::new(10, 10)).wait();
    assert!(matches!(not_ready, Err(RenderFault::NotReady(d)) if d == id));

    gate.release();
    assert!(wait_ready(broker.registry(), id, TIMEOUT));

    let unknown = gateway.request_render("7/0", Size::new(10, 10)).wait();
    assert!(matches!(unknown, Err(RenderFault::UnknownDocument(d)) if d == DocumentId::new(7)));

    let out_of_range = gateway.request_render(&format!("{id}/5"), Size::new(10, 10)).wait();
    assert!(matches!(
        out_of_range,
        Err(RenderFault::PageOutOfRange {
            page: 5,
            page_count: 2
        })
    ));
    assert_eq!(backend.render_calls(), 0);
}

/// Identical requests are not coalesced: each one decodes on its own
#[test]
fn test_concurrent_identical_renders_run_independently() {
    const N: usize = 8;
    let dir = tempfile::tempdir().unwrap();
    let backend = MockBackend::new(1);
    let broker = broker(&backend, 4);
    let id = open_ready(&broker, &dir);

    let key = format!("{id}/0/(0.05,0.1,0.05,0.1)");
    let handles: Vec<_> = (0..N)
        .map(|_| broker.gateway().request_render(&key, Size::new(64, 48)))
        .collect();

    let mut ids: Vec<_> = handles.iter().map(|h| h.request_id()).collect();
    ids.sort_by_key(|id| id.0);
    ids.dedup();
    assert_eq!(ids.len(), N, "every submission gets its own request id");

    let bitmaps: Vec<_> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
    assert!(bitmaps.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(backend.render_calls(), N);
}

/// Closing a document mid-render drops the result and forgets the id at once
#[test]
fn test_close_during_render_resolves_closed() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Gate::new();
    let backend = MockBackend::new(1).render_gate(gate.clone());
    let broker = broker(&backend, 1);
    let id = open_ready(&broker, &dir);

    let handle = broker
        .gateway()
        .request_render(&format!("{id}/0"), Size::new(50, 50));
    assert!(gate.wait_started(TIMEOUT), "render should reach the decoder");

    broker.registry().close(id);
    assert!(!broker.registry().contains(id));
    assert_eq!(broker.registry().page_count(id), 0);

    gate.release();
    assert!(matches!(handle.wait(), Err(RenderFault::Closed(d)) if d == id));
}

/// Decode failures are delivered once and do not affect later requests
#[test]
fn test_decode_failure_is_reported_without_retry() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MockBackend::new(2).failing_page(1);
    let broker = broker(&backend, 1);
    let id = open_ready(&broker, &dir);

    let failed = broker
        .gateway()
        .request_render(&format!("{id}/1"), Size::new(40, 30))
        .wait();
    assert!(matches!(failed, Err(RenderFault::Decode(_))));
    assert_eq!(backend.render_calls(), 1, "no retry after a decode failure");

    let ok = broker
        .gateway()
        .request_render(&format!("{id}/0"), Size::new(40, 30))
        .wait();
    assert!(ok.is_ok());
}

/// Impossible geometry is rejected before any decoding work
#[test]
fn test_degenerate_geometry_skips_decode() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MockBackend::new(1);
    let broker = broker(&backend, 1);
    let id = open_ready(&broker, &dir);
    let gateway = broker.gateway();

    let overlap = gateway
        .request_render(&format!("{id}/0/(0.6,0,0.5,0)"), Size::new(100, 100))
        .wait();
    assert!(matches!(
        overlap,
        Err(RenderFault::Geometry(GeometryError::HorizontalOverlap { .. }))
    ));

    let empty = gateway.request_render(&format!("{id}/0"), Size::new(0, 100)).wait();
    assert!(matches!(
        empty,
        Err(RenderFault::Geometry(GeometryError::EmptySize(_)))
    ));

    let huge = gateway
        .request_render(&format!("{id}/0/(0.45,0,0.45,0)"), Size::new(30_000, 10))
        .wait();
    assert!(matches!(
        huge,
        Err(RenderFault::Geometry(GeometryError::TooLarge { .. }))
    ));

    assert_eq!(backend.render_calls(), 0);
}

/// Work queued before shutdown still runs; later submissions are refused
#[test]
fn test_shutdown_drains_queued_work() {
    let dir = tempfile::tempdir().unwrap();
    let broker = broker(&MockBackend::new(1), 2);
    let id = open_ready(&broker, &dir);

    let queued = broker
        .gateway()
        .request_render(&format!("{id}/0"), Size::new(20, 20));
    broker.shutdown();
    let refused = broker
        .gateway()
        .request_render(&format!("{id}/0"), Size::new(20, 20));

    assert!(matches!(refused.try_take(), Some(Err(RenderFault::ExecutorStopped))));
    assert_eq!(queued.wait().unwrap().dimensions(), (20, 20));
}

/// Handles outlive the broker that produced them
#[test]
fn test_pending_handle_resolves_after_broker_drop() {
    let dir = tempfile::tempdir().unwrap();
    let broker = broker(&MockBackend::new(1), 1);
    let id = open_ready(&broker, &dir);

    let handle = broker
        .gateway()
        .request_render(&format!("{id}/0"), Size::new(16, 16));
    drop(broker);

    assert!(handle.wait().is_ok());
}
