//! Render worker - runs in separate thread(s)

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use flume::{Receiver, Sender};
use image::imageops;
use log::{debug, error, warn};

use super::backend::{DecodeError, DecoderHandle, DocumentBackend, PageSource};
use super::geometry::{CropRect, crop_rect, croppable_size};
use super::handle::{RenderFault, RenderResult, ReplySlot};
use super::registry::DocumentRegistry;
use super::request::RenderRequest;
use super::types::{Bitmap, DocumentId};

/// Unit of work pulled from the shared queue
pub(crate) enum Job {
    /// Parse a freshly opened document
    Load(LoadJob),

    /// Render one page
    Render(RenderTask),

    /// Stop the worker that receives it
    Shutdown,
}

pub(crate) struct LoadJob {
    pub id: DocumentId,
    pub handle: Arc<DecoderHandle>,
    pub backend: Arc<dyn DocumentBackend>,
    pub done: Sender<LoadEvent>,
}

/// Load completion message for the registry event loop
pub(crate) struct LoadEvent {
    pub id: DocumentId,
    pub handle: Arc<DecoderHandle>,
    pub outcome: Result<Box<dyn PageSource>, DecodeError>,
}

pub(crate) struct RenderTask {
    pub request: RenderRequest,
    pub registry: Arc<DocumentRegistry>,
    pub reply: ReplySlot,
}

/// Main worker function - runs in a dedicated thread
pub(crate) fn render_worker(worker: usize, jobs: Receiver<Job>) {
    debug!("Render worker {worker} started");

    for job in jobs {
        let job = match job {
            Job::Shutdown => break,
            other => other,
        };

        // A panicking decoder must not take the worker down with it; the
        // unwound reply slot resolves its handle as abandoned.
        if catch_unwind(AssertUnwindSafe(|| run_job(job))).is_err() {
            error!("Render worker {worker} recovered from a panicking job");
        }
    }

    debug!("Render worker {worker} stopped");
}

fn run_job(job: Job) {
    match job {
        Job::Load(load) => run_load(load),
        Job::Render(task) => run_render(task),
        Job::Shutdown => {}
    }
}

fn run_load(job: LoadJob) {
    let LoadJob {
        id,
        handle,
        backend,
        done,
    } = job;

    if handle.is_closed() {
        debug!("Document {id} closed before its load started");
        return;
    }

    let outcome = backend.load(handle.path());
    let _ = done.send(LoadEvent {
        id,
        handle,
        outcome,
    });
}

fn run_render(task: RenderTask) {
    let RenderTask {
        request,
        registry,
        reply,
    } = task;
    let id = reply.request_id();

    let result = render_request(&registry, &request);
    match &result {
        Ok(bitmap) => debug!(
            "Render {id} of {}/{} done: {}x{}",
            request.document_id,
            request.page,
            bitmap.width(),
            bitmap.height()
        ),
        Err(RenderFault::Decode(e)) => warn!(
            "Render {id} of {}/{} failed to decode: {e}",
            request.document_id, request.page
        ),
        Err(e) => debug!(
            "Render {id} of {}/{} yields nothing: {e}",
            request.document_id, request.page
        ),
    }

    reply.resolve(result);
}

/// Render a request against the registry's current state
pub(crate) fn render_request(registry: &DocumentRegistry, request: &RenderRequest) -> RenderResult {
    let document_id = request.document_id;
    let handle = registry.decoder_for_render(document_id)?;
    let source = handle
        .source()
        .ok_or(RenderFault::NotReady(document_id))?;

    let page_count = source.page_count();
    if request.page >= page_count {
        return Err(RenderFault::PageOutOfRange {
            page: request.page,
            page_count,
        });
    }

    let oversized = croppable_size(request.size, &request.margins)?;

    if handle.is_closed() {
        return Err(RenderFault::Closed(document_id));
    }
    let raster = source.render(request.page, oversized)?;
    if handle.is_closed() {
        return Err(RenderFault::Closed(document_id));
    }

    if request.margins.is_null() {
        return Ok(raster);
    }

    let rect = crop_rect(request.size, oversized, raster.height(), &request.margins);
    Ok(copy_rect(&raster, rect))
}

/// Copy `rect` out of `raster`. The result always has the rectangle's
/// size; whatever falls outside the raster stays transparent.
pub(crate) fn copy_rect(raster: &Bitmap, rect: CropRect) -> Bitmap {
    let visible = imageops::crop_imm(raster, rect.x, rect.y, rect.width, rect.height).to_image();
    if visible.dimensions() == (rect.width, rect.height) {
        return visible;
    }

    let mut out = Bitmap::new(rect.width, rect.height);
    imageops::replace(&mut out, &visible, 0, 0);
    out
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    fn gradient(width: u32, height: u32) -> Bitmap {
        Bitmap::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 0, 255]))
    }

    #[test]
    fn copy_inside_raster_keeps_pixels() {
        let raster = gradient(100, 80);
        let out = copy_rect(
            &raster,
            CropRect {
                x: 10,
                y: 5,
                width: 50,
                height: 40,
            },
        );

        assert_eq!(out.dimensions(), (50, 40));
        assert_eq!(out.get_pixel(0, 0), &Rgba([10, 5, 0, 255]));
        assert_eq!(out.get_pixel(49, 39), &Rgba([59, 44, 0, 255]));
    }

    #[test]
    fn copy_past_the_edge_pads_with_transparency() {
        let raster = gradient(20, 20);
        let out = copy_rect(
            &raster,
            CropRect {
                x: 15,
                y: 15,
                width: 10,
                height: 10,
            },
        );

        assert_eq!(out.dimensions(), (10, 10));
        assert_eq!(out.get_pixel(4, 4), &Rgba([19, 19, 0, 255]));
        assert_eq!(out.get_pixel(5, 5), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn copy_fully_outside_is_blank() {
        let raster = gradient(20, 20);
        let out = copy_rect(
            &raster,
            CropRect {
                x: 30,
                y: 0,
                width: 5,
                height: 5,
            },
        );

        assert_eq!(out.dimensions(), (5, 5));
        assert!(out.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }
}
