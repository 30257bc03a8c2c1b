//! PDF rendering infrastructure

mod backend;
mod broker;
mod gateway;
mod geometry;
mod handle;
#[cfg(feature = "pdf")]
mod mupdf_backend;
pub mod parsing;
mod registry;
mod request;
mod service;
mod types;
mod worker;

pub use backend::{DecodeError, DecoderHandle, DocumentBackend, PageSource};
pub use broker::PageBroker;
pub use gateway::RenderGateway;
pub use geometry::{
    CropRect, GeometryError, MAX_RASTER_DIMENSION, Margins, Size, crop_rect, croppable_size,
};
pub use handle::{RenderFault, RenderHandle, RenderResult, ReplySlot};
#[cfg(feature = "pdf")]
pub use mupdf_backend::MupdfBackend;
pub use registry::{DocumentRegistry, OpenError};
pub use request::{INVALID_FIELD, RenderRequest, RequestId, RequestKey};
pub use service::{JobQueue, RenderExecutor, default_worker_count};
pub use types::*;
