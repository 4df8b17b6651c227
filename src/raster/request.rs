//! Raster request and response types

use std::sync::Arc;

use super::cache::RasterKey;
use super::{Bitmap, RasterError};

/// Unique identifier for raster requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Request sent to raster workers
#[derive(Debug)]
pub enum RasterRequest {
    /// Rasterize one page at the key's pixel geometry
    Page { id: RequestId, key: RasterKey },

    /// Shutdown the worker
    Shutdown,
}

/// Response from raster workers
#[derive(Debug)]
pub enum RasterResponse {
    /// Rasterized page bitmap
    Page {
        id: RequestId,
        key: RasterKey,
        bitmap: Arc<Bitmap>,
    },

    /// Error while rasterizing one page
    Error {
        id: RequestId,
        key: RasterKey,
        error: RasterError,
    },

    /// The worker could not obtain a document handle and exited
    Fatal { error: RasterError },
}
