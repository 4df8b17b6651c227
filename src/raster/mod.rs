//! Page rasterization infrastructure

mod cache;
mod request;
mod service;
mod surface;
mod worker;

pub use cache::{RasterCache, RasterKey, DEFAULT_CACHE_CAPACITY};
pub use request::{RasterRequest, RasterResponse, RequestId};
pub use service::{RenderConfig, RenderEvent, RenderOutcome, RenderService};
pub use surface::{SurfaceId, SurfaceTable};

use std::sync::Arc;

/// Errors from the rasterization collaborator.
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("document unreadable: {0}")]
    Unreadable(String),

    #[error("page {0} out of range")]
    PageOutOfRange(usize),

    #[error("surface not registered")]
    UnknownSurface,

    #[error("rasterizer: {0}")]
    Backend(String),
}

/// Options passed to the rasterizer when loading a document.
///
/// Scripts stay disabled and auxiliary resources are not prefetched unless
/// a caller opts in; the viewer treats documents as untrusted input.
#[derive(Clone, Copy, Debug)]
pub struct LoadOptions {
    pub enable_scripts: bool,
    pub prefetch_resources: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            enable_scripts: false,
            prefetch_resources: false,
        }
    }
}

/// Natural page size in CSS pixels at scale 1.0
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

/// Owned RGBA bitmap (4 bytes per pixel)
#[derive(Clone)]
pub struct Bitmap {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Bitmap {
    /// Create a bitmap filled with a single color
    #[must_use]
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            pixels.extend_from_slice(&rgba);
        }
        Self {
            pixels,
            width,
            height,
        }
    }

    /// Create a fully transparent bitmap
    #[must_use]
    pub fn blank(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0, 0, 0, 0])
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Loads documents into rasterizable handles.
///
/// This is the narrow boundary to the external rendering engine; the core
/// never depends on anything beyond these capabilities.
pub trait Rasterizer: Send + Sync {
    fn load(
        &self,
        bytes: Arc<[u8]>,
        options: &LoadOptions,
    ) -> Result<Box<dyn DocumentHandle>, RasterError>;
}

/// One loaded document inside the rasterizer.
pub trait DocumentHandle: Send {
    fn page_count(&self) -> usize;

    /// Natural page size at scale 1.0, in CSS pixels
    fn page_size(&self, page: usize) -> Result<PageSize, RasterError>;

    /// Rasterize a page into an RGBA bitmap of exactly the given pixel size
    fn render_page(&self, page: usize, width_px: u32, height_px: u32)
        -> Result<Bitmap, RasterError>;
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    //! In-memory rasterizer for tests

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::{Bitmap, DocumentHandle, LoadOptions, PageSize, RasterError, Rasterizer};

    /// Rasterizer fake: fixed page list, solid-color renders, call counting.
    pub struct FakeRasterizer {
        pages: Vec<PageSize>,
        render_calls: Arc<AtomicUsize>,
        render_delay: Option<Duration>,
        fail_load: bool,
    }

    impl FakeRasterizer {
        #[must_use]
        pub fn with_pages(count: usize, width: f32, height: f32) -> Self {
            Self {
                pages: vec![PageSize { width, height }; count],
                render_calls: Arc::new(AtomicUsize::new(0)),
                render_delay: None,
                fail_load: false,
            }
        }

        /// Make every render sleep, so tests can pile up concurrent requests
        #[must_use]
        pub fn with_render_delay(mut self, delay: Duration) -> Self {
            self.render_delay = Some(delay);
            self
        }

        #[must_use]
        pub fn failing_load() -> Self {
            Self {
                pages: vec![],
                render_calls: Arc::new(AtomicUsize::new(0)),
                render_delay: None,
                fail_load: true,
            }
        }

        /// Shared counter of `render_page` invocations across all handles
        #[must_use]
        pub fn render_calls(&self) -> Arc<AtomicUsize> {
            self.render_calls.clone()
        }

        /// Solid fill color a fake render uses for a page
        #[must_use]
        pub fn page_color(page: usize) -> [u8; 4] {
            [(page as u8).wrapping_mul(40), 0, 255, 255]
        }
    }

    impl Rasterizer for FakeRasterizer {
        fn load(
            &self,
            _bytes: Arc<[u8]>,
            _options: &LoadOptions,
        ) -> Result<Box<dyn DocumentHandle>, RasterError> {
            if self.fail_load {
                return Err(RasterError::Unreadable("fake load failure".into()));
            }
            Ok(Box::new(FakeHandle {
                pages: self.pages.clone(),
                render_calls: self.render_calls.clone(),
                render_delay: self.render_delay,
            }))
        }
    }

    struct FakeHandle {
        pages: Vec<PageSize>,
        render_calls: Arc<AtomicUsize>,
        render_delay: Option<Duration>,
    }

    impl DocumentHandle for FakeHandle {
        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn page_size(&self, page: usize) -> Result<PageSize, RasterError> {
            self.pages
                .get(page)
                .copied()
                .ok_or(RasterError::PageOutOfRange(page))
        }

        fn render_page(
            &self,
            page: usize,
            width_px: u32,
            height_px: u32,
        ) -> Result<Bitmap, RasterError> {
            if page >= self.pages.len() {
                return Err(RasterError::PageOutOfRange(page));
            }
            if let Some(delay) = self.render_delay {
                std::thread::sleep(delay);
            }
            self.render_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Bitmap::filled(
                width_px,
                height_px,
                FakeRasterizer::page_color(page),
            ))
        }
    }
}
