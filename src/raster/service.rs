//! Render service - surfaces, cache, coalescing and worker fan-out

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use flume::{Receiver, Sender};
use image::RgbaImage;
use log::{debug, warn};

use crate::images;
use crate::session::PageGeometry;
use crate::stamps::Stamp;

use super::cache::{RasterCache, RasterKey, DEFAULT_CACHE_CAPACITY};
use super::request::{RasterRequest, RasterResponse, RequestId};
use super::surface::{SurfaceId, SurfaceTable};
use super::worker::raster_worker;
use super::{Bitmap, LoadOptions, RasterError, Rasterizer};

/// Default number of raster worker threads
pub const DEFAULT_WORKERS: usize = 2;

/// Render pipeline configuration
#[derive(Clone, Copy, Debug)]
pub struct RenderConfig {
    pub workers: usize,
    pub cache_capacity: usize,
    /// Device pixels per CSS pixel of the output display
    pub device_pixel_ratio: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            device_pixel_ratio: 1.0,
        }
    }
}

/// Immediate result of a render request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Cache hit: composited and committed synchronously
    Committed,
    /// Raster in flight; the commit happens during a later poll
    Pending,
}

/// Completion notifications drained via `poll`
#[derive(Debug)]
pub enum RenderEvent {
    /// A composited page landed on a surface
    Committed { surface: SurfaceId, page: usize },
    /// Rasterization of a page failed
    Failed { page: usize, error: RasterError },
    /// A worker exited without serving requests
    WorkerLost { error: RasterError },
}

/// A render waiting on an in-flight raster for its key
struct Waiter {
    surface: SurfaceId,
    seq: u64,
    stamps: Vec<Stamp>,
}

/// Manages page rendering for one loaded document: worker threads, the
/// bitmap cache, request coalescing and per-surface commit sequencing.
pub struct RenderService {
    request_tx: Sender<RasterRequest>,
    response_rx: Receiver<RasterResponse>,
    next_request_id: u64,
    cache: RasterCache,
    /// Waiters per in-flight key; presence of a key means a raster request
    /// for it has been issued and not yet answered (request coalescing).
    waiters: HashMap<RasterKey, Vec<Waiter>>,
    surfaces: SurfaceTable,
    device_pixel_ratio: f32,
    num_workers: usize,
}

impl RenderService {
    /// Spawn workers over the document bytes and return the service.
    pub fn new(
        rasterizer: Arc<dyn Rasterizer>,
        bytes: Arc<[u8]>,
        options: LoadOptions,
        config: &RenderConfig,
    ) -> Self {
        // Flume gives us MPMC channels: multiple workers pull from one
        // shared request queue, which mpsc receivers cannot do.
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();

        let num_workers = config.workers.max(1);
        for _ in 0..num_workers {
            let rasterizer = rasterizer.clone();
            let bytes = bytes.clone();
            let rx = request_rx.clone();
            let tx = response_tx.clone();

            std::thread::spawn(move || {
                raster_worker(&rasterizer, bytes, options, &rx, &tx);
            });
        }

        Self {
            request_tx,
            response_rx,
            next_request_id: 1,
            cache: RasterCache::new(config.cache_capacity),
            waiters: HashMap::new(),
            surfaces: SurfaceTable::new(),
            device_pixel_ratio: config.device_pixel_ratio.max(0.1),
            num_workers,
        }
    }

    /// Register an output surface sized in device pixels
    pub fn register_surface(&mut self, width: u32, height: u32) -> SurfaceId {
        self.surfaces.register(width, height)
    }

    pub fn unregister_surface(&mut self, id: SurfaceId) {
        self.surfaces.unregister(id);
    }

    #[must_use]
    pub fn surface_content(&self, id: SurfaceId) -> Option<&Bitmap> {
        self.surfaces.content(id)
    }

    /// Copy one surface's content onto another in a single blit
    pub fn transfer_surface(&mut self, src: SurfaceId, dst: SurfaceId) -> bool {
        self.surfaces.transfer(src, dst)
    }

    /// Render a page, composited with its stamps, onto a surface.
    ///
    /// Claims the surface's next sequence number up front; the finished
    /// buffer only commits if no later render for the same surface started
    /// in the meantime. A cache hit composites and commits synchronously,
    /// otherwise the request joins any in-flight raster for the same key.
    pub fn render_page_to(
        &mut self,
        surface: SurfaceId,
        page: usize,
        geometry: &PageGeometry,
        stamps: &[Stamp],
    ) -> Result<RenderOutcome, RasterError> {
        let seq = self
            .surfaces
            .begin(surface)
            .ok_or(RasterError::UnknownSurface)?;

        let key = RasterKey::new(
            page,
            geometry.width_px,
            geometry.height_px,
            geometry.scale,
            self.device_pixel_ratio,
        );

        let page_stamps: Vec<Stamp> = stamps
            .iter()
            .filter(|s| s.page_index == page)
            .cloned()
            .collect();

        if let Some(bitmap) = self.cache.get(&key) {
            let composed = self.compose(&bitmap, &page_stamps);
            self.surfaces.commit(surface, seq, composed);
            return Ok(RenderOutcome::Committed);
        }

        let in_flight = self.waiters.contains_key(&key);
        self.waiters.entry(key).or_default().push(Waiter {
            surface,
            seq,
            stamps: page_stamps,
        });

        if !in_flight {
            let id = self.next_id();
            let _ = self.request_tx.send(RasterRequest::Page { id, key });
        }

        Ok(RenderOutcome::Pending)
    }

    /// Drain completed raster responses, committing results whose sequence
    /// numbers are still current. Superseded work is dropped silently.
    pub fn poll(&mut self) -> Vec<RenderEvent> {
        let mut events = Vec::new();
        while let Ok(response) = self.response_rx.try_recv() {
            self.handle_response(response, &mut events);
        }
        events
    }

    /// Like `poll`, but waits up to `timeout` for the first response
    pub fn poll_blocking(&mut self, timeout: Duration) -> Vec<RenderEvent> {
        let mut events = Vec::new();
        if let Ok(response) = self.response_rx.recv_timeout(timeout) {
            self.handle_response(response, &mut events);
        }
        while let Ok(response) = self.response_rx.try_recv() {
            self.handle_response(response, &mut events);
        }
        events
    }

    fn handle_response(&mut self, response: RasterResponse, events: &mut Vec<RenderEvent>) {
        match response {
            RasterResponse::Page { key, bitmap, .. } => {
                self.cache.insert(key, bitmap.clone());

                for waiter in self.waiters.remove(&key).unwrap_or_default() {
                    if self.surfaces.current_seq(waiter.surface) != Some(waiter.seq) {
                        debug!("render for page {} superseded, discarding", key.page);
                        continue;
                    }
                    let composed = self.compose(&bitmap, &waiter.stamps);
                    if self.surfaces.commit(waiter.surface, waiter.seq, composed) {
                        events.push(RenderEvent::Committed {
                            surface: waiter.surface,
                            page: key.page,
                        });
                    }
                }
            }

            RasterResponse::Error { key, error, .. } => {
                self.waiters.remove(&key);
                warn!("rasterizing page {} failed: {error}", key.page);
                events.push(RenderEvent::Failed {
                    page: key.page,
                    error,
                });
            }

            RasterResponse::Fatal { error } => {
                events.push(RenderEvent::WorkerLost { error });
            }
        }
    }

    /// Whether any raster request is still unanswered
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.waiters.is_empty()
    }

    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Composite stamps over a page bitmap into a fresh off-surface buffer.
    ///
    /// A stamp whose image fails to decode is skipped; the page render
    /// itself and the remaining stamps still go through.
    fn compose(&self, page_bitmap: &Bitmap, stamps: &[Stamp]) -> Bitmap {
        let Some(mut base) = RgbaImage::from_raw(
            page_bitmap.width,
            page_bitmap.height,
            page_bitmap.pixels.clone(),
        ) else {
            warn!("page bitmap has inconsistent dimensions, compositing skipped");
            return page_bitmap.clone();
        };

        let dpr = self.device_pixel_ratio;
        for stamp in stamps {
            let overlay = match images::decode_rgba(&stamp.image_bytes) {
                Ok(img) => img,
                Err(err) => {
                    warn!("stamp {} image undecodable, skipped: {err}", stamp.id);
                    continue;
                }
            };

            let w = (stamp.w * dpr).round().max(1.0) as u32;
            let h = (stamp.h * dpr).round().max(1.0) as u32;
            let scaled =
                image::imageops::resize(&overlay, w, h, image::imageops::FilterType::Triangle);
            image::imageops::overlay(
                &mut base,
                &scaled,
                (stamp.x * dpr).round() as i64,
                (stamp.y * dpr).round() as i64,
            );
        }

        let (width, height) = base.dimensions();
        Bitmap {
            pixels: base.into_raw(),
            width,
            height,
        }
    }

    /// Request shutdown of all workers
    pub fn shutdown(&self) {
        for _ in 0..self.num_workers {
            let _ = self.request_tx.send(RasterRequest::Shutdown);
        }
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

impl Drop for RenderService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
