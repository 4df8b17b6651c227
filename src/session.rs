//! Document session lifecycle and page geometry

use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::export::{self, StampEmbedder};
use crate::raster::{
    Bitmap, LoadOptions, PageSize, RasterError, Rasterizer, RenderConfig, RenderEvent,
    RenderOutcome, RenderService, SurfaceId,
};
use crate::stamps::Stamp;

/// Zoom bounds shared by every page of a session
pub const MIN_ZOOM: f32 = 0.5;
pub const MAX_ZOOM: f32 = 2.0;

/// Per-page display geometry at the session's current zoom
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    /// Page width in CSS pixels at the current zoom
    pub width_px: f32,
    /// Page height in CSS pixels at the current zoom
    pub height_px: f32,
    /// CSS pixels per document unit (equals the zoom factor)
    pub scale: f32,
}

/// Clamp a requested zoom to the allowed range, rounded to two decimals so
/// repeated adjustments cannot accumulate float drift.
#[must_use]
pub fn clamp_zoom(zoom: f32) -> f32 {
    let clamped = if zoom.is_finite() {
        zoom.clamp(MIN_ZOOM, MAX_ZOOM)
    } else {
        1.0
    };
    (clamped * 100.0).round() / 100.0
}

/// One open document: clean byte copy, page metadata, render service.
///
/// Opening a new document always probes the replacement first; the previous
/// session is only torn down once the probe succeeds, so a failed open
/// leaves every field untouched. The render worker pool of the old session
/// is shut down before the new pool spawns.
pub struct DocumentSession {
    rasterizer: Arc<dyn Rasterizer>,
    options: LoadOptions,
    config: RenderConfig,

    raw_bytes: Option<Arc<[u8]>>,
    page_count: usize,
    /// Natural page sizes at zoom 1.0, captured once per open.
    /// Zoom changes rescale from these, never from the previous zoom's
    /// values, so rounding drift cannot accumulate.
    base_sizes: Vec<PageSize>,
    geometry: Vec<PageGeometry>,
    zoom: f32,
    generation: u64,
    service: Option<RenderService>,
}

impl DocumentSession {
    #[must_use]
    pub fn new(rasterizer: Arc<dyn Rasterizer>, config: RenderConfig) -> Self {
        Self {
            rasterizer,
            options: LoadOptions::default(),
            config,
            raw_bytes: None,
            page_count: 0,
            base_sizes: Vec::new(),
            geometry: Vec::new(),
            zoom: 1.0,
            generation: 0,
            service: None,
        }
    }

    /// Open a document from raw bytes, replacing any current session.
    ///
    /// On failure the session keeps its previous document and geometry;
    /// no partial page metadata is ever published.
    pub fn open(&mut self, bytes: Vec<u8>) -> Result<(), SessionError> {
        export::validate_pdf(&bytes).map_err(SessionError::Unreadable)?;

        let bytes: Arc<[u8]> = Arc::from(bytes.into_boxed_slice());

        // Probe the new document on the calling thread before touching any
        // session state.
        let handle = self.rasterizer.load(bytes.clone(), &self.options)?;
        let page_count = handle.page_count();
        if page_count == 0 {
            return Err(SessionError::Unreadable("document has no pages".into()));
        }
        let mut base_sizes = Vec::with_capacity(page_count);
        for page in 0..page_count {
            base_sizes.push(handle.page_size(page)?);
        }
        drop(handle);

        // Probe succeeded: tear the previous session down before the new
        // worker pool spawns.
        self.teardown();

        self.service = Some(RenderService::new(
            self.rasterizer.clone(),
            bytes.clone(),
            self.options,
            &self.config,
        ));
        self.raw_bytes = Some(bytes);
        self.page_count = page_count;
        self.base_sizes = base_sizes;
        self.rebuild_geometry();

        info!(
            "opened document: {} pages, generation {}",
            self.page_count, self.generation
        );
        Ok(())
    }

    /// Close the current document, releasing workers and cached bitmaps
    pub fn close(&mut self) {
        self.teardown();
        self.raw_bytes = None;
        self.page_count = 0;
        self.base_sizes.clear();
        self.geometry.clear();
    }

    fn teardown(&mut self) {
        if let Some(service) = self.service.take() {
            service.shutdown();
            drop(service);
        }
        // Invalidates every in-flight result belonging to the old session.
        self.generation += 1;
        debug!("session generation advanced to {}", self.generation);
    }

    /// Set the zoom factor (clamped and rounded), rescaling all page
    /// geometry linearly. Callers re-render visible pages themselves.
    /// Returns the applied zoom.
    pub fn set_zoom(&mut self, zoom: f32) -> f32 {
        let applied = clamp_zoom(zoom);
        if (applied - self.zoom).abs() > f32::EPSILON {
            self.zoom = applied;
            self.rebuild_geometry();
        }
        self.zoom
    }

    /// Adjust zoom by a delta, clamped to the allowed range
    pub fn zoom_by(&mut self, delta: f32) -> f32 {
        self.set_zoom(self.zoom + delta)
    }

    fn rebuild_geometry(&mut self) {
        let zoom = self.zoom;
        self.geometry = self
            .base_sizes
            .iter()
            .map(|size| PageGeometry {
                width_px: size.width * zoom,
                height_px: size.height * zoom,
                scale: zoom,
            })
            .collect();
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.raw_bytes.is_some()
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    #[must_use]
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Geometry of every page at the current zoom
    #[must_use]
    pub fn geometry(&self) -> &[PageGeometry] {
        &self.geometry
    }

    #[must_use]
    pub fn page_geometry(&self, page: usize) -> Option<PageGeometry> {
        self.geometry.get(page).copied()
    }

    /// The clean byte copy retained for export
    #[must_use]
    pub fn raw_bytes(&self) -> Option<&Arc<[u8]>> {
        self.raw_bytes.as_ref()
    }

    /// Register an output surface sized for a page at the current zoom
    pub fn register_page_surface(&mut self, page: usize) -> Result<SurfaceId, SessionError> {
        let geom = self
            .page_geometry(page)
            .ok_or(SessionError::PageOutOfRange(page))?;
        let dpr = self.config.device_pixel_ratio;
        let service = self.service.as_mut().ok_or(SessionError::NotOpen)?;
        Ok(service.register_surface(
            (geom.width_px * dpr).round().max(1.0) as u32,
            (geom.height_px * dpr).round().max(1.0) as u32,
        ))
    }

    /// Render a page with its stamps onto a surface (see `RenderService`)
    pub fn render_page_to(
        &mut self,
        surface: SurfaceId,
        page: usize,
        stamps: &[Stamp],
    ) -> Result<RenderOutcome, SessionError> {
        let geom = self
            .page_geometry(page)
            .ok_or(SessionError::PageOutOfRange(page))?;
        let service = self.service.as_mut().ok_or(SessionError::NotOpen)?;
        Ok(service.render_page_to(surface, page, &geom, stamps)?)
    }

    /// Drain render completions from the worker pool
    pub fn poll_render_events(&mut self) -> Vec<RenderEvent> {
        match self.service.as_mut() {
            Some(service) => service.poll(),
            None => Vec::new(),
        }
    }

    #[must_use]
    pub fn surface_content(&self, surface: SurfaceId) -> Option<&Bitmap> {
        self.service.as_ref()?.surface_content(surface)
    }

    pub fn service_mut(&mut self) -> Option<&mut RenderService> {
        self.service.as_mut()
    }

    /// Export a flattened copy with the given stamps burned in
    pub fn export(
        &self,
        stamps: &[Stamp],
        embedder: &dyn StampEmbedder,
    ) -> Result<Vec<u8>, SessionError> {
        let bytes = self.raw_bytes.as_ref().ok_or(SessionError::NotOpen)?;
        Ok(export::export(bytes, &self.geometry, stamps, embedder)?)
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Map a raster load failure onto the session error taxonomy
impl From<RasterError> for SessionError {
    fn from(err: RasterError) -> Self {
        match err {
            RasterError::Unreadable(msg) => SessionError::Unreadable(msg),
            other => SessionError::Raster(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::testing::FakeRasterizer;

    fn pdf_bytes() -> Vec<u8> {
        b"%PDF-1.7\nsome objects\n%%EOF\n".to_vec()
    }

    fn session(pages: usize, width: f32, height: f32) -> DocumentSession {
        DocumentSession::new(
            Arc::new(FakeRasterizer::with_pages(pages, width, height)),
            RenderConfig {
                workers: 1,
                ..RenderConfig::default()
            },
        )
    }

    #[test]
    fn open_publishes_geometry_for_every_page() {
        let mut session = session(3, 612.0, 792.0);
        session.open(pdf_bytes()).expect("open");

        assert_eq!(session.page_count(), 3);
        assert_eq!(session.geometry().len(), 3);
        let geom = session.page_geometry(0).expect("page 0");
        assert_eq!(geom.width_px, 612.0);
        assert_eq!(geom.height_px, 792.0);
        assert_eq!(geom.scale, 1.0);
    }

    #[test]
    fn open_rejects_non_pdf_bytes_without_state_change() {
        let mut session = session(3, 612.0, 792.0);
        session.open(pdf_bytes()).expect("first open");
        let generation = session.generation();

        let err = session.open(b"GIF89a not a pdf".to_vec()).unwrap_err();
        assert!(matches!(err, SessionError::Unreadable(_)));

        assert_eq!(session.page_count(), 3);
        assert_eq!(session.generation(), generation);
    }

    #[test]
    fn failed_collaborator_load_keeps_previous_session() {
        let mut session = session(2, 100.0, 200.0);
        session.open(pdf_bytes()).expect("open");

        // Swap in a rasterizer that refuses to load anything.
        session.rasterizer = Arc::new(FakeRasterizer::failing_load());
        let err = session.open(pdf_bytes()).unwrap_err();
        assert!(matches!(err, SessionError::Unreadable(_)));

        assert!(session.is_open());
        assert_eq!(session.page_count(), 2);
        assert_eq!(session.geometry().len(), 2);
    }

    #[test]
    fn reopening_never_mixes_page_geometry() {
        let mut session = session(3, 612.0, 792.0);
        session.open(pdf_bytes()).expect("open a");
        let generation_a = session.generation();

        session.rasterizer = Arc::new(FakeRasterizer::with_pages(2, 200.0, 100.0));
        session.open(pdf_bytes()).expect("open b");

        assert!(session.generation() > generation_a);
        assert_eq!(session.page_count(), 2);
        for geom in session.geometry() {
            assert_eq!(geom.width_px, 200.0);
            assert_eq!(geom.height_px, 100.0);
        }
    }

    #[test]
    fn zoom_rescales_linearly_and_clamps() {
        let mut session = session(1, 100.0, 200.0);
        session.open(pdf_bytes()).expect("open");

        assert_eq!(session.set_zoom(1.5), 1.5);
        let geom = session.page_geometry(0).expect("page 0");
        assert_eq!(geom.width_px, 150.0);
        assert_eq!(geom.height_px, 300.0);
        assert_eq!(geom.scale, 1.5);

        assert_eq!(session.set_zoom(5.0), MAX_ZOOM);
        assert_eq!(session.set_zoom(0.01), MIN_ZOOM);
    }

    #[test]
    fn repeated_zoom_steps_do_not_drift() {
        let mut session = session(1, 612.0, 792.0);
        session.open(pdf_bytes()).expect("open");

        for _ in 0..50 {
            session.zoom_by(0.1);
            session.zoom_by(-0.1);
        }
        assert_eq!(session.zoom(), 1.0);
        let geom = session.page_geometry(0).expect("page 0");
        assert_eq!(geom.width_px, 612.0);
        assert_eq!(geom.height_px, 792.0);
    }

    #[test]
    fn clamp_zoom_rounds_to_two_decimals() {
        assert_eq!(clamp_zoom(1.004999), 1.0);
        assert_eq!(clamp_zoom(1.005001), 1.01);
        assert_eq!(clamp_zoom(f32::NAN), 1.0);
        assert_eq!(clamp_zoom(f32::INFINITY), 1.0);
    }

    #[test]
    fn close_clears_state_and_advances_generation() {
        let mut session = session(2, 100.0, 100.0);
        session.open(pdf_bytes()).expect("open");
        let generation = session.generation();

        session.close();
        assert!(!session.is_open());
        assert_eq!(session.page_count(), 0);
        assert!(session.geometry().is_empty());
        assert!(session.generation() > generation);
    }
}
