//! Export orchestration - screen-to-document transforms and validation

use log::info;
use memchr::memmem;
use serde::Serialize;

use crate::embed::EmbedError;
use crate::session::PageGeometry;
use crate::stamps::Stamp;

/// Leading signature of a PDF file
pub const PDF_MAGIC: &[u8] = b"%PDF-";
const EOF_MARKER: &[u8] = b"%%EOF";
/// How far from the end the trailer marker is searched for
const EOF_SCAN_WINDOW: usize = 4096;

/// Errors from the export path
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("nothing to export: no stamps placed")]
    NoStamps,

    #[error("stamp references page {0}, which the document does not have")]
    PageOutOfRange(usize),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error("exported output failed validation: {0}")]
    Integrity(String),
}

/// Structural sanity check shared by the open and export paths
pub fn validate_pdf(bytes: &[u8]) -> Result<(), String> {
    if bytes.len() < 8 {
        return Err("too short to be a PDF".into());
    }
    if !bytes.starts_with(PDF_MAGIC) {
        return Err("missing %PDF- signature".into());
    }
    let tail_start = bytes.len().saturating_sub(EOF_SCAN_WINDOW);
    if memmem::find(&bytes[tail_start..], EOF_MARKER).is_none() {
        return Err("missing %%EOF trailer marker".into());
    }
    Ok(())
}

/// A stamp rectangle in document space: bottom-left origin, document units
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DocRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One stamp resolved to document coordinates, ready for embedding
#[derive(Clone, Debug)]
pub struct DocPlacement {
    pub page_index: usize,
    pub rect: DocRect,
    pub image_bytes: Vec<u8>,
}

/// Convert a stamp's screen rectangle (top-left origin CSS pixels at the
/// current zoom) into document space (bottom-left origin, unscaled units).
#[must_use]
pub fn to_doc_rect(x: f32, y: f32, w: f32, h: f32, page: &PageGeometry) -> DocRect {
    let scale = f64::from(page.scale);
    DocRect {
        x: f64::from(x) / scale,
        y: (f64::from(page.height_px) - f64::from(y + h)) / scale,
        width: f64::from(w) / scale,
        height: f64::from(h) / scale,
    }
}

/// Inverse of `to_doc_rect`: document space back to screen space
#[must_use]
pub fn to_screen_rect(rect: &DocRect, page: &PageGeometry) -> (f32, f32, f32, f32) {
    let scale = f64::from(page.scale);
    let w = rect.width * scale;
    let h = rect.height * scale;
    let x = rect.x * scale;
    let y = f64::from(page.height_px) - rect.y * scale - h;
    (x as f32, y as f32, w as f32, h as f32)
}

/// Collaborator that burns stamp images into a document's page content
pub trait StampEmbedder {
    fn embed(&self, original: &[u8], placements: &[DocPlacement]) -> Result<Vec<u8>, EmbedError>;
}

/// Flatten stamps into a copy of the original document.
///
/// Converts every stamp to document coordinates, delegates embedding, and
/// validates the serialized output before returning it. A validation
/// failure is a hard error; no partial result is ever handed out.
pub fn export(
    original: &[u8],
    geometry: &[PageGeometry],
    stamps: &[Stamp],
    embedder: &dyn StampEmbedder,
) -> Result<Vec<u8>, ExportError> {
    if stamps.is_empty() {
        return Err(ExportError::NoStamps);
    }

    let mut placements = Vec::with_capacity(stamps.len());
    for stamp in stamps {
        let page = geometry
            .get(stamp.page_index)
            .ok_or(ExportError::PageOutOfRange(stamp.page_index))?;
        placements.push(DocPlacement {
            page_index: stamp.page_index,
            rect: to_doc_rect(stamp.x, stamp.y, stamp.w, stamp.h, page),
            image_bytes: stamp.image_bytes.clone(),
        });
    }

    let output = embedder.embed(original, &placements)?;
    validate_pdf(&output).map_err(ExportError::Integrity)?;

    info!(
        "exported {} stamps, {} -> {} bytes",
        placements.len(),
        original.len(),
        output.len()
    );
    Ok(output)
}
