//! Session-level error taxonomy

use crate::export::ExportError;
use crate::raster::RasterError;

/// Errors surfaced by document session operations.
///
/// Superseded loads and renders are not represented here: they are
/// discarded silently at the commit point, never reported as failures.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("document unreadable: {0}")]
    Unreadable(String),

    #[error("no document is open")]
    NotOpen,

    #[error("page {0} out of range")]
    PageOutOfRange(usize),

    #[error(transparent)]
    Raster(RasterError),

    #[error(transparent)]
    Export(#[from] ExportError),
}
