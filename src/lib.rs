pub mod diag;
pub mod embed;
pub mod error;
pub mod export;
pub mod images;
pub mod raster;
pub mod session;
pub mod stamps;
pub mod transition;

pub use embed::PdfEditor;
pub use error::SessionError;
pub use export::StampEmbedder;
pub use raster::{RenderConfig, RenderEvent, RenderService, SurfaceId};
pub use session::{DocumentSession, PageGeometry};
pub use stamps::{Manipulator, Stamp, StampSet};
pub use transition::Choreographer;
