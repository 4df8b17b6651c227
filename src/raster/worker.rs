//! Raster worker - runs in separate thread(s)

use std::sync::Arc;

use flume::{Receiver, Sender};
use log::{debug, warn};

use super::request::{RasterRequest, RasterResponse};
use super::{LoadOptions, Rasterizer};

/// Worker loop: loads its own document handle over the shared bytes, then
/// serves page requests from the shared queue until shutdown.
///
/// Rasterization is never aborted mid-flight; superseded results are
/// discarded by the service at the commit point.
pub(crate) fn raster_worker(
    rasterizer: &Arc<dyn Rasterizer>,
    bytes: Arc<[u8]>,
    options: LoadOptions,
    rx: &Receiver<RasterRequest>,
    tx: &Sender<RasterResponse>,
) {
    let handle = match rasterizer.load(bytes, &options) {
        Ok(handle) => handle,
        Err(error) => {
            warn!("raster worker could not load document: {error}");
            let _ = tx.send(RasterResponse::Fatal { error });
            return;
        }
    };

    while let Ok(request) = rx.recv() {
        match request {
            RasterRequest::Shutdown => {
                debug!("raster worker shutting down");
                break;
            }

            RasterRequest::Page { id, key } => {
                let response = match handle.render_page(key.page, key.width_px, key.height_px) {
                    Ok(bitmap) => RasterResponse::Page {
                        id,
                        key,
                        bitmap: Arc::new(bitmap),
                    },
                    Err(error) => RasterResponse::Error { id, key, error },
                };

                // Service side hung up; nothing left to render for.
                if tx.send(response).is_err() {
                    break;
                }
            }
        }
    }
}
