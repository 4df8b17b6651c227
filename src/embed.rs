//! PDF stamp embedding via lopdf
//!
//! Burns each stamp into page content as an image XObject pair (DeviceRGB
//! color plus a DeviceGray soft mask carrying the alpha channel) drawn by
//! an appended content stream, then reserializes the document.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::export::{DocPlacement, StampEmbedder};
use crate::images;

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("pdf: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("stamp image: {0}")]
    Image(#[from] image::ImageError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("page {0} not found in document")]
    PageMissing(usize),

    #[error("{0}")]
    Structure(String),
}

/// lopdf-backed implementation of the embedding collaborator
#[derive(Default)]
pub struct PdfEditor;

impl PdfEditor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// MediaBox size of every page, in document units
    pub fn page_sizes(bytes: &[u8]) -> Result<Vec<(f64, f64)>, EmbedError> {
        let doc = Document::load_mem(bytes)?;
        let pages = doc.get_pages();
        let mut sizes = Vec::with_capacity(pages.len());
        for page_id in pages.values() {
            sizes.push(media_box_size(&doc, *page_id)?);
        }
        Ok(sizes)
    }

    fn embed_all(original: &[u8], placements: &[DocPlacement]) -> Result<Vec<u8>, EmbedError> {
        let mut doc = Document::load_mem(original)?;
        let pages = doc.get_pages();

        for (index, placement) in placements.iter().enumerate() {
            let page_no = u32::try_from(placement.page_index + 1)
                .map_err(|_| EmbedError::PageMissing(placement.page_index))?;
            let page_id = *pages
                .get(&page_no)
                .ok_or(EmbedError::PageMissing(placement.page_index))?;

            let image_id = add_image_xobject(&mut doc, &placement.image_bytes)?;
            let name = format!("ImStamp{index}");
            attach_xobject(&mut doc, page_id, &name, image_id)?;

            let rect = &placement.rect;
            let draw_op = format!(
                "q {:.4} 0 0 {:.4} {:.4} {:.4} cm /{} Do Q",
                rect.width, rect.height, rect.x, rect.y, name
            );
            doc.add_page_contents(page_id, draw_op.into_bytes())?;
        }

        let mut out = Vec::new();
        doc.save_to(&mut out)?;
        Ok(out)
    }
}

impl StampEmbedder for PdfEditor {
    fn embed(&self, original: &[u8], placements: &[DocPlacement]) -> Result<Vec<u8>, EmbedError> {
        Self::embed_all(original, placements)
    }
}

/// Decode the stamp and register it as an RGB image XObject with its alpha
/// channel attached as an SMask. Returns the image object id.
fn add_image_xobject(doc: &mut Document, image_bytes: &[u8]) -> Result<ObjectId, EmbedError> {
    let rgba = images::decode_rgba(image_bytes)?;
    let (width, height) = rgba.dimensions();

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for pixel in rgba.pixels() {
        rgb.extend_from_slice(&pixel.0[0..3]);
        alpha.push(pixel.0[3]);
    }

    let smask_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        alpha,
    ));

    Ok(doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "SMask" => smask_id,
        },
        rgb,
    )))
}

/// Register an XObject name in the page's resource dictionary, tolerating
/// both inline and referenced Resources entries.
fn attach_xobject(
    doc: &mut Document,
    page_id: ObjectId,
    name: &str,
    image_id: ObjectId,
) -> Result<(), EmbedError> {
    let mut resources = {
        let page_dict = doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|_| EmbedError::Structure("page has no dictionary".into()))?;
        page_dict
            .remove(b"Resources")
            .unwrap_or_else(|| Object::Dictionary(dictionary! {}))
    };

    match &mut resources {
        Object::Reference(id) => {
            let res_dict = doc
                .get_object_mut(*id)
                .and_then(Object::as_dict_mut)
                .map_err(|_| EmbedError::Structure("resources reference is not a dict".into()))?;
            xobject_dict(res_dict)?.set(name, image_id);
        }
        Object::Dictionary(dict) => {
            xobject_dict(dict)?.set(name, image_id);
        }
        _ => return Err(EmbedError::Structure("resources entry is invalid".into())),
    }

    let page_dict = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|_| EmbedError::Structure("page has no dictionary".into()))?;
    page_dict.set("Resources", resources);
    Ok(())
}

/// Get (or create) the XObject sub-dictionary of a resource dictionary
fn xobject_dict(res_dict: &mut Dictionary) -> Result<&mut Dictionary, EmbedError> {
    let existing = res_dict
        .remove(b"XObject")
        .unwrap_or_else(|| Object::Dictionary(dictionary! {}));

    let owned = match existing {
        Object::Dictionary(dict) => Object::Dictionary(dict),
        // An indirect XObject dict would force a second document borrow;
        // replace it with a fresh inline dict for the stamp entries.
        Object::Reference(_) => Object::Dictionary(dictionary! {}),
        _ => return Err(EmbedError::Structure("XObject entry is invalid".into())),
    };

    res_dict.set("XObject", owned);
    match res_dict.get_mut(b"XObject") {
        Ok(Object::Dictionary(dict)) => Ok(dict),
        _ => Err(EmbedError::Structure("XObject entry is invalid".into())),
    }
}

/// MediaBox width/height, walking up the page tree when inherited
fn media_box_size(doc: &Document, page_id: ObjectId) -> Result<(f64, f64), EmbedError> {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let dict = doc
            .get_object(id)
            .and_then(Object::as_dict)
            .map_err(|_| EmbedError::Structure("page node has no dictionary".into()))?;

        if let Some(size) = read_media_box(doc, dict) {
            return Ok(size);
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    Err(EmbedError::Structure("page has no MediaBox".into()))
}

fn read_media_box(doc: &Document, dict: &Dictionary) -> Option<(f64, f64)> {
    let raw = dict.get(b"MediaBox").ok()?;
    let resolved = match raw {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let array = resolved.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let llx = as_f64(&array[0])?;
    let lly = as_f64(&array[1])?;
    let urx = as_f64(&array[2])?;
    let ury = as_f64(&array[3])?;
    Some((urx - llx, ury - lly))
}

fn as_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some(f64::from(*f)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::DocRect;

    /// Minimal multi-page PDF built in memory
    pub(crate) fn build_pdf(page_sizes: &[(f64, f64)]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let kids: Vec<Object> = page_sizes
            .iter()
            .map(|(w, h)| {
                let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
                let page_id = doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), (*w).into(), (*h).into()],
                    "Contents" => content_id,
                });
                Object::Reference(page_id)
            })
            .collect();

        let count = i64::try_from(kids.len()).unwrap_or(0);
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).expect("serialize test pdf");
        out
    }

    fn png_stamp() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(6, 4, image::Rgba([200, 10, 10, 128]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .expect("png encode");
        out.into_inner()
    }

    #[test]
    fn page_sizes_reads_media_boxes() {
        let bytes = build_pdf(&[(612.0, 792.0), (595.0, 842.0)]);
        let sizes = PdfEditor::page_sizes(&bytes).expect("sizes");
        assert_eq!(sizes, vec![(612.0, 792.0), (595.0, 842.0)]);
    }

    #[test]
    fn embedding_grows_the_document_and_stays_loadable() {
        let original = build_pdf(&[(612.0, 792.0)]);
        let placement = DocPlacement {
            page_index: 0,
            rect: DocRect {
                x: 50.0,
                y: 700.0,
                width: 100.0,
                height: 40.0,
            },
            image_bytes: png_stamp(),
        };

        let out = PdfEditor::new()
            .embed(&original, std::slice::from_ref(&placement))
            .expect("embed");

        assert!(out.len() > original.len());
        let reloaded = Document::load_mem(&out).expect("reload");
        assert_eq!(reloaded.get_pages().len(), 1);
    }

    #[test]
    fn embedding_on_a_missing_page_fails() {
        let original = build_pdf(&[(612.0, 792.0)]);
        let placement = DocPlacement {
            page_index: 3,
            rect: DocRect {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            },
            image_bytes: png_stamp(),
        };

        let err = PdfEditor::new()
            .embed(&original, std::slice::from_ref(&placement))
            .unwrap_err();
        assert!(matches!(err, EmbedError::PageMissing(3)));
    }

    #[test]
    fn undecodable_stamp_bytes_fail_embedding() {
        let original = build_pdf(&[(612.0, 792.0)]);
        let placement = DocPlacement {
            page_index: 0,
            rect: DocRect {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            },
            image_bytes: b"junk".to_vec(),
        };

        let err = PdfEditor::new()
            .embed(&original, std::slice::from_ref(&placement))
            .unwrap_err();
        assert!(matches!(err, EmbedError::Image(_)));
    }
}
