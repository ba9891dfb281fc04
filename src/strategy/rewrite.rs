use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{debug, info, warn};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use rayon::prelude::*;

use super::{Attempt, CompressionStrategy};
use crate::error::{CompressError, Result};
use crate::quality::{Quality, RecompressSettings};
use crate::raster;

// Parent chains and nested forms deeper than this are treated as malformed.
const MAX_NESTING: usize = 32;

/// Recompresses embedded raster images in-process and rewrites the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct RewriteStrategy;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RewriteSummary {
    pub images_found: usize,
    pub images_recompressed: usize,
}

impl CompressionStrategy for RewriteStrategy {
    fn name(&self) -> &'static str {
        "rewrite"
    }

    fn attempt(&self, input: &Path, output: &Path, quality: Quality) -> Result<Attempt> {
        info!("Rewriting {} in-process ({})", input.display(), quality);
        let mut doc = Document::load(input).map_err(CompressError::PdfLoad)?;

        if doc.is_encrypted() {
            if let Err(e) = doc.decrypt(b"") {
                warn!("Failed to decrypt with empty password: {:?}", e);
            }
        }

        let summary = recompress_images(&mut doc, quality.recompress_settings());
        info!(
            "Recompressed {} of {} images",
            summary.images_recompressed, summary.images_found
        );

        doc.prune_objects();
        doc.renumber_objects();
        doc.compress();

        let file = File::create(output).map_err(|e| CompressError::io(output, e))?;
        let mut writer = BufWriter::new(file);
        doc.save_to(&mut writer)
            .map_err(|e| CompressError::PdfSave(e.into()))?;
        writer.flush().map_err(|e| CompressError::io(output, e))?;

        Ok(Attempt::Produced)
    }
}

/// Replaces every decodable page image with a JPEG re-encoding. Images that
/// fail to decode or encode are left as they were.
pub fn recompress_images(doc: &mut Document, settings: RecompressSettings) -> RewriteSummary {
    let jobs: Vec<_> = page_image_ids(doc)
        .into_iter()
        .filter_map(|id| match doc.objects.get(&id) {
            Some(Object::Stream(stream)) => Some((id, stream.clone(), soft_mask(doc, stream))),
            _ => None,
        })
        .collect();

    let results: Vec<_> = jobs
        .par_iter()
        .map(|(id, stream, mask)| (*id, raster::recompress(stream, mask.as_ref(), settings)))
        .collect();

    let mut summary = RewriteSummary {
        images_found: results.len(),
        ..Default::default()
    };
    for (id, result) in results {
        match result {
            Ok(image) => {
                debug!(
                    "Image {} {}x{} -> {}x{} ({} bytes)",
                    id.0,
                    image.source_dims.0,
                    image.source_dims.1,
                    image.width,
                    image.height,
                    image.data.len()
                );
                if let Some(Object::Stream(stream)) = doc.objects.get_mut(&id) {
                    raster::replace_content(stream, image);
                    summary.images_recompressed += 1;
                }
            }
            Err(e) => debug!("Leaving image {} unchanged: {:#}", id.0, e),
        }
    }
    summary
}

/// Image XObjects reachable from page resources, including those inside
/// form XObjects, in page order and without duplicates.
pub fn page_image_ids(doc: &Document) -> Vec<ObjectId> {
    let mut seen = HashSet::new();
    let mut images = Vec::new();
    for page_id in doc.get_pages().into_values() {
        if let Some(resources) = page_resources(doc, page_id) {
            collect_images(doc, resources, &mut seen, &mut images, 0);
        }
    }
    images
}

fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_NESTING {
        if let Ok(resources) = node.get(b"Resources") {
            return as_dictionary(doc, resources);
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn collect_images(
    doc: &Document,
    resources: &Dictionary,
    seen: &mut HashSet<ObjectId>,
    images: &mut Vec<ObjectId>,
    depth: usize,
) {
    if depth > MAX_NESTING {
        return;
    }
    let Some(xobjects) = resources
        .get(b"XObject")
        .ok()
        .and_then(|o| as_dictionary(doc, o))
    else {
        return;
    };

    for (_, value) in xobjects.iter() {
        let Ok(id) = value.as_reference() else {
            continue;
        };
        if !seen.insert(id) {
            continue;
        }
        let Ok(Object::Stream(stream)) = doc.get_object(id) else {
            continue;
        };
        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Image") => images.push(id),
            Ok(b"Form") => {
                if let Some(inner) = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|o| as_dictionary(doc, o))
                {
                    collect_images(doc, inner, seen, images, depth + 1);
                }
            }
            _ => {}
        }
    }
}

fn soft_mask(doc: &Document, image: &Stream) -> Option<Stream> {
    let id = image.dict.get(b"SMask").and_then(Object::as_reference).ok()?;
    match doc.objects.get(&id) {
        Some(Object::Stream(mask)) => Some(mask.clone()),
        _ => None,
    }
}

fn as_dictionary<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match object {
        Object::Dictionary(dict) => Some(dict),
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        _ => None,
    }
}
