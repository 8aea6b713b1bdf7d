//! Page-tree repair.
//!
//! Rebuilds a single flat `/Pages` node over every page that can be found, either through the
//! existing tree or, when that is broken, by scanning for `/Type /Page` objects. Attributes
//! the pages inherited from their old ancestors are copied onto the pages themselves.

use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};
use tracing::debug;

use super::Result;
use crate::error::PdfError;

/// Page attributes that may be inherited from ancestor page-tree nodes.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against parent cycles in damaged files.
const MAX_TREE_DEPTH: usize = 64;

/// Rebuild the page container of a PDF and return the re-serialized bytes.
pub fn repair_pdf(pdf: &[u8]) -> Result<Vec<u8>> {
    let mut doc = Document::load_mem(pdf).map_err(|e| PdfError::Parse(e.to_string()))?;

    if doc.is_encrypted() {
        doc.decrypt("").map_err(|_| PdfError::Encrypted)?;
        debug!("decrypted PDF with empty password");
    }

    let mut page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    if page_ids.is_empty() {
        page_ids = scan_page_objects(&doc);
        debug!(found = page_ids.len(), "page tree unusable, scanned for page objects");
    }
    if page_ids.is_empty() {
        return Err(PdfError::NoPages);
    }

    for &page_id in &page_ids {
        let inherited = inherited_attributes(&doc, page_id);
        if let Ok(page) = doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
            for (key, value) in inherited {
                if !page.has(&key) {
                    page.set(key, value);
                }
            }
        }
    }

    let pages_id = doc.new_object_id();
    for &page_id in &page_ids {
        if let Ok(page) = doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
            page.set("Parent", pages_id);
        }
    }
    let kids: Vec<Object> = page_ids.iter().map(|&id| Object::Reference(id)).collect();
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    attach_to_catalog(&mut doc, pages_id);

    doc.prune_objects();
    doc.renumber_objects();

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| PdfError::Repair(e.to_string()))?;
    debug!(pages = page_ids.len(), bytes = out.len(), "rebuilt page tree");
    Ok(out)
}

/// Dictionaries typed `/Page`, in object-number order.
fn scan_page_objects(doc: &Document) -> Vec<ObjectId> {
    doc.objects
        .iter()
        .filter_map(|(&id, object)| {
            let dict = object.as_dict().ok()?;
            let is_page = dict
                .get(b"Type")
                .and_then(Object::as_name)
                .is_ok_and(|name| name == b"Page");
            is_page.then_some(id)
        })
        .collect()
}

/// Inheritable attributes from the nearest ancestor that defines each.
fn inherited_attributes(doc: &Document, page_id: ObjectId) -> Vec<(Vec<u8>, Object)> {
    let mut found: Vec<(Vec<u8>, Object)> = Vec::new();
    let mut current = parent_of(doc, page_id);

    for _ in 0..MAX_TREE_DEPTH {
        let Some(node_id) = current else { break };
        let Ok(node) = doc.get_dictionary(node_id) else { break };

        for key in INHERITABLE {
            if found.iter().any(|(k, _)| k == key) {
                continue;
            }
            if let Ok(value) = node.get(key) {
                found.push((key.to_vec(), value.clone()));
            }
        }
        current = parent_reference(node);
    }

    found
}

fn parent_of(doc: &Document, id: ObjectId) -> Option<ObjectId> {
    doc.get_dictionary(id).ok().and_then(parent_reference)
}

fn parent_reference(dict: &Dictionary) -> Option<ObjectId> {
    dict.get(b"Parent").and_then(Object::as_reference).ok()
}

/// Point the catalog at the new page tree, creating a catalog if the old one is gone.
fn attach_to_catalog(doc: &mut Document, pages_id: ObjectId) {
    let root_id = doc.trailer.get(b"Root").and_then(Object::as_reference).ok();
    if let Some(root_id) = root_id {
        if let Ok(catalog) = doc.get_object_mut(root_id).and_then(Object::as_dict_mut) {
            catalog.set("Pages", pages_id);
            return;
        }
    }

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
}
