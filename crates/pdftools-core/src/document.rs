//! In-memory document model
//!
//! Wraps `lopdf::Document` as an ordered sequence of page handles. Pages can
//! be copied from one model into another; a copy deep-clones the page's
//! object graph into the target so the two documents never share structure.

use std::collections::{HashMap, HashSet};

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, warn};

use crate::compress::{encode, EncodingProfile};
use crate::error::{PdfToolsError, Result};
use crate::info::{read_metadata, Metadata};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Guards against malformed page trees whose /Parent chain loops.
const MAX_TREE_DEPTH: usize = 64;

/// Opaque reference to one page of a [`DocumentModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageHandle {
    index: usize,
    id: ObjectId,
}

impl PageHandle {
    /// Zero-based position of the page in its document.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// One parsed (or freshly built) PDF.
#[derive(Debug, Clone)]
pub struct DocumentModel {
    doc: Document,
    pages: Vec<PageHandle>,
    attached: HashSet<ObjectId>,
    source_len: u64,
}

impl DocumentModel {
    /// Parse PDF bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let doc = Document::load_mem(bytes).map_err(|e| PdfToolsError::Decode(e.to_string()))?;

        let pages: Vec<PageHandle> = doc
            .get_pages()
            .values()
            .enumerate()
            .map(|(index, &id)| PageHandle { index, id })
            .collect();
        let attached = pages.iter().map(|p| p.id).collect();

        debug!(pages = pages.len(), bytes = bytes.len(), "PDF parsed");

        Ok(Self {
            doc,
            pages,
            attached,
            source_len: bytes.len() as u64,
        })
    }

    /// A document with an empty page tree. No blank page is inserted.
    pub fn empty() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(Vec::new())),
            ("Count", Object::Integer(0)),
        ]);
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]);
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", Object::Reference(catalog_id));

        Self {
            doc,
            pages: Vec::new(),
            attached: HashSet::new(),
            source_len: 0,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[PageHandle] {
        &self.pages
    }

    pub fn metadata(&self) -> Metadata {
        read_metadata(&self.doc, self.page_count())
    }

    pub fn version(&self) -> &str {
        &self.doc.version
    }

    /// True when the source declared encryption, even if the loader was able
    /// to decrypt it with the empty password.
    pub fn is_encrypted(&self) -> bool {
        self.doc.is_encrypted() || self.doc.was_encrypted()
    }

    /// Size of the bytes this model was parsed from (0 for built documents).
    pub fn source_len(&self) -> u64 {
        self.source_len
    }

    pub(crate) fn inner(&self) -> &Document {
        &self.doc
    }

    pub(crate) fn page_object_id(&self, index: usize) -> Option<ObjectId> {
        self.pages.get(index).map(|p| p.id)
    }

    /// Copy page `index` of `source` into this document.
    ///
    /// The returned handle is not part of the page sequence until passed to
    /// [`DocumentModel::add_page`]. Use a [`PageCopier`] when copying several
    /// pages from the same source so shared resources are cloned once.
    pub fn copy_page(&mut self, source: &DocumentModel, index: usize) -> Result<PageHandle> {
        let mut copier = PageCopier::new(source);
        let handle = copier.copy_page(self, index)?;
        copier.finish(self);
        Ok(handle)
    }

    /// Append a copied page to the end of the page sequence.
    pub fn add_page(&mut self, page: PageHandle) -> Result<PageHandle> {
        if !self.doc.objects.contains_key(&page.id) {
            return Err(PdfToolsError::Operation(format!(
                "page object {:?} does not belong to this document",
                page.id
            )));
        }
        if self.attached.contains(&page.id) {
            return Err(PdfToolsError::Operation(format!(
                "page object {:?} is already in the page tree",
                page.id
            )));
        }

        let pages_id = self.pages_root_id()?;

        match self.doc.objects.get_mut(&pages_id) {
            Some(Object::Dictionary(pages_dict)) => {
                match pages_dict.get_mut(b"Kids") {
                    Ok(Object::Array(kids)) => kids.push(Object::Reference(page.id)),
                    _ => pages_dict.set("Kids", Object::Array(vec![Object::Reference(page.id)])),
                }
                pages_dict.set("Count", Object::Integer(self.pages.len() as i64 + 1));
            }
            _ => {
                return Err(PdfToolsError::Operation(
                    "Invalid pages dictionary".into(),
                ))
            }
        }

        if let Some(Object::Dictionary(page_dict)) = self.doc.objects.get_mut(&page.id) {
            page_dict.set("Parent", Object::Reference(pages_id));
        }

        let handle = PageHandle {
            index: self.pages.len(),
            id: page.id,
        };
        self.pages.push(handle);
        self.attached.insert(page.id);
        Ok(handle)
    }

    /// Serialize without consuming the model.
    pub fn to_bytes(&self, profile: EncodingProfile) -> Result<Vec<u8>> {
        self.clone().into_bytes(profile)
    }

    pub fn into_bytes(mut self, profile: EncodingProfile) -> Result<Vec<u8>> {
        encode(&mut self.doc, profile);

        let mut buffer = Vec::new();
        self.doc
            .save_with_options(&mut buffer, profile.save_options())
            .map_err(|e| PdfToolsError::Serialization(format!("Failed to save PDF: {}", e)))?;
        Ok(buffer)
    }

    /// Resolve the catalog's /Pages reference.
    fn pages_root_id(&self) -> Result<ObjectId> {
        let catalog_id = self
            .doc
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .map_err(|_| PdfToolsError::Operation("No Root in trailer".into()))?;

        self.doc
            .objects
            .get(&catalog_id)
            .ok_or_else(|| PdfToolsError::Operation("Catalog not found".into()))?
            .as_dict()
            .map_err(|_| PdfToolsError::Operation("Invalid catalog".into()))?
            .get(b"Pages")
            .and_then(Object::as_reference)
            .map_err(|_| PdfToolsError::Operation("No Pages in catalog".into()))
    }
}

/// Copies pages out of one source document, remembering which source objects
/// were already cloned into the current target.
///
/// A copier is bound to one target: reuse it for every page copied from
/// `source` into that target, and create a new one per target. Call
/// [`PageCopier::finish`] once the last page is copied.
///
/// References from a copied object to another page (link destinations,
/// annotation targets) point at that page's copy when it is copied into the
/// same target, and become `Null` otherwise.
pub struct PageCopier<'s> {
    source: &'s DocumentModel,
    cloned: HashMap<ObjectId, ObjectId>,
    /// Target ids handed out for linked pages that have not been copied yet.
    reserved: HashSet<ObjectId>,
}

impl<'s> PageCopier<'s> {
    pub fn new(source: &'s DocumentModel) -> Self {
        Self {
            source,
            cloned: HashMap::new(),
            reserved: HashSet::new(),
        }
    }

    /// Null out references to linked pages that never made it into `target`.
    /// Returns how many references were dropped.
    pub fn finish(self, target: &mut DocumentModel) -> usize {
        if self.reserved.is_empty() {
            return 0;
        }

        let mut dropped = 0;
        for object in target.doc.objects.values_mut() {
            dropped += null_references(object, &self.reserved);
        }
        if dropped > 0 {
            debug!(dropped, "Dropped links to pages outside the output");
        }
        dropped
    }

    pub fn copy_page(&mut self, target: &mut DocumentModel, index: usize) -> Result<PageHandle> {
        let source = self.source;
        let page_id = source.page_object_id(index).ok_or_else(|| {
            PdfToolsError::Operation(format!(
                "page index {} out of range (document has {} pages)",
                index,
                source.page_count()
            ))
        })?;

        let page_dict = source
            .doc
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|e| {
                PdfToolsError::Operation(format!("cannot read page object {:?}: {}", page_id, e))
            })?;

        let new_id = match self.cloned.get(&page_id) {
            Some(&id) if self.reserved.remove(&id) => id,
            _ => target.doc.new_object_id(),
        };
        self.cloned.insert(page_id, new_id);

        let mut new_dict = self.clone_dict(&mut target.doc, page_dict, true)?;
        for key in INHERITABLE_KEYS {
            if new_dict.has(key) {
                continue;
            }
            if let Some(value) = self.inherited_attribute(page_dict, key) {
                let cloned = self.clone_object(&mut target.doc, &value)?;
                new_dict.set(key.to_vec(), cloned);
            }
        }
        new_dict.set("Type", Object::Name(b"Page".to_vec()));

        target.doc.objects.insert(new_id, Object::Dictionary(new_dict));

        Ok(PageHandle { index, id: new_id })
    }

    /// Walk the /Parent chain looking for an inheritable attribute.
    fn inherited_attribute(&self, page: &Dictionary, key: &[u8]) -> Option<Object> {
        let mut current = page.get(b"Parent").and_then(Object::as_reference).ok();

        for _ in 0..MAX_TREE_DEPTH {
            let parent_id = current?;
            let parent = self
                .source
                .doc
                .get_object(parent_id)
                .and_then(Object::as_dict)
                .ok()?;
            if let Ok(value) = parent.get(key) {
                return Some(value.clone());
            }
            current = parent.get(b"Parent").and_then(Object::as_reference).ok();
        }

        None
    }

    fn clone_object(&mut self, target: &mut Document, object: &Object) -> Result<Object> {
        match object {
            Object::Reference(id) => self.clone_reference(target, *id),
            Object::Array(items) => {
                let mut cloned = Vec::with_capacity(items.len());
                for item in items {
                    cloned.push(self.clone_object(target, item)?);
                }
                Ok(Object::Array(cloned))
            }
            Object::Dictionary(dict) => Ok(Object::Dictionary(self.clone_dict(target, dict, false)?)),
            Object::Stream(stream) => {
                let mut cloned = stream.clone();
                cloned.dict = self.clone_dict(target, &stream.dict, false)?;
                Ok(Object::Stream(cloned))
            }
            other => Ok(other.clone()),
        }
    }

    fn clone_dict(
        &mut self,
        target: &mut Document,
        dict: &Dictionary,
        is_page: bool,
    ) -> Result<Dictionary> {
        let mut cloned = Dictionary::new();
        for (key, value) in dict.iter() {
            // The page tree parent is patched in by `add_page`.
            if is_page && key.as_slice() == b"Parent" {
                continue;
            }
            cloned.set(key.clone(), self.clone_object(target, value)?);
        }
        Ok(cloned)
    }

    fn clone_reference(&mut self, target: &mut Document, id: ObjectId) -> Result<Object> {
        if let Some(&new_id) = self.cloned.get(&id) {
            return Ok(Object::Reference(new_id));
        }

        let source = self.source;
        let object = match source.doc.get_object(id) {
            Ok(object) => object,
            Err(err) => {
                warn!(?id, %err, "Cannot resolve reference, using Null");
                return Ok(Object::Null);
            }
        };

        // Page links get a slot that `copy_page` fills if the page is copied.
        // Following them would drag the whole page tree along.
        if is_page(object) {
            let slot = target.new_object_id();
            self.cloned.insert(id, slot);
            self.reserved.insert(slot);
            return Ok(Object::Reference(slot));
        }
        if is_page_tree_node(object) {
            debug!(?id, "Dropping reference to a page tree node");
            return Ok(Object::Null);
        }

        let new_id = target.new_object_id();
        self.cloned.insert(id, new_id);
        let cloned = self.clone_object(target, object)?;
        target.objects.insert(new_id, cloned);

        Ok(Object::Reference(new_id))
    }
}

fn is_page(object: &Object) -> bool {
    matches!(
        object,
        Object::Dictionary(dict)
            if matches!(dict.get(b"Type"), Ok(Object::Name(name)) if name.as_slice() == b"Page")
    )
}

fn null_references(object: &mut Object, ids: &HashSet<ObjectId>) -> usize {
    if matches!(object, Object::Reference(id) if ids.contains(id)) {
        *object = Object::Null;
        return 1;
    }

    match object {
        Object::Array(items) => items.iter_mut().map(|item| null_references(item, ids)).sum(),
        Object::Dictionary(dict) => dict
            .iter_mut()
            .map(|(_, value)| null_references(value, ids))
            .sum(),
        Object::Stream(stream) => stream
            .dict
            .iter_mut()
            .map(|(_, value)| null_references(value, ids))
            .sum(),
        _ => 0,
    }
}

pub(crate) fn is_page_tree_node(object: &Object) -> bool {
    match object {
        Object::Dictionary(dict) => matches!(
            dict.get(b"Type"),
            Ok(Object::Name(name)) if name.as_slice() == b"Page" || name.as_slice() == b"Pages"
        ),
        _ => false,
    }
}
