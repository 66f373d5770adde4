//! PDF recompression
//!
//! Re-serializes a document under a quality tier. This is structural
//! re-encoding only: page content, images and fonts are never resampled, so
//! the output can occasionally be larger than the input.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::str::FromStr;

use lopdf::{Document, Object, ObjectId, SaveOptions, StringFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::budget::JobBudget;
use crate::document::{is_page_tree_node, DocumentModel};
use crate::error::{PdfToolsError, Result};

/// Stop collapsing after this many passes even if a pass still found duplicates.
const MAX_SHARING_PASSES: usize = 8;

/// Dictionary types that may be shared between several referrers.
const SHAREABLE_TYPES: [&[u8]; 7] = [
    b"Font",
    b"FontDescriptor",
    b"Encoding",
    b"ExtGState",
    b"Pattern",
    b"Shading",
    b"XObject",
];

/// How a document is laid out when written back to bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingProfile {
    /// Collapse structurally identical objects into one shared object, drop
    /// unreachable objects and empty streams, Flate-compress the rest and
    /// renumber. Non-stream objects are packed into object streams.
    SharedObjects,
    /// Flate-compress streams and otherwise keep the object layout as is,
    /// with a classic xref table and no object streams.
    Plain,
}

impl EncodingProfile {
    /// Writer settings for this profile.
    pub(crate) fn save_options(self) -> SaveOptions {
        let packed = matches!(self, EncodingProfile::SharedObjects);
        SaveOptions::builder()
            .use_object_streams(packed)
            .use_xref_streams(packed)
            .build()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityTier {
    pub fn profile(self) -> EncodingProfile {
        match self {
            QualityTier::Low | QualityTier::Medium => EncodingProfile::SharedObjects,
            QualityTier::High => EncodingProfile::Plain,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        }
    }
}

impl FromStr for QualityTier {
    type Err = PdfToolsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(QualityTier::Low),
            "medium" => Ok(QualityTier::Medium),
            "high" => Ok(QualityTier::High),
            other => Err(PdfToolsError::Operation(format!(
                "Invalid quality '{}'. Must be 'low', 'medium', or 'high'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompressJob {
    pub input: DocumentModel,
    pub quality_tier: QualityTier,
}

impl CompressJob {
    pub fn new(input: DocumentModel, quality_tier: QualityTier) -> Self {
        Self {
            input,
            quality_tier,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressOutcome {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub original_size_bytes: u64,
    pub compressed_size_bytes: u64,
    pub page_count: usize,
    /// Negative when re-encoding grew the file.
    pub savings_percent: f64,
}

/// Re-encode `job.input` with the profile selected by its quality tier.
#[instrument(skip_all, fields(quality = job.quality_tier.as_str(), pages = job.input.page_count()))]
pub fn compress(job: CompressJob, budget: &JobBudget) -> Result<CompressOutcome> {
    let original_size_bytes = job.input.source_len();
    let pages = job.input.page_count();
    budget.checkpoint(pages)?;

    let bytes = job.input.into_bytes(job.quality_tier.profile())?;
    budget.checkpoint(pages)?;

    let compressed_size_bytes = bytes.len() as u64;
    let savings_percent = savings_percent(original_size_bytes, compressed_size_bytes);

    info!(
        original_size_bytes,
        compressed_size_bytes, savings_percent, "Compression complete"
    );

    Ok(CompressOutcome {
        bytes,
        original_size_bytes,
        compressed_size_bytes,
        page_count: pages,
        savings_percent,
    })
}

/// `(1 - compressed / original) * 100`, rounded to one decimal place.
pub fn savings_percent(original: u64, compressed: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    let ratio = 1.0 - compressed as f64 / original as f64;
    (ratio * 1000.0).round() / 10.0
}

/// Apply an encoding profile in place, ahead of `save_to`.
pub(crate) fn encode(doc: &mut Document, profile: EncodingProfile) {
    match profile {
        EncodingProfile::SharedObjects => {
            doc.prune_objects();
            let dropped = doc.delete_zero_length_streams().len();
            let shared = share_identical_objects(doc);
            let pruned = doc.prune_objects().len();
            doc.compress();
            doc.renumber_objects();
            debug!(shared, pruned, dropped, "Shared-object encoding applied");
        }
        EncodingProfile::Plain => {
            doc.compress();
        }
    }
}

/// Collapse structurally identical objects, rewriting references to point at
/// the lowest-numbered copy. Returns the number of objects removed.
fn share_identical_objects(doc: &mut Document) -> usize {
    let mut removed = 0;

    for _ in 0..MAX_SHARING_PASSES {
        let mut seen: HashMap<Vec<u8>, ObjectId> = HashMap::new();
        let mut replacements: HashMap<ObjectId, ObjectId> = HashMap::new();

        for (&id, object) in doc.objects.iter() {
            if !is_shareable(object) {
                continue;
            }
            let mut key = Vec::new();
            fingerprint(object, &mut key);
            match seen.entry(key) {
                Entry::Occupied(canonical) => {
                    replacements.insert(id, *canonical.get());
                }
                Entry::Vacant(slot) => {
                    slot.insert(id);
                }
            }
        }

        if replacements.is_empty() {
            break;
        }

        for id in replacements.keys() {
            doc.objects.remove(id);
        }
        for object in doc.objects.values_mut() {
            rewrite_references(object, &replacements);
        }
        for (_, value) in doc.trailer.iter_mut() {
            rewrite_references(value, &replacements);
        }

        removed += replacements.len();
    }

    removed
}

fn is_shareable(object: &Object) -> bool {
    match object {
        Object::Stream(_) | Object::Array(_) => true,
        Object::Dictionary(dict) => {
            if is_page_tree_node(object) {
                return false;
            }
            matches!(
                dict.get(b"Type"),
                Ok(Object::Name(name)) if SHAREABLE_TYPES.contains(&name.as_slice())
            )
        }
        _ => false,
    }
}

fn rewrite_references(object: &mut Object, replacements: &HashMap<ObjectId, ObjectId>) {
    match object {
        Object::Reference(id) => {
            if let Some(&canonical) = replacements.get(id) {
                *id = canonical;
            }
        }
        Object::Array(items) => {
            for item in items.iter_mut() {
                rewrite_references(item, replacements);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                rewrite_references(value, replacements);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                rewrite_references(value, replacements);
            }
        }
        _ => {}
    }
}

/// Unambiguous byte encoding of an object's structure. Dictionary keys are
/// sorted so insertion order does not matter.
fn fingerprint(object: &Object, out: &mut Vec<u8>) {
    match object {
        Object::Null => out.push(b'n'),
        Object::Boolean(value) => {
            out.push(b'b');
            out.push(*value as u8);
        }
        Object::Integer(value) => {
            out.push(b'i');
            out.extend_from_slice(&value.to_be_bytes());
        }
        Object::Real(value) => {
            out.push(b'r');
            out.extend_from_slice(&value.to_bits().to_be_bytes());
        }
        Object::Name(name) => {
            out.push(b'/');
            push_bytes(out, name);
        }
        Object::String(bytes, format) => {
            out.push(b's');
            out.push(matches!(format, StringFormat::Hexadecimal) as u8);
            push_bytes(out, bytes);
        }
        Object::Array(items) => {
            out.push(b'[');
            out.extend_from_slice(&(items.len() as u64).to_be_bytes());
            for item in items {
                fingerprint(item, out);
            }
        }
        Object::Dictionary(dict) => {
            out.push(b'<');
            fingerprint_dict(dict, out);
        }
        Object::Stream(stream) => {
            out.push(b'S');
            fingerprint_dict(&stream.dict, out);
            push_bytes(out, &stream.content);
        }
        Object::Reference((number, generation)) => {
            out.push(b'R');
            out.extend_from_slice(&number.to_be_bytes());
            out.extend_from_slice(&generation.to_be_bytes());
        }
    }
}

fn fingerprint_dict(dict: &lopdf::Dictionary, out: &mut Vec<u8>) {
    let mut entries: Vec<(&Vec<u8>, &Object)> = dict.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    out.extend_from_slice(&(entries.len() as u64).to_be_bytes());
    for (key, value) in entries {
        push_bytes(out, key);
        fingerprint(value, out);
    }
}

fn push_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{create_test_pdf, create_verbose_pdf, page_markers};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_savings_percent_rounding() {
        assert_eq!(savings_percent(1000, 750), 25.0);
        assert_eq!(savings_percent(3, 2), 33.3);
        assert_eq!(savings_percent(1000, 1000), 0.0);
    }

    #[test]
    fn test_savings_percent_can_be_negative() {
        assert_eq!(savings_percent(100, 150), -50.0);
    }

    #[test]
    fn test_savings_percent_zero_original() {
        assert_eq!(savings_percent(0, 10), 0.0);
    }

    #[test]
    fn test_quality_tier_parsing() {
        assert_eq!("low".parse::<QualityTier>().unwrap(), QualityTier::Low);
        assert_eq!(" HIGH ".parse::<QualityTier>().unwrap(), QualityTier::High);
        assert!("ultra".parse::<QualityTier>().is_err());
        assert_eq!(QualityTier::default(), QualityTier::Medium);
    }

    #[test]
    fn test_tier_profiles() {
        assert_eq!(QualityTier::Low.profile(), EncodingProfile::SharedObjects);
        assert_eq!(QualityTier::Medium.profile(), EncodingProfile::SharedObjects);
        assert_eq!(QualityTier::High.profile(), EncodingProfile::Plain);
    }

    #[test]
    fn test_compress_reports_consistent_sizes() {
        let pdf = create_verbose_pdf(6);
        let model = DocumentModel::parse(&pdf).unwrap();

        let outcome = compress(
            CompressJob::new(model, QualityTier::Medium),
            &JobBudget::unbounded(),
        )
        .unwrap();

        assert_eq!(outcome.original_size_bytes, pdf.len() as u64);
        assert_eq!(outcome.compressed_size_bytes, outcome.bytes.len() as u64);
        assert!(outcome.compressed_size_bytes > 0);
        assert_eq!(
            outcome.savings_percent,
            savings_percent(outcome.original_size_bytes, outcome.compressed_size_bytes)
        );
        // Duplicated uncompressed content streams collapse and deflate well.
        assert!(outcome.compressed_size_bytes < outcome.original_size_bytes);
    }

    #[test]
    fn test_every_tier_keeps_pages_in_order() {
        let pdf = create_test_pdf(3, "Tier");
        for tier in [QualityTier::Low, QualityTier::Medium, QualityTier::High] {
            let model = DocumentModel::parse(&pdf).unwrap();
            let outcome = compress(CompressJob::new(model, tier), &JobBudget::unbounded()).unwrap();
            assert_eq!(
                page_markers(&outcome.bytes),
                vec!["Tier-Page-1", "Tier-Page-2", "Tier-Page-3"]
            );
        }
    }

    #[test]
    fn test_shared_objects_collapse_duplicates() {
        let model = DocumentModel::parse(&create_verbose_pdf(4)).unwrap();
        let shared = model.to_bytes(EncodingProfile::SharedObjects).unwrap();
        let plain = model.to_bytes(EncodingProfile::Plain).unwrap();

        // Object and xref stream containers are writer artifacts, not content.
        let content_objects = |doc: &Document| {
            doc.objects
                .values()
                .filter(|obj| {
                    !obj.as_stream()
                        .map(|s| s.dict.has_type(b"ObjStm") || s.dict.has_type(b"XRef"))
                        .unwrap_or(false)
                })
                .count()
        };
        let shared_doc = Document::load_mem(&shared).unwrap();
        let plain_doc = Document::load_mem(&plain).unwrap();
        assert!(content_objects(&shared_doc) < content_objects(&plain_doc));
        assert_eq!(shared_doc.get_pages().len(), 4);
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_low_and_medium_write_object_streams() {
        let pdf = create_verbose_pdf(3);
        for tier in [QualityTier::Low, QualityTier::Medium] {
            let model = DocumentModel::parse(&pdf).unwrap();
            let outcome = compress(CompressJob::new(model, tier), &JobBudget::unbounded()).unwrap();
            assert!(contains(&outcome.bytes, b"/ObjStm"), "{:?}", tier);
            assert_eq!(page_markers(&outcome.bytes).len(), 3);
        }
    }

    #[test]
    fn test_high_writes_no_object_streams() {
        let model = DocumentModel::parse(&create_verbose_pdf(3)).unwrap();
        let outcome = compress(
            CompressJob::new(model, QualityTier::High),
            &JobBudget::unbounded(),
        )
        .unwrap();
        assert!(!contains(&outcome.bytes, b"/ObjStm"));
        assert!(contains(&outcome.bytes, b"xref"));
    }

    #[test]
    fn test_compress_empty_document_adds_no_page() {
        let bytes = DocumentModel::empty()
            .into_bytes(EncodingProfile::Plain)
            .unwrap();
        let model = DocumentModel::parse(&bytes).unwrap();
        let outcome = compress(
            CompressJob::new(model, QualityTier::Low),
            &JobBudget::unbounded(),
        )
        .unwrap();
        let reparsed = DocumentModel::parse(&outcome.bytes).unwrap();
        assert_eq!(reparsed.page_count(), 0);
    }

    #[test]
    fn test_compress_honours_cancellation() {
        let model = DocumentModel::parse(&create_test_pdf(2, "Cancel")).unwrap();
        let budget = JobBudget::unbounded();
        budget.token().cancel();
        let result = compress(CompressJob::new(model, QualityTier::High), &budget);
        assert!(matches!(result, Err(PdfToolsError::Budget(_))));
    }

    #[test]
    fn test_fingerprint_ignores_key_order() {
        let a = Object::Dictionary(lopdf::Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Font".to_vec())),
            ("BaseFont", Object::Name(b"Helvetica".to_vec())),
        ]));
        let b = Object::Dictionary(lopdf::Dictionary::from_iter(vec![
            ("BaseFont", Object::Name(b"Helvetica".to_vec())),
            ("Type", Object::Name(b"Font".to_vec())),
        ]));
        let (mut fa, mut fb) = (Vec::new(), Vec::new());
        fingerprint(&a, &mut fa);
        fingerprint(&b, &mut fb);
        assert_eq!(fa, fb);
    }
}
