// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF merger — concatenate ordered single-page (or multi-page) documents into
// one document using the `lopdf` crate. Page objects are copied verbatim; no
// content stream is decoded or re-encoded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, ObjectId};
use scanprep_core::error::{Result, ScanprepError};
use tracing::{debug, info, instrument, warn};

use crate::pdf::order::PageOrderer;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Result of merging a directory of page documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    /// Where the merged document was written.
    pub output: PathBuf,
    /// Input files, in merge order.
    pub inputs: Vec<PathBuf>,
    /// Pages in the merged document.
    pub pages: usize,
}

/// Concatenates documents page by page, preserving order and content.
pub struct PageMerger {
    /// PDF version written to the merged document header.
    version: String,
}

impl Default for PageMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl PageMerger {
    pub fn new() -> Self {
        Self {
            version: "1.5".to_string(),
        }
    }

    /// Override the PDF header version of merged output.
    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    // -- Merging --------------------------------------------------------------

    /// Merge `documents` in the given order into a new document.
    ///
    /// Every page of every input appears exactly once, inputs in sequence and
    /// pages in their source order. An empty sequence is an error.
    #[instrument(skip_all, fields(inputs = documents.len()))]
    pub fn merge(&self, documents: &[Document]) -> Result<Document> {
        if documents.is_empty() {
            return Err(ScanprepError::EmptyInput);
        }

        let mut target = Document::with_version(self.version.as_str());
        let pages_id = target.new_object_id();
        let mut kids: Vec<Object> = Vec::new();

        for (index, source) in documents.iter().enumerate() {
            // Object ids are only meaningful within one source, so the
            // already-copied map is per document.
            let mut copied: HashMap<ObjectId, ObjectId> = HashMap::new();
            let source_pages = source.get_pages();
            if source_pages.is_empty() {
                warn!(input = index + 1, "Input document has no pages");
            }
            // Every page gets its id up front so links between pages of the
            // same source resolve to the page copy.
            for page_id in source_pages.values() {
                copied.insert(*page_id, target.new_object_id());
            }
            // `get_pages` is keyed by 1-based page number, so BTreeMap order
            // is reading order.
            for page_id in source_pages.values() {
                let new_id = copy_page(source, &mut target, *page_id, pages_id, &mut copied)?;
                kids.push(Object::Reference(new_id));
            }
            debug!(
                input = index + 1,
                pages = source_pages.len(),
                "Input document appended"
            );
        }

        let page_count = kids.len();
        let mut pages_dict = Dictionary::new();
        pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
        pages_dict.set("Count", Object::Integer(page_count as i64));
        pages_dict.set("Kids", Object::Array(kids));
        target.objects.insert(pages_id, Object::Dictionary(pages_dict));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        let catalog_id = target.add_object(Object::Dictionary(catalog));
        target.trailer.set("Root", Object::Reference(catalog_id));

        info!(pages = page_count, "Documents merged");
        Ok(target)
    }

    /// Merge serialised PDFs and return the serialised result.
    #[instrument(skip_all, fields(inputs = inputs.len()))]
    pub fn merge_bytes(&self, inputs: &[&[u8]]) -> Result<Vec<u8>> {
        let documents = inputs
            .iter()
            .enumerate()
            .map(|(index, bytes)| {
                Document::load_mem(bytes).map_err(|err| {
                    ScanprepError::PdfError(format!(
                        "failed to load input PDF #{}: {}",
                        index + 1,
                        err
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut merged = self.merge(&documents)?;
        serialise(&mut merged)
    }

    /// Load each path in order and merge them.
    pub fn merge_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Document> {
        let documents = paths
            .iter()
            .map(|path| load_document(path.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        self.merge(&documents)
    }

    /// Order the `*.pdf` files in `dir`, merge them, and write the result to
    /// `dir/<sentinel>`. The sentinel itself is never an input.
    #[instrument(skip(self), fields(dir = %dir.as_ref().display()))]
    pub fn merge_directory(&self, dir: impl AsRef<Path>, sentinel: &str) -> Result<MergeSummary> {
        let dir = dir.as_ref();
        let inputs = PageOrderer::with_sentinel(sentinel).order_directory(dir, &["pdf"])?;
        if inputs.is_empty() {
            return Err(ScanprepError::EmptyInput);
        }
        info!(inputs = inputs.len(), "Merging PDFs in order");

        let mut merged = self.merge_files(&inputs)?;
        let pages = merged.get_pages().len();
        let output = dir.join(sentinel);
        let bytes = serialise(&mut merged)?;
        std::fs::write(&output, &bytes)?;

        info!(output = %output.display(), pages, "Merged PDF written");
        Ok(MergeSummary {
            output,
            inputs,
            pages,
        })
    }
}

// -- Helpers ------------------------------------------------------------------

/// Open a PDF from disk. A missing file is reported as such rather than as a
/// parse failure.
pub fn load_document(path: &Path) -> Result<Document> {
    if !path.is_file() {
        return Err(ScanprepError::InputNotFound(path.display().to_string()));
    }
    Document::load(path).map_err(|err| {
        ScanprepError::PdfError(format!("failed to open {}: {}", path.display(), err))
    })
}

/// Serialise a document to bytes.
pub fn serialise(document: &mut Document) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    document.save_to(&mut output).map_err(|err| {
        ScanprepError::PdfError(format!("failed to serialise merged PDF: {}", err))
    })?;
    Ok(output)
}

/// Copy one page (and everything it references) from `source` into `target`,
/// returning the page's new object id. The copy's `/Parent` points at
/// `parent_id`. Uses the id reserved in `copied` when there is one.
fn copy_page(
    source: &Document,
    target: &mut Document,
    page_id: ObjectId,
    parent_id: ObjectId,
    copied: &mut HashMap<ObjectId, ObjectId>,
) -> Result<ObjectId> {
    let page = source
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|err| {
            ScanprepError::PdfError(format!("cannot read page object {:?}: {}", page_id, err))
        })?;

    let new_id = match copied.get(&page_id) {
        Some(reserved) => *reserved,
        None => {
            let id = target.new_object_id();
            copied.insert(page_id, id);
            id
        }
    };

    let mut page_dict = Dictionary::new();
    for (key, value) in page.iter() {
        if key == b"Parent" {
            continue;
        }
        page_dict.set(key.clone(), deep_copy(source, target, value, copied)?);
    }

    for key in INHERITABLE_KEYS {
        if page_dict.has(key) {
            continue;
        }
        if let Some(inherited) = inherited_attribute(source, page, key) {
            page_dict.set(key.to_vec(), deep_copy(source, target, inherited, copied)?);
        }
    }

    page_dict.set("Parent", Object::Reference(parent_id));
    target.objects.insert(new_id, Object::Dictionary(page_dict));
    Ok(new_id)
}

/// Walk the `/Parent` chain of a page looking for an inheritable attribute.
fn inherited_attribute<'a>(source: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut node = page;
    // Page trees are shallow; the bound only guards against malformed cycles.
    for _ in 0..64 {
        let parent_id = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = source.get_object(parent_id).and_then(Object::as_dict).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
    }
    None
}

/// Deep-copy an object into `target`, following references. Objects reached
/// more than once are copied once.
fn deep_copy(
    source: &Document,
    target: &mut Document,
    object: &Object,
    copied: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Object> {
    match object {
        Object::Dictionary(dict) => Ok(Object::Dictionary(copy_dictionary(
            source, target, dict, copied,
        )?)),
        Object::Array(items) => {
            let mut new_items = Vec::with_capacity(items.len());
            for item in items {
                new_items.push(deep_copy(source, target, item, copied)?);
            }
            Ok(Object::Array(new_items))
        }
        Object::Reference(ref_id) => {
            if let Some(existing) = copied.get(ref_id) {
                return Ok(Object::Reference(*existing));
            }
            match source.get_object(*ref_id) {
                Ok(referenced) => {
                    let new_id = target.new_object_id();
                    copied.insert(*ref_id, new_id);
                    let cloned = deep_copy(source, target, referenced, copied)?;
                    target.objects.insert(new_id, cloned);
                    Ok(Object::Reference(new_id))
                }
                Err(err) => {
                    warn!(?ref_id, %err, "Cannot resolve reference, using Null");
                    Ok(Object::Null)
                }
            }
        }
        Object::Stream(stream) => {
            // Keep the encoded bytes and filter entries exactly as they are.
            let mut new_stream = stream.clone();
            new_stream.dict = copy_dictionary(source, target, &stream.dict, copied)?;
            Ok(Object::Stream(new_stream))
        }
        other => Ok(other.clone()),
    }
}

fn copy_dictionary(
    source: &Document,
    target: &mut Document,
    dict: &Dictionary,
    copied: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Dictionary> {
    let mut new_dict = Dictionary::new();
    for (key, value) in dict.iter() {
        new_dict.set(key.clone(), deep_copy(source, target, value, copied)?);
    }
    Ok(new_dict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{Stream, dictionary};

    /// Build a PDF whose pages each draw one label, with the MediaBox set on
    /// the page tree root so pages must inherit it.
    fn labelled_pdf(labels: &[&str]) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for label in labels {
            let content = format!("BT /F1 24 Tf 72 720 Td ({label}) Tj ET").into_bytes();
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn page_contents(doc: &Document) -> Vec<String> {
        doc.get_pages()
            .values()
            .map(|id| String::from_utf8(doc.get_page_content(*id).unwrap()).unwrap())
            .collect()
    }

    /// Two pages; the first carries a link to the second and a text note
    /// whose popup points back at it through `/Parent`.
    fn linked_pdf() -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let first_id = doc.new_object_id();
        let second_id = doc.new_object_id();

        let link_id = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
            "Rect" => vec![0.into(), 0.into(), 50.into(), 20.into()],
            "Dest" => vec![second_id.into(), "Fit".into()],
        });
        let note_id = doc.new_object_id();
        let popup_id = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Popup",
            "Parent" => note_id,
        });
        doc.objects.insert(
            note_id,
            Object::Dictionary(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Text",
                "P" => first_id,
                "Popup" => popup_id,
            }),
        );

        for (page_id, label) in [(first_id, "front"), (second_id, "back")] {
            let content = format!("BT ({label}) Tj ET").into_bytes();
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            };
            if page_id == first_id {
                page.set("Annots", vec![link_id.into(), note_id.into(), popup_id.into()]);
            }
            doc.objects.insert(page_id, Object::Dictionary(page));
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![first_id.into(), second_id.into()],
                "Count" => 2_i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn annotation(doc: &Document, page_id: ObjectId, index: usize) -> (ObjectId, &Dictionary) {
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let annots = page.get(b"Annots").unwrap().as_array().unwrap();
        let id = annots[index].as_reference().unwrap();
        (id, doc.get_object(id).unwrap().as_dict().unwrap())
    }

    #[test]
    fn empty_input_is_an_error() {
        let err = PageMerger::new().merge(&[]).unwrap_err();
        assert!(matches!(err, ScanprepError::EmptyInput));
    }

    #[test]
    fn merge_keeps_every_page_in_order() {
        let inputs: Vec<Document> = ["one", "two", "three", "four"]
            .iter()
            .map(|label| labelled_pdf(&[label]))
            .collect();
        let expected: Vec<String> = inputs.iter().flat_map(page_contents).collect();

        let merged = PageMerger::new().merge(&inputs).unwrap();
        assert_eq!(merged.get_pages().len(), 4);
        assert_eq!(page_contents(&merged), expected);
    }

    #[test]
    fn multi_page_inputs_keep_internal_order() {
        let inputs = vec![labelled_pdf(&["a1", "a2"]), labelled_pdf(&["b1"])];
        let merged = PageMerger::new().merge(&inputs).unwrap();
        let contents = page_contents(&merged);
        assert_eq!(contents.len(), 3);
        assert!(contents[0].contains("(a1)"));
        assert!(contents[1].contains("(a2)"));
        assert!(contents[2].contains("(b1)"));
    }

    #[test]
    fn inherited_attributes_are_materialised() {
        let merged = PageMerger::new().merge(&[labelled_pdf(&["x"])]).unwrap();
        let page_id = *merged.get_pages().values().next().unwrap();
        let page = merged.get_object(page_id).unwrap().as_dict().unwrap();
        assert!(page.has(b"MediaBox"));
        assert!(page.has(b"Resources"));
    }

    #[test]
    fn links_between_pages_point_at_the_page_copies() {
        let merged = PageMerger::new()
            .merge(&[labelled_pdf(&["cover"]), linked_pdf()])
            .unwrap();
        let pages: Vec<ObjectId> = merged.get_pages().values().copied().collect();
        assert_eq!(pages.len(), 3);

        let (_, link) = annotation(&merged, pages[1], 0);
        let dest = link.get(b"Dest").unwrap().as_array().unwrap();
        assert_eq!(dest[0].as_reference().unwrap(), pages[2]);

        let page_objects = merged
            .objects
            .values()
            .filter_map(|object| object.as_dict().ok())
            .filter(|dict| {
                dict.get(b"Type").and_then(Object::as_name).ok() == Some(b"Page".as_slice())
            })
            .count();
        assert_eq!(page_objects, 3);
    }

    #[test]
    fn annotation_parents_survive_the_copy() {
        let merged = PageMerger::new().merge(&[linked_pdf()]).unwrap();
        let first = *merged.get_pages().values().next().unwrap();

        let (note_id, note) = annotation(&merged, first, 1);
        let (_, popup) = annotation(&merged, first, 2);
        assert_eq!(popup.get(b"Parent").unwrap().as_reference().unwrap(), note_id);
        assert_eq!(note.get(b"P").unwrap().as_reference().unwrap(), first);
    }

    #[test]
    fn merged_bytes_round_trip_through_loader() {
        let mut a = labelled_pdf(&["first"]);
        let mut b = labelled_pdf(&["second"]);
        let a_bytes = serialise(&mut a).unwrap();
        let b_bytes = serialise(&mut b).unwrap();

        let merged = PageMerger::new()
            .merge_bytes(&[a_bytes.as_slice(), b_bytes.as_slice()])
            .unwrap();
        let reloaded = Document::load_mem(&merged).unwrap();
        let contents = page_contents(&reloaded);
        assert_eq!(contents.len(), 2);
        assert!(contents[0].contains("(first)"));
        assert!(contents[1].contains("(second)"));
    }

    #[test]
    fn garbage_input_is_a_pdf_error() {
        let err = PageMerger::new()
            .merge_bytes(&[b"not a pdf".as_slice()])
            .unwrap_err();
        assert!(matches!(err, ScanprepError::PdfError(_)));
    }

    #[test]
    fn merge_directory_orders_inputs_and_skips_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        for (name, label) in [("part_2.pdf", "two"), ("part_1.pdf", "one"), ("part_10.pdf", "ten")] {
            let mut doc = labelled_pdf(&[label]);
            std::fs::write(dir.path().join(name), serialise(&mut doc).unwrap()).unwrap();
        }

        let merger = PageMerger::new();
        let summary = merger.merge_directory(dir.path(), "percentage.pdf").unwrap();
        assert_eq!(summary.pages, 3);
        assert_eq!(summary.output, dir.path().join("percentage.pdf"));

        let merged = Document::load(&summary.output).unwrap();
        let contents = page_contents(&merged);
        assert!(contents[0].contains("(one)"));
        assert!(contents[1].contains("(two)"));
        assert!(contents[2].contains("(ten)"));

        // Running again must not fold the previous output back in.
        let again = merger.merge_directory(dir.path(), "percentage.pdf").unwrap();
        assert_eq!(again.pages, 3);
        assert_eq!(again.inputs.len(), 3);
    }

    #[test]
    fn merge_directory_without_pdfs_is_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("percentage.pdf"), b"stale").unwrap();
        let err = PageMerger::new()
            .merge_directory(dir.path(), "percentage.pdf")
            .unwrap_err();
        assert!(matches!(err, ScanprepError::EmptyInput));
    }

    #[test]
    fn missing_file_is_input_error() {
        let err = PageMerger::new()
            .merge_files(&["/nowhere/page_1.pdf"])
            .unwrap_err();
        assert!(matches!(err, ScanprepError::InputNotFound(_)));
    }
}
