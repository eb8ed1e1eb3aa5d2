use crate::classifier::TableClassifier;
use crate::error::{Result, UnderwritingError};
use crate::schema::{ClassifiedBuckets, Document, Table};
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// Page-text capability the text-heuristic tiers read through.
///
/// The core never opens files on its own; callers inject whichever source
/// fits (already-loaded documents, fixtures, plain-text files).
pub trait TextSource: Send + Sync {
    /// Page texts of `source_id`, in page order.
    fn page_texts(&self, source_id: &str) -> Result<Vec<String>>;
}

/// Fixed id → pages mapping.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTextSource {
    pages: HashMap<String, Vec<String>>,
}

impl InMemoryTextSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source<S: Into<String>>(
        mut self,
        source_id: impl Into<String>,
        pages: impl IntoIterator<Item = S>,
    ) -> Self {
        self.pages
            .insert(source_id.into(), pages.into_iter().map(Into::into).collect());
        self
    }
}

impl TextSource for InMemoryTextSource {
    fn page_texts(&self, source_id: &str) -> Result<Vec<String>> {
        self.pages
            .get(source_id)
            .cloned()
            .ok_or_else(|| UnderwritingError::SourceUnavailable {
                source_id: source_id.to_string(),
                details: "no pages registered for this source".to_string(),
            })
    }
}

/// Serves page text from documents an external loader already produced,
/// grouped by `metadata.source` and ordered by page number.
#[derive(Debug, Clone, Default)]
pub struct DocumentTextSource {
    pages: BTreeMap<String, Vec<String>>,
}

impl DocumentTextSource {
    pub fn from_documents(documents: &[Document]) -> Self {
        let mut grouped: BTreeMap<String, Vec<(u32, usize, &str)>> = BTreeMap::new();
        for (order, doc) in documents.iter().enumerate() {
            let Some(source) = doc.metadata.source.as_ref() else {
                debug!("Skipping document #{} without a source for text lookup", order);
                continue;
            };
            if doc.page_content.trim().is_empty() {
                continue;
            }
            grouped.entry(source.clone()).or_default().push((
                doc.metadata.page.unwrap_or(u32::MAX),
                order,
                doc.page_content.as_str(),
            ));
        }

        let pages = grouped
            .into_iter()
            .map(|(source, mut entries)| {
                entries.sort_by_key(|(page, order, _)| (*page, *order));
                let texts = entries.into_iter().map(|(_, _, t)| t.to_string()).collect();
                (source, texts)
            })
            .collect();

        Self { pages }
    }
}

impl TextSource for DocumentTextSource {
    fn page_texts(&self, source_id: &str) -> Result<Vec<String>> {
        self.pages
            .get(source_id)
            .cloned()
            .ok_or_else(|| UnderwritingError::SourceUnavailable {
                source_id: source_id.to_string(),
                details: "no text-bearing documents for this source".to_string(),
            })
    }
}

/// Reads UTF-8 text files, one page per form-feed separated block.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextFileSource;

impl TextSource for PlainTextFileSource {
    fn page_texts(&self, source_id: &str) -> Result<Vec<String>> {
        let raw = fs::read_to_string(Path::new(source_id)).map_err(|e| {
            UnderwritingError::SourceUnavailable {
                source_id: source_id.to_string(),
                details: e.to_string(),
            }
        })?;
        Ok(raw.split('\u{0c}').map(str::to_string).collect())
    }
}

/// Cleans and classifies every table attached to `documents`.
pub fn extract_tables_from_documents(
    documents: &[Document],
    classifier: &TableClassifier,
) -> ClassifiedBuckets {
    let tables: Vec<Table> = documents
        .iter()
        .filter_map(|d| d.table.clone())
        .filter(|t| !t.is_empty())
        .collect();

    let buckets = classifier.bucket_tables(tables);
    info!(
        "Classified {} tables: {} rent roll, {} t12, {} other",
        buckets.len(),
        buckets.rent_roll.len(),
        buckets.t12.len(),
        buckets.other.len()
    );
    buckets
}

/// Distinct `metadata.source` values, first-seen order.
pub fn fallback_sources_from_documents(documents: &[Document]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for doc in documents {
        if let Some(source) = &doc.metadata.source {
            if !sources.contains(source) {
                sources.push(source.clone());
            }
        }
    }
    sources
}

/// Like [`fallback_sources_from_documents`], but only sources with at least
/// one non-blank page. Table-only sources have nothing for the text tiers.
pub fn text_bearing_sources(documents: &[Document]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for doc in documents {
        if doc.page_content.trim().is_empty() {
            continue;
        }
        if let Some(source) = &doc.metadata.source {
            if !sources.contains(source) {
                sources.push(source.clone());
            }
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DocumentMetadata;
    use std::io::Write;

    #[test]
    fn test_document_text_source_orders_pages() {
        let docs = vec![
            Document::from_text("a.pdf", 2, "second"),
            Document::from_text("b.pdf", 1, "other file"),
            Document::from_text("a.pdf", 1, "first"),
            Document::from_text("a.pdf", 3, "   "),
        ];
        let source = DocumentTextSource::from_documents(&docs);
        assert_eq!(source.page_texts("a.pdf").unwrap(), vec!["first", "second"]);
        assert_eq!(source.page_texts("b.pdf").unwrap(), vec!["other file"]);
        assert!(matches!(
            source.page_texts("missing.pdf"),
            Err(UnderwritingError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_fallback_sources_dedupe_in_order() {
        let docs = vec![
            Document::from_text("b.pdf", 1, "x"),
            Document::from_text("a.pdf", 1, "x"),
            Document::from_text("b.pdf", 2, "x"),
            Document {
                metadata: DocumentMetadata::default(),
                ..Default::default()
            },
        ];
        assert_eq!(fallback_sources_from_documents(&docs), vec!["b.pdf", "a.pdf"]);
    }

    #[test]
    fn test_text_bearing_sources_skip_table_only_files() {
        let docs = vec![
            Document::from_table("rent_roll.xlsx", Table::new(["Tenant"]).with_row(["Acme"])),
            Document::from_text("om.pdf", 1, "  "),
            Document::from_text("t12.pdf", 1, "Net Operating Income 325,000"),
            Document::from_text("om.pdf", 2, "Oak Plaza"),
        ];
        assert_eq!(
            fallback_sources_from_documents(&docs),
            vec!["rent_roll.xlsx", "om.pdf", "t12.pdf"]
        );
        assert_eq!(text_bearing_sources(&docs), vec!["t12.pdf", "om.pdf"]);

        let source = DocumentTextSource::from_documents(&docs);
        for id in text_bearing_sources(&docs) {
            assert!(source.page_texts(&id).is_ok());
        }
    }

    #[test]
    fn test_extract_tables_buckets_attached_tables() {
        let rent_roll = Table::new(["Tenant", "Suite", "Rent"]).with_row(["Acme", "100", "1,000"]);
        let docs = vec![
            Document::from_table("rr.xlsx", rent_roll),
            Document::from_text("om.pdf", 1, "narrative only"),
            Document::from_table("empty.csv", Table::default()),
        ];
        let buckets = extract_tables_from_documents(&docs, &TableClassifier::default());
        assert_eq!(buckets.rent_roll.len(), 1);
        assert_eq!(buckets.len(), 1);
    }

    #[test]
    fn test_plain_text_file_splits_on_form_feed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "page one\u{0c}page two").unwrap();
        let path = file.path().to_string_lossy().into_owned();
        let pages = PlainTextFileSource.page_texts(&path).unwrap();
        assert_eq!(pages, vec!["page one", "page two"]);

        let missing = PlainTextFileSource.page_texts("/definitely/not/here.txt");
        assert!(matches!(missing, Err(UnderwritingError::SourceUnavailable { .. })));
    }
}
