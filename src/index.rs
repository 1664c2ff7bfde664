//! Keyword-based document index.
//!
//! Extracts text from uploaded documents, builds an inverted index of
//! lowercase keyword → document-id posting list, persists the whole index as
//! a single JSON file, and serves ranked search. Scoring is the count of
//! distinct query keywords a document contains; ties break by ascending
//! document id so results are deterministic across runs.
//!
//! The index is append-only: re-ingesting the same file creates a new
//! document id and new postings rather than replacing the prior version.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::extract::{FileExtractor, TextExtractor};
use crate::models::{Document, DocumentMatch, IngestReport, IngestedFile};

/// Common English function words dropped during keyword extraction.
const STOPWORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "and", "a", "an", "as", "are", "was", "were", "been", "be",
    "have", "has", "had", "do", "does", "did", "will", "would", "should", "could", "may", "might",
    "must", "can", "this", "that", "these", "those", "with", "from", "for", "but", "not", "all",
    "any", "some", "such", "into", "just", "than", "very", "too", "also", "only", "then", "when",
    "where", "how", "why",
];

/// Preview length in characters.
const PREVIEW_CHARS: usize = 200;

/// Documents plus postings, serialized together so a reload reconstructs
/// both atomically from the same file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexState {
    documents: Vec<Document>,
    postings: HashMap<String, Vec<u32>>,
}

/// In-process keyword index over uploaded documents.
///
/// Mutated only by the ingestion path; concurrent searches during an
/// in-flight batch may observe a partially-appended index, which is
/// acceptable because ingestion never rewrites existing entries.
pub struct KeywordDocumentIndex {
    state: RwLock<IndexState>,
    index_file: PathBuf,
    extractor: Box<dyn TextExtractor>,
}

impl KeywordDocumentIndex {
    /// Opens the index at `index_file`, loading any previously persisted
    /// state. A missing or unreadable file starts the index empty.
    pub fn open(index_file: &Path) -> Self {
        Self::open_with_extractor(index_file, Box::new(FileExtractor))
    }

    pub fn open_with_extractor(index_file: &Path, extractor: Box<dyn TextExtractor>) -> Self {
        let state = match load_state(index_file) {
            Ok(Some(state)) => {
                tracing::info!(
                    documents = state.documents.len(),
                    "loaded keyword index from {}",
                    index_file.display()
                );
                state
            }
            Ok(None) => IndexState::default(),
            Err(e) => {
                // Fail open to an empty index; there is no corruption
                // recovery beyond this.
                tracing::warn!("could not load keyword index: {}; starting empty", e);
                IndexState::default()
            }
        };

        Self {
            state: RwLock::new(state),
            index_file: index_file.to_path_buf(),
            extractor,
        }
    }

    /// Processes a batch of files. Each file is handled independently: an
    /// extraction failure increments `failed` and the batch continues.
    pub async fn ingest(&self, paths: &[PathBuf]) -> IngestReport {
        let mut report = IngestReport::default();
        let mut state = self.state.write().await;

        for path in paths {
            let text = match self.extractor.extract(path) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("error processing {}: {}", path.display(), e);
                    report.failed += 1;
                    continue;
                }
            };

            let keywords = extract_keywords(&text);
            let doc_id = state.documents.len() as u32;
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            for keyword in &keywords {
                state.postings.entry(keyword.clone()).or_default().push(doc_id);
            }

            report.processed += 1;
            report.documents.push(IngestedFile {
                file: file.clone(),
                keywords_found: keywords.len(),
            });

            state.documents.push(Document {
                id: doc_id,
                file,
                preview: make_preview(&text),
                keywords,
                text,
            });
        }

        report.total_documents = state.documents.len();

        if let Err(e) = save_state(&self.index_file, &state) {
            tracing::error!("error saving keyword index: {}", e);
        }

        tracing::info!(processed = report.processed, failed = report.failed, "ingest batch done");
        report
    }

    /// Ranked keyword search. Returns at most `top_k` matches, best first.
    pub async fn search(&self, query: &str, top_k: usize) -> Vec<DocumentMatch> {
        let query_keywords = extract_keywords(query);
        if query_keywords.is_empty() {
            return Vec::new();
        }

        let state = self.state.read().await;
        let mut scores: HashMap<u32, u32> = HashMap::new();
        for keyword in &query_keywords {
            if let Some(ids) = state.postings.get(keyword) {
                for id in ids {
                    *scores.entry(*id).or_insert(0) += 1;
                }
            }
        }

        let mut ranked: Vec<(u32, u32)> = scores.into_iter().collect();
        // Score desc, then id asc for deterministic ties.
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(top_k);

        ranked
            .into_iter()
            .filter_map(|(doc_id, score)| {
                let doc = state.documents.get(doc_id as usize)?;
                let matched_keywords = query_keywords
                    .iter()
                    .filter(|kw| doc.keywords.contains(*kw))
                    .cloned()
                    .collect();
                Some(DocumentMatch {
                    id: doc.id,
                    file: doc.file.clone(),
                    preview: doc.preview.clone(),
                    score,
                    matched_keywords,
                })
            })
            .collect()
    }

    /// Number of documents currently indexed.
    pub async fn document_count(&self) -> usize {
        self.state.read().await.documents.len()
    }
}

/// Extracts the normalized keyword set from free text: runs of 3+ ASCII
/// alphabetic characters, lowercased, minus stopwords.
pub fn extract_keywords(text: &str) -> BTreeSet<String> {
    let mut keywords = BTreeSet::new();
    let mut current = String::new();

    for ch in text.chars().chain(std::iter::once(' ')) {
        if ch.is_ascii_alphabetic() {
            current.push(ch.to_ascii_lowercase());
        } else if !current.is_empty() {
            if current.len() > 2 && !STOPWORDS.contains(&current.as_str()) {
                keywords.insert(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
    }

    keywords
}

fn make_preview(text: &str) -> String {
    let preview: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        format!("{}...", preview)
    } else {
        preview
    }
}

fn load_state(path: &Path) -> anyhow::Result<Option<IndexState>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

fn save_state(path: &Path, state: &IndexState) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string(state)?;
    std::fs::write(path, content)?;
    Ok(())
}
