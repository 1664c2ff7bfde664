//! Core data models used throughout askdb.
//!
//! These types represent the discovered database schema, the indexed
//! documents, and the query results that flow through the routing and
//! retrieval pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Point-in-time description of a connected database.
///
/// Rebuilt on every `connect` and cached under a fixed key; at most one
/// snapshot is active system-wide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub tables: Vec<TableInfo>,
    pub relationships: Vec<Relationship>,
    pub summary: SchemaSummary,
}

/// Aggregate counts reported alongside a schema snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSummary {
    pub total_tables: usize,
    pub total_columns: usize,
    pub total_relationships: usize,
    pub database_type: String,
}

/// A single table with its inferred purpose, columns, and sample rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub purpose: String,
    pub columns: Vec<ColumnInfo>,
    /// Up to 5 rows, each a column-keyed JSON object.
    pub sample_data: Vec<serde_json::Value>,
}

/// A column as reported by the source database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

/// Directed foreign-key edge between two tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

/// An indexed document. Ids are dense sequential integers assigned at
/// ingestion time and are never reused or reordered, including across
/// index reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: u32,
    /// Basename of the source file.
    pub file: String,
    /// Full extracted text.
    pub text: String,
    /// Normalized keyword set (deduplicated, deterministically ordered).
    pub keywords: BTreeSet<String>,
    /// First 200 characters of the text.
    pub preview: String,
}

/// A ranked match returned from the keyword index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMatch {
    pub id: u32,
    pub file: String,
    pub preview: String,
    /// Count of distinct query keywords present in this document.
    pub score: u32,
    pub matched_keywords: Vec<String>,
}

/// Outcome of an ingestion batch. The batch always completes; per-file
/// failures are counted, never raised.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub processed: usize,
    pub failed: usize,
    pub total_documents: usize,
    pub documents: Vec<IngestedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedFile {
    pub file: String,
    pub keywords_found: usize,
}

/// Routing decision for a free-text query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Sql,
    Document,
    Hybrid,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Sql => "sql",
            QueryType::Document => "document",
            QueryType::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level result of processing one query. The engine's contract is
/// "this endpoint does not throw": internal faults surface here as
/// `query_type: "unknown"` plus an `error` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub query_type: String,
    pub results: serde_json::Value,
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    pub performance: Performance,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Wall-clock metrics recorded on every processed query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Performance {
    /// Elapsed seconds, rounded to 3 decimals.
    pub response_time: f64,
}

/// Lifecycle state of a background ingestion job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub status: JobState,
    pub progress: f64,
    pub processed: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<IngestReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Processing,
    Completed,
    Failed,
}

/// One entry in the bounded query history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub query: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub query_type: String,
}
