//! In-memory stores for ingestion jobs and query history.
//!
//! Both are explicit capabilities rather than process globals so a
//! persistent backend can replace them without touching callers. Job
//! records follow "the background task's final write wins"; history is
//! bounded to the most recent entries at insertion time.

use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::{HistoryEntry, IngestReport, JobState, JobStatus};

/// Entries retained in the query history.
const HISTORY_LIMIT: usize = 50;

/// Tracks background ingestion jobs by id.
#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<String, JobStatus>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly started job.
    pub async fn start(&self, job_id: &str, total: usize) {
        let status = JobStatus {
            status: JobState::Processing,
            progress: 0.0,
            processed: 0,
            total,
            details: None,
            error: None,
        };
        self.jobs.write().await.insert(job_id.to_string(), status);
    }

    /// Final write for a successful batch.
    pub async fn complete(&self, job_id: &str, report: IngestReport) {
        let status = JobStatus {
            status: JobState::Completed,
            progress: 1.0,
            processed: report.processed,
            total: report.processed + report.failed,
            details: Some(report),
            error: None,
        };
        self.jobs.write().await.insert(job_id.to_string(), status);
    }

    /// Final write for a batch that failed outright. The batch size from
    /// `start` is carried through so the record still says how many files
    /// the job covered.
    pub async fn fail(&self, job_id: &str, error: String) {
        let mut jobs = self.jobs.write().await;
        let total = jobs.get(job_id).map(|j| j.total).unwrap_or(0);
        let status = JobStatus {
            status: JobState::Failed,
            progress: 0.0,
            processed: 0,
            total,
            details: None,
            error: Some(error),
        };
        jobs.insert(job_id.to_string(), status);
    }

    pub async fn get(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs.read().await.get(job_id).cloned()
    }
}

/// Bounded record of processed queries, newest first on read.
#[derive(Default)]
pub struct QueryHistory {
    entries: RwLock<Vec<HistoryEntry>>,
}

impl QueryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, query: &str, query_type: &str) {
        let mut entries = self.entries.write().await;
        entries.push(HistoryEntry {
            query: query.to_string(),
            timestamp: chrono::Utc::now(),
            query_type: query_type.to_string(),
        });
        // Retention enforced on insert, not by a truncating read.
        if entries.len() > HISTORY_LIMIT {
            let excess = entries.len() - HISTORY_LIMIT;
            entries.drain(..excess);
        }
    }

    /// Recent entries, most recent first.
    pub async fn recent(&self) -> Vec<HistoryEntry> {
        let entries = self.entries.read().await;
        entries.iter().rev().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn job_lifecycle_final_write_wins() {
        let store = JobStore::new();
        store.start("job-1", 3).await;
        assert_eq!(store.get("job-1").await.unwrap().status, JobState::Processing);

        let report = IngestReport {
            processed: 2,
            failed: 1,
            total_documents: 2,
            documents: vec![],
        };
        store.complete("job-1", report).await;

        let status = store.get("job-1").await.unwrap();
        assert_eq!(status.status, JobState::Completed);
        assert_eq!(status.processed, 2);
        assert_eq!(status.total, 3);
        assert!((status.progress - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn failed_job_carries_error() {
        let store = JobStore::new();
        store.start("job-2", 1).await;
        store.fail("job-2", "disk full".to_string()).await;

        let status = store.get("job-2").await.unwrap();
        assert_eq!(status.status, JobState::Failed);
        assert_eq!(status.error.as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn failed_job_keeps_batch_size() {
        let store = JobStore::new();
        store.start("job-3", 4).await;
        store.fail("job-3", "extraction panicked".to_string()).await;

        let status = store.get("job-3").await.unwrap();
        assert_eq!(status.total, 4);
        assert_eq!(status.processed, 0);
    }

    #[tokio::test]
    async fn unknown_job_is_none() {
        let store = JobStore::new();
        assert!(store.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn history_is_bounded_and_newest_first() {
        let history = QueryHistory::new();
        for i in 0..60 {
            history.push(&format!("query {}", i), "sql").await;
        }

        let recent = history.recent().await;
        assert_eq!(recent.len(), HISTORY_LIMIT);
        assert_eq!(recent[0].query, "query 59");
        assert_eq!(recent.last().unwrap().query, "query 10");
    }
}
