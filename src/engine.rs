//! Query processing engine.
//!
//! Classifies a free-text query, routes it to the SQL path (schema +
//! generator + validation + execution), the document path (keyword index),
//! or both, merges the results, and records wall-clock timing. The SQL
//! handler's output is cached under a deterministic key derived from the
//! handler name and its arguments.
//!
//! `process` never returns an error: any fault that escapes the handlers is
//! folded into a degraded result with `query_type: "unknown"` so the top
//! boundary responds on every input.

use serde_json::{json, Value};
use sqlx::AnyPool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::{cache_key, Cache};
use crate::classify::classify;
use crate::index::KeywordDocumentIndex;
use crate::models::{Performance, QueryResult, QueryType, SchemaDescription};
use crate::schema::row_to_json;
use crate::sqlgen::{self, SqlGenerator};

/// Matches returned for the document path of a query.
const DOC_TOP_K: usize = 5;

pub struct QueryEngine {
    pool: AnyPool,
    schema: SchemaDescription,
    index: Arc<KeywordDocumentIndex>,
    generator: Arc<dyn SqlGenerator>,
    cache: Arc<dyn Cache>,
    /// TTL applied to cached SQL handler results.
    sql_ttl: Duration,
}

impl QueryEngine {
    pub fn new(
        pool: AnyPool,
        schema: SchemaDescription,
        index: Arc<KeywordDocumentIndex>,
        generator: Arc<dyn SqlGenerator>,
        cache: Arc<dyn Cache>,
        sql_ttl: Duration,
    ) -> Self {
        Self {
            pool,
            schema,
            index,
            generator,
            cache,
            sql_ttl,
        }
    }

    /// Processes one natural-language query. Always responds; faults become
    /// a degraded result rather than an error.
    pub async fn process(&self, query: &str) -> QueryResult {
        let started = Instant::now();

        let mut result = match self.dispatch(query).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("query processing error: {}", e);
                QueryResult {
                    query: query.to_string(),
                    query_type: "unknown".to_string(),
                    results: Value::Null,
                    sources: Vec::new(),
                    sql: None,
                    row_count: None,
                    performance: Performance::default(),
                    cached: false,
                    error: Some(e.to_string()),
                }
            }
        };

        result.performance.response_time = round_secs(started.elapsed());
        result
    }

    async fn dispatch(&self, query: &str) -> anyhow::Result<QueryResult> {
        let query_type = classify(query);

        let mut result = QueryResult {
            query: query.to_string(),
            query_type: query_type.to_string(),
            results: Value::Null,
            sources: Vec::new(),
            sql: None,
            row_count: None,
            performance: Performance::default(),
            cached: false,
            error: None,
        };

        match query_type {
            QueryType::Sql => {
                let (outcome, cached) = self.handle_sql_cached(query).await;
                result.sql = outcome["sql"].as_str().map(|s| s.to_string());
                result.row_count = outcome["row_count"].as_u64().map(|n| n as usize);
                result.error = outcome["error"].as_str().map(|s| s.to_string());
                result.results = outcome["data"].clone();
                result.sources = vec!["database".to_string()];
                result.cached = cached;
            }
            QueryType::Document => {
                let matches = self.index.search(query, DOC_TOP_K).await;
                result.results = serde_json::to_value(&matches)?;
                result.sources = vec!["documents".to_string()];
            }
            QueryType::Hybrid => {
                let (sql_outcome, cached) = self.handle_sql_cached(query).await;
                let matches = self.index.search(query, DOC_TOP_K).await;
                result.results = json!({
                    "database": sql_outcome,
                    "documents": matches,
                });
                result.sources = vec!["database".to_string(), "documents".to_string()];
                result.cached = cached;
            }
        }

        Ok(result)
    }

    /// SQL handler with result caching. Cache faults degrade to a miss; two
    /// concurrent identical queries may both execute and both write (no
    /// single-flight deduplication).
    async fn handle_sql_cached(&self, query: &str) -> (Value, bool) {
        let key = cache_key("handle_sql", &[query]);

        match self.cache.get(&key).await {
            Ok(Some(hit)) => {
                tracing::debug!(key = %&key[..24.min(key.len())], "sql cache hit");
                return (hit, true);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("cache lookup failed: {}", e),
        }

        let outcome = self.handle_sql(query).await;

        if let Err(e) = self
            .cache
            .set(&key, outcome.clone(), Some(self.sql_ttl))
            .await
        {
            tracing::warn!("cache store failed: {}", e);
        }

        (outcome, false)
    }

    /// Generates, validates, bounds, and executes one statement. Faults on
    /// any step return an `{error}` payload; nothing is ever executed after
    /// a validation rejection.
    async fn handle_sql(&self, query: &str) -> Value {
        let generated = match self.generator.generate(query, &self.schema).await {
            Ok(generated) => generated,
            Err(e) => return json!({ "error": e.to_string() }),
        };

        if let Err(reason) = sqlgen::validate(&generated.sql) {
            return json!({ "error": reason });
        }

        let sql = sqlgen::ensure_limit(&generated.sql);

        match self.execute(&sql).await {
            Ok(data) => json!({
                "sql": sql,
                "row_count": data.len(),
                "data": data,
                "tables_used": generated.tables_used,
            }),
            Err(e) => json!({ "error": format!("SQL execution failed: {}", e) }),
        }
    }

    async fn execute(&self, sql: &str) -> anyhow::Result<Vec<Value>> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

fn round_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db;
    use crate::models::SchemaSummary;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubGenerator {
        sql: String,
        calls: AtomicUsize,
    }

    impl StubGenerator {
        fn new(sql: &str) -> Arc<Self> {
            Arc::new(Self {
                sql: sql.to_string(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SqlGenerator for StubGenerator {
        async fn generate(
            &self,
            _query: &str,
            _schema: &SchemaDescription,
        ) -> Result<sqlgen::GeneratedSql> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(sqlgen::GeneratedSql {
                sql: self.sql.clone(),
                explanation: String::new(),
                tables_used: vec![],
            })
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl SqlGenerator for FailingGenerator {
        async fn generate(
            &self,
            _query: &str,
            _schema: &SchemaDescription,
        ) -> Result<sqlgen::GeneratedSql> {
            anyhow::bail!("backend unavailable")
        }
    }

    fn empty_schema() -> SchemaDescription {
        SchemaDescription {
            tables: vec![],
            relationships: vec![],
            summary: SchemaSummary {
                total_tables: 0,
                total_columns: 0,
                total_relationships: 0,
                database_type: "sqlite".to_string(),
            },
        }
    }

    async fn seeded_pool() -> AnyPool {
        let pool = db::connect("sqlite::memory:", 1).await.unwrap();
        sqlx::query("CREATE TABLE employees (id INTEGER PRIMARY KEY, name TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO employees (name) VALUES ('ada'), ('grace')")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    async fn engine_with(
        generator: Arc<dyn SqlGenerator>,
        dir: &std::path::Path,
    ) -> QueryEngine {
        let pool = seeded_pool().await;
        let index = Arc::new(KeywordDocumentIndex::open(&dir.join("index.json")));
        QueryEngine::new(
            pool,
            empty_schema(),
            index,
            generator,
            Arc::new(MemoryCache::new()),
            Duration::from_secs(300),
        )
    }

    #[tokio::test]
    async fn sql_query_executes_and_reports_rows() {
        let dir = tempfile::tempdir().unwrap();
        let generator = StubGenerator::new("SELECT name FROM employees");
        let engine = engine_with(generator, dir.path()).await;

        let result = engine.process("how many employees do we have").await;
        assert_eq!(result.query_type, "sql");
        assert_eq!(result.sources, vec!["database"]);
        assert_eq!(result.row_count, Some(2));
        assert!(result.sql.unwrap().contains("LIMIT 100"));
        assert!(!result.cached);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn identical_query_hits_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let generator = StubGenerator::new("SELECT name FROM employees");
        let engine = engine_with(generator.clone(), dir.path()).await;

        let first = engine.process("how many employees do we have").await;
        let second = engine.process("how many employees do we have").await;

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.row_count, Some(2));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dangerous_sql_is_rejected_without_executing() {
        let dir = tempfile::tempdir().unwrap();
        let generator = StubGenerator::new("DROP TABLE employees");
        let engine = engine_with(generator, dir.path()).await;

        let result = engine.process("how many employees do we have").await;
        assert_eq!(result.query_type, "sql");
        assert!(result.error.unwrap().contains("Dangerous operation"));
        assert!(result.row_count.is_none());

        // Table must still exist.
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM employees")
            .fetch_one(&engine.pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn generator_failure_surfaces_as_error_payload() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(Arc::new(FailingGenerator), dir.path()).await;

        let result = engine.process("count the departments").await;
        assert_eq!(result.query_type, "sql");
        assert!(result.error.unwrap().contains("backend unavailable"));
    }

    #[tokio::test]
    async fn execution_fault_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let generator = StubGenerator::new("SELECT nope FROM missing_table");
        let engine = engine_with(generator, dir.path()).await;

        let result = engine.process("total rows in missing_table").await;
        assert!(result.error.unwrap().contains("SQL execution failed"));
    }

    #[tokio::test]
    async fn document_query_routes_to_index() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("cv.txt");
        std::fs::write(&doc, "python and kubernetes experience").unwrap();

        let generator = StubGenerator::new("SELECT 1");
        let engine = engine_with(generator.clone(), dir.path()).await;
        engine.index.ingest(&[doc]).await;

        // "resume" contains "sum" and would classify as hybrid, so the
        // fixture sticks to document-only phrases.
        let result = engine.process("kubernetes expertise feedback").await;
        assert_eq!(result.query_type, "document");
        assert_eq!(result.sources, vec!["documents"]);
        assert_eq!(result.results.as_array().unwrap().len(), 1);
        // Document path never touches the generator.
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn hybrid_query_merges_both_paths() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("cv.txt");
        std::fs::write(&doc, "senior python developer").unwrap();

        let generator = StubGenerator::new("SELECT name FROM employees");
        let engine = engine_with(generator, dir.path()).await;
        engine.index.ingest(&[doc]).await;

        let result = engine.process("list all employees with python skills").await;
        assert_eq!(result.query_type, "hybrid");
        assert_eq!(result.sources, vec!["database", "documents"]);
        assert!(result.results["database"]["data"].is_array());
        assert_eq!(result.results["documents"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn response_time_is_recorded_on_every_branch() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(Arc::new(FailingGenerator), dir.path()).await;

        let result = engine.process("hello").await;
        assert!(result.performance.response_time >= 0.0);
        assert!(result.performance.response_time < 60.0);
    }
}
