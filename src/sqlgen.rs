//! Natural-language-to-SQL generation boundary.
//!
//! The generation call itself is an injected capability behind
//! [`SqlGenerator`], so the engine's validation and routing logic is
//! testable without a live backend. The shipped implementation talks to an
//! OpenAI-style chat-completions endpoint over HTTPS with a bounded timeout.
//!
//! Validation and the row-count ceiling also live here: generated
//! statements are rejected unless they are plain `SELECT`s free of the
//! dangerous keywords, and a `LIMIT 100` is injected when absent.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GeneratorConfig;
use crate::models::SchemaDescription;

/// Keywords that reject a generated statement wherever they appear.
///
/// This is substring matching by design: a SELECT mentioning a column named
/// `update_count` is rejected too. The false positive is the price of never
/// executing a write.
const DANGEROUS_KEYWORDS: &[&str] = &["DROP", "DELETE", "TRUNCATE", "ALTER", "CREATE", "UPDATE"];

/// Row ceiling injected into statements that carry no LIMIT.
const DEFAULT_ROW_LIMIT: u32 = 100;

/// A successfully generated statement plus context for the caller.
#[derive(Debug, Clone)]
pub struct GeneratedSql {
    pub sql: String,
    pub explanation: String,
    pub tables_used: Vec<String>,
}

/// Capability for turning a natural-language question into SQL.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(&self, query: &str, schema: &SchemaDescription) -> Result<GeneratedSql>;
}

/// Builds the generator configured in `[generator]`.
pub fn create_generator(config: &GeneratorConfig) -> Result<Arc<dyn SqlGenerator>> {
    match config.provider.as_str() {
        "http" => Ok(Arc::new(HttpSqlGenerator::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        other => bail!("Unknown generator provider: '{}'", other),
    }
}

/// Placeholder used when no backend is configured. Every call reports an
/// error, which the engine surfaces as an `{error}` payload.
pub struct DisabledGenerator;

#[async_trait]
impl SqlGenerator for DisabledGenerator {
    async fn generate(&self, _query: &str, _schema: &SchemaDescription) -> Result<GeneratedSql> {
        bail!("SQL generation is disabled. Set [generator] provider in config.")
    }
}

// ============ HTTP generator ============

/// Chat-completions backed generator.
pub struct HttpSqlGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HttpSqlGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).with_context(|| {
            format!("Generator API key not found in ${}", config.api_key_env)
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl SqlGenerator for HttpSqlGenerator {
    async fn generate(&self, query: &str, schema: &SchemaDescription) -> Result<GeneratedSql> {
        let prompt = build_prompt(query, schema);

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.0,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("SQL generation request failed")?
            .error_for_status()
            .context("SQL generation backend returned an error")?;

        let payload: serde_json::Value = response.json().await?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .context("SQL generation response had no content")?
            .to_string();

        let sql = extract_sql(&content);
        if sql.is_empty() {
            bail!("SQL generation produced an empty statement");
        }

        Ok(GeneratedSql {
            tables_used: extract_tables(&sql, schema),
            sql,
            explanation: content,
        })
    }
}

/// Renders the schema snapshot into the generation prompt: every table with
/// its purpose and columns, plus the known foreign-key edges.
pub fn build_prompt(query: &str, schema: &SchemaDescription) -> String {
    let mut desc = String::from("Database Schema:\n");
    for table in &schema.tables {
        desc.push_str(&format!("\nTable: {} ({})\n", table.name, table.purpose));
        desc.push_str("Columns:\n");
        for col in &table.columns {
            desc.push_str(&format!("  {} ({})\n", col.name, col.data_type));
        }
    }

    if !schema.relationships.is_empty() {
        desc.push_str("\nRelationships:\n");
        for rel in &schema.relationships {
            desc.push_str(&format!(
                "  {}.{} -> {}.{}\n",
                rel.from_table, rel.from_column, rel.to_table, rel.to_column
            ));
        }
    }

    format!(
        "You are a SQL expert. Convert the natural language query to SQL.\n\
         {}\n\
         User Query: {}\n\
         Instructions:\n\
         1. Generate ONLY the SQL query, no explanations.\n\
         2. Use proper JOIN syntax if needed.\n\
         3. Use correct column and table names from the schema.\n\
         4. Return the SQL inside a ```sql code block.\n\
         SQL Query:\n",
        desc, query
    )
}

/// Pulls the SQL statement out of a model response: a fenced code block
/// first, then a bare `SELECT ...`, then the trimmed text as a fallback.
pub fn extract_sql(text: &str) -> String {
    // ```sql ... ``` or ``` ... ```
    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        let after = after.strip_prefix("sql").unwrap_or(after);
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    // Bare SELECT statement
    let lower = text.to_lowercase();
    if let Some(start) = lower.find("select") {
        let stmt = text[start..].trim();
        let stmt = match stmt.find(';') {
            Some(end) => &stmt[..=end],
            None => stmt,
        };
        return stmt.to_string();
    }

    text.trim().to_string()
}

/// Validates a generated statement for safety. Returns the rejection reason
/// on failure; the statement must never be executed in that case.
pub fn validate(sql: &str) -> Result<(), String> {
    if sql.trim().is_empty() {
        return Err("Empty SQL query".to_string());
    }

    let upper = sql.to_uppercase();
    for keyword in DANGEROUS_KEYWORDS {
        if upper.contains(keyword) {
            return Err(format!("Dangerous operation: {}", keyword));
        }
    }

    if !upper.trim_start().starts_with("SELECT") {
        return Err("Query must start with SELECT".to_string());
    }

    Ok(())
}

/// Appends a `LIMIT 100` before the trailing terminator when the statement
/// has no LIMIT of its own.
pub fn ensure_limit(sql: &str) -> String {
    if sql.to_uppercase().contains("LIMIT") {
        sql.to_string()
    } else {
        format!("{} LIMIT {};", sql.trim_end().trim_end_matches(';'), DEFAULT_ROW_LIMIT)
    }
}

/// Schema table names mentioned in the statement.
pub fn extract_tables(sql: &str, schema: &SchemaDescription) -> Vec<String> {
    let upper = sql.to_uppercase();
    schema
        .tables
        .iter()
        .filter(|t| upper.contains(&t.name.to_uppercase()))
        .map(|t| t.name.clone())
        .collect()
}
