//! Automatic schema discovery for a live database connection.
//!
//! Produces a normalized [`SchemaDescription`]: tables with columns, up to 5
//! sample rows each, an inferred purpose per table, and (for PostgreSQL)
//! foreign-key relationships. Dialect detection is a tagged probe so callers
//! and tests can tell "confirmed sqlite" apart from "probe failed, defaulted
//! to sqlite".

use anyhow::{Context, Result};
use sqlx::{AnyPool, Column, Row};

use crate::models::{ColumnInfo, Relationship, SchemaDescription, SchemaSummary, TableInfo};

/// Sample rows fetched per table.
const SAMPLE_ROWS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Mysql,
    Sqlite,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgresql",
            Dialect::Mysql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }
}

/// Outcome of the version probe. `Unknown` means the probe itself failed
/// and the discovery proceeds with sqlite semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectProbe {
    Detected(Dialect),
    Unknown,
}

impl DialectProbe {
    /// The dialect discovery actually uses: `Unknown` falls back to sqlite.
    pub fn effective(&self) -> Dialect {
        match self {
            DialectProbe::Detected(d) => *d,
            DialectProbe::Unknown => Dialect::Sqlite,
        }
    }
}

/// Discovers the complete schema of the connected database.
///
/// Fails only when table enumeration itself fails; per-table sample fetches
/// and the relationship query tolerate errors.
pub async fn analyze(pool: &AnyPool) -> Result<SchemaDescription> {
    let probe = detect_dialect(pool).await;
    let dialect = probe.effective();

    let table_names = list_tables(pool, dialect)
        .await
        .context("Schema discovery failed to enumerate tables")?;

    let mut tables = Vec::with_capacity(table_names.len());
    for name in &table_names {
        tables.push(analyze_table(pool, dialect, name).await?);
    }

    let relationships = discover_relationships(pool, dialect).await;

    let summary = SchemaSummary {
        total_tables: tables.len(),
        total_columns: tables.iter().map(|t| t.columns.len()).sum(),
        total_relationships: relationships.len(),
        database_type: dialect.as_str().to_string(),
    };

    tracing::info!(
        tables = summary.total_tables,
        columns = summary.total_columns,
        database_type = summary.database_type,
        "schema discovered"
    );

    Ok(SchemaDescription {
        tables,
        relationships,
        summary,
    })
}

/// Probes the database version. Never errors outward: a failed probe is
/// reported as `Unknown` rather than suppressed silently.
pub async fn detect_dialect(pool: &AnyPool) -> DialectProbe {
    let version: Result<String, _> = sqlx::query_scalar("SELECT version()").fetch_one(pool).await;
    match version {
        Ok(v) => match classify_version(&v) {
            Some(d) => DialectProbe::Detected(d),
            // version() answered but named neither server; treat as sqlite.
            None => DialectProbe::Detected(Dialect::Sqlite),
        },
        Err(_) => DialectProbe::Unknown,
    }
}

fn classify_version(version: &str) -> Option<Dialect> {
    if version.contains("PostgreSQL") {
        Some(Dialect::Postgres)
    } else if version.contains("MySQL") {
        Some(Dialect::Mysql)
    } else {
        None
    }
}

async fn list_tables(pool: &AnyPool, dialect: Dialect) -> Result<Vec<String>> {
    let sql = match dialect {
        Dialect::Postgres => {
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE'"
        }
        Dialect::Sqlite => {
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'"
        }
        Dialect::Mysql => "SHOW TABLES",
    };

    let rows = sqlx::query(sql).fetch_all(pool).await?;
    rows.iter().map(|row| Ok(row.try_get::<String, _>(0)?)).collect()
}

async fn analyze_table(pool: &AnyPool, dialect: Dialect, table: &str) -> Result<TableInfo> {
    let columns = fetch_columns(pool, dialect, table).await?;

    // Sample rows are best effort; a broken view or permission error on a
    // single table must not abort discovery.
    let sample_data = match fetch_samples(pool, table).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(table, "sample fetch failed: {}", e);
            Vec::new()
        }
    };

    Ok(TableInfo {
        name: table.to_string(),
        purpose: infer_purpose(table).to_string(),
        columns,
        sample_data,
    })
}

async fn fetch_columns(pool: &AnyPool, dialect: Dialect, table: &str) -> Result<Vec<ColumnInfo>> {
    // Table names come from introspection above, not from user input.
    let rows = match dialect {
        Dialect::Sqlite => {
            sqlx::query(&format!("PRAGMA table_info({})", table))
                .fetch_all(pool)
                .await?
        }
        Dialect::Postgres | Dialect::Mysql => {
            sqlx::query(&format!(
                "SELECT column_name, data_type, is_nullable, column_default \
                 FROM information_schema.columns \
                 WHERE table_name = '{}' \
                 ORDER BY ordinal_position",
                table
            ))
            .fetch_all(pool)
            .await?
        }
    };

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        let column = match dialect {
            Dialect::Sqlite => ColumnInfo {
                name: row.try_get(1)?,
                data_type: row.try_get(2)?,
                nullable: row.try_get::<i64, _>(3)? == 0,
                default: row.try_get::<String, _>(4).ok(),
            },
            Dialect::Postgres | Dialect::Mysql => ColumnInfo {
                name: row.try_get(0)?,
                data_type: row.try_get(1)?,
                nullable: row.try_get::<String, _>(2)? == "YES",
                default: row.try_get::<String, _>(3).ok(),
            },
        };
        columns.push(column);
    }

    Ok(columns)
}

async fn fetch_samples(pool: &AnyPool, table: &str) -> Result<Vec<serde_json::Value>> {
    let rows = sqlx::query(&format!("SELECT * FROM {} LIMIT {}", table, SAMPLE_ROWS))
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(row_to_json).collect())
}

/// Maps a dynamically-typed row to a column-keyed JSON object. Values the
/// `Any` driver cannot decode to a common scalar become null.
pub fn row_to_json(row: &sqlx::any::AnyRow) -> serde_json::Value {
    let mut object = serde_json::Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = if let Ok(v) = row.try_get::<i64, _>(idx) {
            serde_json::Value::from(v)
        } else if let Ok(v) = row.try_get::<f64, _>(idx) {
            serde_json::Value::from(v)
        } else if let Ok(v) = row.try_get::<bool, _>(idx) {
            serde_json::Value::from(v)
        } else if let Ok(v) = row.try_get::<String, _>(idx) {
            serde_json::Value::from(v)
        } else {
            serde_json::Value::Null
        };
        object.insert(column.name().to_string(), value);
    }
    serde_json::Value::Object(object)
}

/// Foreign-key discovery. Only PostgreSQL exposes this through the
/// information schema in a portable way; sqlite and mysql report no
/// relationships, a documented limitation.
async fn discover_relationships(pool: &AnyPool, dialect: Dialect) -> Vec<Relationship> {
    if dialect != Dialect::Postgres {
        return Vec::new();
    }

    let rows = sqlx::query(
        r#"
        SELECT
            tc.table_name AS from_table,
            kcu.column_name AS from_column,
            ccu.table_name AS to_table,
            ccu.column_name AS to_column
        FROM information_schema.table_constraints AS tc
        JOIN information_schema.key_column_usage AS kcu
            ON tc.constraint_name = kcu.constraint_name
        JOIN information_schema.constraint_column_usage AS ccu
            ON ccu.constraint_name = tc.constraint_name
        WHERE tc.constraint_type = 'FOREIGN KEY'
        "#,
    )
    .fetch_all(pool)
    .await;

    match rows {
        Ok(rows) => rows
            .iter()
            .filter_map(|row| {
                Some(Relationship {
                    from_table: row.try_get(0).ok()?,
                    from_column: row.try_get(1).ok()?,
                    to_table: row.try_get(2).ok()?,
                    to_column: row.try_get(3).ok()?,
                })
            })
            .collect(),
        Err(e) => {
            tracing::warn!("relationship discovery failed: {}", e);
            Vec::new()
        }
    }
}

/// Classifies a table by substring match of its name against fixed category
/// groups. First matching category wins; the order here is the tie-break.
pub fn infer_purpose(table: &str) -> &'static str {
    let name = table.to_lowercase();

    if ["employee", "staff", "personnel", "emp"]
        .iter()
        .any(|t| name.contains(t))
    {
        "Employee information"
    } else if ["department", "dept", "division"].iter().any(|t| name.contains(t)) {
        "Department/organizational structure"
    } else if ["salary", "compensation", "pay"].iter().any(|t| name.contains(t)) {
        "Salary and compensation data"
    } else if ["document", "file", "attachment"].iter().any(|t| name.contains(t)) {
        "Document storage"
    } else {
        "General data table"
    }
}
