//! # askdb CLI
//!
//! The `askdb` binary serves the HTTP API and offers direct commands for
//! the index and schema-discovery layers.
//!
//! ## Usage
//!
//! ```bash
//! askdb --config ./config/askdb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askdb serve` | Start the HTTP server |
//! | `askdb ingest <files...>` | Index local documents |
//! | `askdb search "<query>"` | Ranked keyword search over the index |
//! | `askdb schema <database-url>` | Discover and print a database schema |
//! | `askdb classify "<query>"` | Print the routing decision for a query |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use askdb::{classify, config, db, index::KeywordDocumentIndex, logging, schema};

/// askdb — a natural-language query engine over relational databases and
/// uploaded documents.
#[derive(Parser)]
#[command(
    name = "askdb",
    about = "askdb — natural-language queries over relational data and documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/askdb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Serves the database, document, and query endpoints on the
    /// configured bind address.
    Serve,

    /// Index local document files (txt, pdf, docx).
    ///
    /// Runs the same ingestion batch the upload endpoint starts in the
    /// background, then prints the per-file report.
    Ingest {
        /// Files to ingest.
        files: Vec<PathBuf>,
    },

    /// Search the keyword index.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Discover and print the schema of a database.
    Schema {
        /// Database URL (sqlite://, postgres://, or mysql://).
        database_url: String,
    },

    /// Print the routing decision (sql, document, hybrid) for a query.
    Classify {
        /// The query to classify.
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(None);
    let cli = Cli::parse();

    // Classification is pure; it works without a config file.
    if let Commands::Classify { query } = &cli.command {
        println!("{}", classify::classify(query));
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            askdb::server::run_server(&cfg).await?;
        }
        Commands::Ingest { files } => {
            if files.is_empty() {
                anyhow::bail!("No files given");
            }
            let index = KeywordDocumentIndex::open(&cfg.index_file());
            let report = index.ingest(&files).await;
            println!("ingest");
            println!("  processed: {}", report.processed);
            println!("  failed: {}", report.failed);
            println!("  total documents: {}", report.total_documents);
            for doc in &report.documents {
                println!("  {} ({} keywords)", doc.file, doc.keywords_found);
            }
            println!("ok");
        }
        Commands::Search { query, limit } => {
            let index = KeywordDocumentIndex::open(&cfg.index_file());
            let results = index.search(&query, limit).await;
            if results.is_empty() {
                println!("No results.");
                return Ok(());
            }
            for (i, m) in results.iter().enumerate() {
                println!("{}. [{}] {}", i + 1, m.score, m.file);
                println!("    matched: {}", m.matched_keywords.join(", "));
                println!("    preview: \"{}\"", m.preview.replace('\n', " "));
                println!();
            }
        }
        Commands::Schema { database_url } => {
            let pool = db::connect(&database_url, cfg.database.max_connections).await?;
            let discovered = schema::analyze(&pool).await?;
            println!("database type: {}", discovered.summary.database_type);
            println!("tables: {}", discovered.summary.total_tables);
            println!("columns: {}", discovered.summary.total_columns);
            println!("relationships: {}", discovered.summary.total_relationships);
            for table in &discovered.tables {
                println!();
                println!("{} — {}", table.name, table.purpose);
                for col in &table.columns {
                    let null = if col.nullable { "" } else { " NOT NULL" };
                    println!("  {} {}{}", col.name, col.data_type, null);
                }
            }
            pool.close().await;
        }
        Commands::Classify { .. } => unreachable!(),
    }

    Ok(())
}
