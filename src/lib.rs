//! # askdb
//!
//! A natural-language query engine over relational databases and uploaded
//! documents.
//!
//! askdb answers free-text questions by combining automatic schema
//! discovery, keyword-based document retrieval, and a text-to-SQL
//! generation step behind a single query endpoint. Queries are classified
//! as database questions, document questions, or both, and routed
//! accordingly; expensive operations sit behind a pluggable cache.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌─────────────────┐
//! │  Client  │──▶│ QueryEngine │──▶│ SQL path         │
//! │ HTTP/CLI │   │  classify   │   │ schema+generate  │──▶ database
//! └──────────┘   │  route      │   ├─────────────────┤
//!                │  merge      │──▶│ Document path    │──▶ keyword index
//!                └─────┬──────┘   └─────────────────┘
//!                      │
//!                 ┌────▼────┐
//!                 │  Cache  │  (memory / Redis)
//!                 └─────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`cache`] | Key/value cache with memory and Redis backends |
//! | [`db`] | Database connection (sqlite/postgres/mysql via sqlx `Any`) |
//! | [`schema`] | Automatic schema discovery |
//! | [`extract`] | Document text extraction (txt, pdf, docx) |
//! | [`index`] | Keyword inverted index and ranked search |
//! | [`classify`] | Query classification (sql/document/hybrid) |
//! | [`sqlgen`] | Text-to-SQL generation boundary and validation |
//! | [`engine`] | Query processing engine |
//! | [`jobs`] | Ingestion job store and query history |
//! | [`server`] | HTTP API |

pub mod cache;
pub mod classify;
pub mod config;
pub mod db;
pub mod engine;
pub mod extract;
pub mod index;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod schema;
pub mod server;
pub mod sqlgen;
