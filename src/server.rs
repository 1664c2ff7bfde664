//! HTTP API for askdb.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/database/connect` | Connect to a database and discover its schema |
//! | `GET`  | `/api/database/schema` | Return the cached schema snapshot |
//! | `POST` | `/api/documents/upload` | Upload documents; starts a background ingestion job |
//! | `GET`  | `/api/documents/status/{job_id}` | Poll an ingestion job |
//! | `POST` | `/api/query` | Process a natural-language query |
//! | `GET`  | `/api/query/history` | Most recent processed queries |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses carry the shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "File type not allowed: csv" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::AnyPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

use crate::cache::{Cache, MemoryCache, RedisCache, SCHEMA_KEY};
use crate::config::Config;
use crate::db;
use crate::engine::QueryEngine;
use crate::index::KeywordDocumentIndex;
use crate::jobs::{JobStore, QueryHistory};
use crate::models::SchemaDescription;
use crate::schema;
use crate::sqlgen::{self, SqlGenerator};

/// Upload extensions accepted by the document endpoint.
const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "docx", "txt"];

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    cache: Arc<dyn Cache>,
    index: Arc<KeywordDocumentIndex>,
    generator: Arc<dyn SqlGenerator>,
    /// Active database pool, set by the connect endpoint.
    pool: Arc<RwLock<Option<AnyPool>>>,
    jobs: Arc<JobStore>,
    history: Arc<QueryHistory>,
}

/// Starts the HTTP server on the configured bind address.
///
/// Builds the cache backend (failing fast when a configured Redis is
/// unreachable), opens the persisted keyword index, and serves until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let config = Arc::new(config.clone());

    let cache: Arc<dyn Cache> = match config.cache.backend.as_str() {
        "redis" => Arc::new(RedisCache::new(&config.cache.redis_url)),
        _ => Arc::new(MemoryCache::new()),
    };
    cache.connect().await?;

    std::fs::create_dir_all(&config.storage.upload_dir)?;
    std::fs::create_dir_all(&config.storage.index_dir)?;

    let state = AppState {
        index: Arc::new(KeywordDocumentIndex::open(&config.index_file())),
        generator: sqlgen::create_generator(&config.generator)?,
        pool: Arc::new(RwLock::new(None)),
        jobs: Arc::new(JobStore::new()),
        history: Arc::new(QueryHistory::new()),
        cache,
        config: config.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // The multipart body ceiling is per request; the per-file ceiling is
    // enforced in the upload handler.
    let body_limit = (config.storage.max_upload_bytes as usize).saturating_mul(8);

    let app = Router::new()
        .route("/api/database/connect", post(handle_connect))
        .route("/api/database/schema", get(handle_get_schema))
        .route("/api/documents/upload", post(handle_upload))
        .route("/api/documents/status/{job_id}", get(handle_job_status))
        .route("/api/query", post(handle_query))
        .route("/api/query/history", get(handle_history))
        .route("/health", get(handle_health))
        .route("/", get(handle_root))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state);

    println!("askdb server listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// Internal error type that converts into an HTTP response with the
/// structured error body.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": { "code": self.code, "message": self.message }
        });
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

// ============ POST /api/database/connect ============

#[derive(Deserialize)]
struct ConnectRequest {
    connection_string: String,
    #[serde(default = "default_test_connection")]
    test_connection: bool,
}

fn default_test_connection() -> bool {
    true
}

/// Connects to the given database, discovers its schema, and caches the
/// snapshot under the fixed key with the configured TTL. Any connection or
/// discovery fault is a 400.
async fn handle_connect(
    State(state): State<AppState>,
    Json(request): Json<ConnectRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let pool = db::connect(
        &request.connection_string,
        state.config.database.max_connections,
    )
    .await
    .map_err(|e| bad_request(e.to_string()))?;

    if request.test_connection {
        db::test_connection(&pool)
            .await
            .map_err(|e| bad_request(e.to_string()))?;
    }

    let discovered = schema::analyze(&pool)
        .await
        .map_err(|e| bad_request(e.to_string()))?;

    let snapshot = serde_json::to_value(&discovered).map_err(|e| internal(e.to_string()))?;
    let ttl = Duration::from_secs(state.config.cache.schema_ttl_secs);
    state
        .cache
        .set(SCHEMA_KEY, snapshot, Some(ttl))
        .await
        .map_err(|e| internal(e.to_string()))?;

    *state.pool.write().await = Some(pool);

    Ok(Json(json!({
        "success": true,
        "message": "Database connected successfully",
        "schema_summary": discovered.summary,
    })))
}

// ============ GET /api/database/schema ============

async fn handle_get_schema(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let snapshot = state
        .cache
        .get(SCHEMA_KEY)
        .await
        .map_err(|e| internal(e.to_string()))?;

    match snapshot {
        Some(snapshot) => Ok(Json(snapshot)),
        None => Err(not_found("No schema found. Connect to database first.")),
    }
}

// ============ POST /api/documents/upload ============

/// A filename is accepted only when it actually carries an extension and
/// that extension is on the allow list. A dotless name like `txt` is not a
/// text file.
fn allowed_upload_name(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Validates and saves each uploaded file, then starts a detached ingestion
/// job and returns its id immediately. The job's final write sets the
/// completed or failed state.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let job_id = uuid::Uuid::new_v4().to_string();
    let mut file_paths = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        let Some(name) = field.file_name().map(|n| n.to_string()) else {
            continue;
        };

        if !allowed_upload_name(&name) {
            return Err(bad_request(format!("File type not allowed: {}", name)));
        }

        let bytes = field.bytes().await.map_err(|e| bad_request(e.to_string()))?;
        if bytes.len() as u64 > state.config.storage.max_upload_bytes {
            return Err(bad_request(format!("File too large: {}", name)));
        }

        let path = state
            .config
            .storage
            .upload_dir
            .join(format!("{}_{}", job_id, name));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| internal(e.to_string()))?;
        file_paths.push(path);
    }

    if file_paths.is_empty() {
        return Err(bad_request("No files in upload"));
    }

    state.jobs.start(&job_id, file_paths.len()).await;

    let total = file_paths.len();
    let index = state.index.clone();
    let jobs = state.jobs.clone();
    let task_job_id = job_id.clone();
    let ingest = tokio::spawn(async move { index.ingest(&file_paths).await });
    tokio::spawn(async move {
        match ingest.await {
            Ok(report) => jobs.complete(&task_job_id, report).await,
            // A panicked ingest task still gets a terminal job state.
            Err(e) => jobs.fail(&task_job_id, e.to_string()).await,
        }
    });

    Ok(Json(json!({
        "job_id": job_id,
        "status": "processing",
        "message": format!("Processing {} documents", total),
    })))
}

// ============ GET /api/documents/status/{job_id} ============

async fn handle_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let status = state
        .jobs
        .get(&job_id)
        .await
        .ok_or_else(|| not_found("Job not found"))?;

    let mut body = serde_json::to_value(&status).map_err(|e| internal(e.to_string()))?;
    body["job_id"] = json!(job_id);
    Ok(Json(body))
}

// ============ POST /api/query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
}

/// Runs the full query pipeline. Requires a previously discovered schema;
/// returns 400 before touching the engine when none is cached.
async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let snapshot = state
        .cache
        .get(SCHEMA_KEY)
        .await
        .map_err(|e| internal(e.to_string()))?
        .ok_or_else(|| bad_request("Database not connected. Please connect first."))?;

    let schema: SchemaDescription =
        serde_json::from_value(snapshot).map_err(|e| internal(e.to_string()))?;

    let pool = state
        .pool
        .read()
        .await
        .clone()
        .ok_or_else(|| bad_request("Database not connected. Please connect first."))?;

    let engine = QueryEngine::new(
        pool,
        schema,
        state.index.clone(),
        state.generator.clone(),
        state.cache.clone(),
        Duration::from_secs(state.config.cache.default_ttl_secs),
    );

    let result = engine.process(&request.query).await;
    state.history.push(&request.query, &result.query_type).await;

    Ok(Json(
        serde_json::to_value(&result).map_err(|e| internal(e.to_string()))?,
    ))
}

// ============ GET /api/query/history ============

async fn handle_history(State(state): State<AppState>) -> Json<serde_json::Value> {
    let history = state.history.recent().await;
    Json(json!({ "history": history }))
}

// ============ GET /health, GET / ============

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "askdb API",
        "version": env!("CARGO_PKG_VERSION"),
        "features": [
            "Dynamic schema discovery",
            "Keyword-based document search",
            "Redis or in-memory caching",
        ],
    }))
}
