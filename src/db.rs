use anyhow::{Context, Result};
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

/// Connects to a database by URL. The `Any` driver picks sqlite, postgres,
/// or mysql from the URL scheme, so one pool type serves all dialects the
/// discovery layer understands.
pub async fn connect(url: &str, max_connections: u32) -> Result<AnyPool> {
    sqlx::any::install_default_drivers();

    let pool = AnyPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("Failed to connect to database")?;

    Ok(pool)
}

/// Cheap liveness probe used by the `connect` endpoint before discovery.
pub async fn test_connection(pool: &AnyPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .context("Connection test failed")?;
    Ok(())
}
