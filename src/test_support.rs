//! Throwaway Postgres databases for the service tests.
//!
//! `TEST_DATABASE_URL` (or `DATABASE_URL`) points the tests at an existing
//! server. Without either, one embedded cluster is started per test binary.
//! Every call gets a fresh database with the migrations applied.
//!
//! Set `SKIP_TEST_CLUSTER=1` to skip database tests where no cluster can run.

use std::sync::OnceLock;

use reqwest::Url;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use uuid::Uuid;

static ADMIN_URL: OnceLock<Result<String, String>> = OnceLock::new();

fn should_skip_test_cluster() -> bool {
    std::env::var("SKIP_TEST_CLUSTER")
        .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn handle_cluster_setup_failure<T>(reason: impl std::fmt::Display) -> Option<T> {
    if should_skip_test_cluster() {
        eprintln!("SKIP-TEST-CLUSTER: {reason}");
        None
    } else {
        panic!("Test cluster setup failed: {reason}. Set SKIP_TEST_CLUSTER=1 to skip.");
    }
}

/// URL of the maintenance database of the cluster the tests run against.
fn admin_url() -> Result<String, String> {
    ADMIN_URL
        .get_or_init(|| {
            if let Ok(url) = std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
                return Ok(url);
            }
            // The bootstrap drives its own runtime, so it must not run on a tokio worker.
            std::thread::spawn(|| {
                pg_embedded_setup_unpriv::test_support::shared_cluster_handle()
                    .map(|cluster| cluster.connection().database_url("postgres").to_string())
                    .map_err(|e| e.to_string())
            })
            .join()
            .unwrap_or_else(|_| Err("embedded cluster bootstrap panicked".into()))
        })
        .clone()
}

fn with_database(admin: &str, name: &str) -> Result<String, String> {
    let mut url = Url::parse(admin).map_err(|e| format!("bad cluster url: {e}"))?;
    url.set_path(name);
    Ok(url.into())
}

/// Fresh migrated database, or `None` when the cluster is unavailable and skipping is allowed.
pub(crate) async fn test_db() -> Option<PgPool> {
    let admin = match admin_url() {
        Ok(url) => url,
        Err(reason) => return handle_cluster_setup_failure(reason),
    };
    let name = format!("tripdesk_test_{}", Uuid::new_v4().simple());

    let mut conn = match PgConnection::connect(&admin).await {
        Ok(conn) => conn,
        Err(e) => return handle_cluster_setup_failure(e),
    };
    conn.execute(format!(r#"CREATE DATABASE "{name}""#).as_str())
        .await
        .expect("create test database");
    conn.close().await.ok();

    let url = with_database(&admin, &name).expect("test database url");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrate test database");
    Some(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_name_replaces_the_path() {
        let url = with_database("postgres://u:p@localhost:5432/postgres?sslmode=disable", "t1").unwrap();
        assert_eq!(url, "postgres://u:p@localhost:5432/t1?sslmode=disable");
    }
}
