use anyhow::Context;
use tracing::info;

use crate::state::AppState;
use crate::users::services::ensure_root;

const BOOTSTRAP_ROLE: &str = "Administrator";

pub async fn migrate(state: &AppState) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(&state.db)
        .await
        .context("run migrations")?;
    Ok(())
}

/// Creates the configured self-owned administrator unless it already exists.
pub async fn bootstrap(state: &AppState) -> anyhow::Result<()> {
    let Some(admin) = state.config.bootstrap_admin.as_ref() else {
        return Ok(());
    };
    let id = ensure_root(
        &state.db,
        state.hasher.as_ref(),
        &admin.username,
        &admin.password,
        BOOTSTRAP_ROLE,
    )
    .await
    .context("bootstrap administrator")?;
    info!(user_id = %id, username = %admin.username, "bootstrap administrator ready");
    Ok(())
}
