use anyhow::Result;
use tracing_subscriber::prelude::*;
use vod_portal::{auth, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_state = AppState::new()?;
    sqlx::migrate!().run(&app_state.pool).await?;
    app_state.storage.ensure_layout().await?;
    auth::ensure_default_admin(&app_state.pool, &app_state.config).await?;

    vod_portal::serve(app_state).await?;
    Ok(())
}
