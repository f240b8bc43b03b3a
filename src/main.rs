mod catalog;
mod config;
mod db;
mod error;
mod models;
mod money;
mod rate_limit;
mod routes;
mod services;
mod state;

use tracing_subscriber::EnvFilter;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vaultchain=info,sqlx=warn")))
        .init();

    let database_url = std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL required")?;
    let config = config::AppConfig::from_env();
    let port = config.port;

    let pool = db::init_pool(&database_url).await?;
    let ledger = services::persistence::hydrate_ledger(&pool).await?;
    let state = state::AppState::new(pool, ledger, config);

    let persistence = services::persistence::spawn_persistence_task(state.clone());
    let accrual = services::persistence::spawn_accrual_task(state.clone());

    let app = routes::app(state.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    tracing::info!(%port, "vaultchain listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    accrual.abort();
    persistence.abort();
    let flushed = services::persistence::flush_all_dirty(&state).await;
    tracing::info!(flushed, "final ledger flush complete");
    Ok(())
}
