//! Entry point: load config, wire dependencies, and run the server.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wakapadi_rt::auth::JwtSecret;
use wakapadi_rt::config::Config;
use wakapadi_rt::handlers::http::broadcast_expirations;
use wakapadi_rt::services::InMemoryPresence;
use wakapadi_rt::store::PgStore;
use wakapadi_rt::{create_app, AppState};

/// How often the presence sweeper prunes entries past their TTL.
const SWEEP_INTERVAL_SECS: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("config: {}", e))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pg = Arc::new(PgStore::connect(&config).await?);
    let presence = Arc::new(InMemoryPresence::new());
    let jwt = JwtSecret::new(config.jwt_secret.clone());

    let state = AppState::new(presence, pg.clone(), pg.clone(), pg, jwt);

    let sweeper_state = state.clone();
    let ttl = chrono::Duration::seconds(config.presence_ttl_secs as i64);
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let expired = sweeper_state.presence.sweep(chrono::Utc::now(), ttl);
            if !expired.is_empty() {
                tracing::debug!(count = expired.len(), "presence entries expired");
                broadcast_expirations(&sweeper_state, expired);
            }
        }
    });

    let app = create_app(state);

    tracing::info!(addr = %config.server_addr, "listening");
    let listener = tokio::net::TcpListener::bind(config.server_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
