use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use warbler_api::{AppState, AppStateInner};

/// Placeholder secrets that sign forgeable sessions.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "it's a secret"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warbler=debug,warbler_api=debug,warbler_db=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let secret =
        std::env::var("WARBLER_SECRET_KEY").unwrap_or_else(|_| "dev-secret-change-me".into());
    if PLACEHOLDER_SECRETS.contains(&secret.as_str()) {
        warn!("WARBLER_SECRET_KEY is unset or a placeholder; sessions can be forged");
    }
    let db_path = std::env::var("WARBLER_DATABASE_PATH").unwrap_or_else(|_| "warbler.db".into());
    let static_dir: PathBuf = std::env::var("WARBLER_STATIC_DIR")
        .unwrap_or_else(|_| "static".into())
        .into();
    let host = std::env::var("WARBLER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("WARBLER_PORT")
        .unwrap_or_else(|_| "5000".into())
        .parse()?;

    // Init database
    let db = warbler_db::Database::open(&PathBuf::from(&db_path))?;

    let state: AppState = Arc::new(AppStateInner::new(db, secret));
    let app = warbler_api::router(state, &static_dir);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Warbler listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
