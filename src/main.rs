use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::AppState;

/// Main entry point for the asset server
///
/// Loads `.env`, resolves the asset store configuration and serves the REST surface:
/// the asset handler under `/assets/*`, the admin API under `/admin/*` and Swagger UI.
///
/// # Environment Variables
/// - `ASSETS_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `ASSETS_PUBLIC_DIR` / `ASSETS_PROTECTED_DIR`: storage roots
/// - `ASSETS_RECORDS_FILE`: optional JSON file records for soft resolution
/// - `API_KEY`: key required by the admin API
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the asset configuration is invalid or the storage roots cannot be created,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("assets_run=info".parse()?)
                .add_directive("assets_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("ASSETS_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let state = AppState::from_env()?;
    let capabilities = state.store().capabilities();
    tracing::info!(
        "Asset store ready (visibility: {:?}, conflict: {:?})",
        capabilities.visibility,
        capabilities.conflict
    );

    tracing::info!("-- Starting assets REST API on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, api_rest::app(state)).await?;

    Ok(())
}
