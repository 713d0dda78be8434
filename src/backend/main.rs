/**
 * xfcanvas Sync Server Entry Point
 *
 * Serves workspace replication: the SSE push stream, the update and state
 * endpoints and background persistence to Postgres.
 */

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    tracing::info!("[STARTUP] Server initialization started");

    let config = xfcanvas::backend::server::ServerConfig::from_env()?;
    let app = xfcanvas::backend::server::create_app(&config).await?;

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("[STARTUP] Listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
