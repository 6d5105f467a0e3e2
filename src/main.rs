use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use web_chat_scraper::{
    config::Config,
    api::routes::create_router,
    chat::ChatService,
    llm::GroqClient,
    rate_limit::{RateLimiter, UpstashStore},
    scraper::{RenderedScraper, StaticScraper, WebScraper},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Missing credentials stop the process here, before anything is bound.
    let config = Config::load()?;
    let server_addr = config.server_addr;

    let model = Arc::new(GroqClient::new(&config.llm));
    let scraper = WebScraper::new(
        Arc::new(StaticScraper::new(config.scrape.fetch_timeout)?),
        Arc::new(RenderedScraper::new(&config.scrape)),
    );
    let store = Arc::new(UpstashStore::new(
        config.rate_limit.redis_url.clone(),
        config.rate_limit.redis_token.clone(),
    ));

    // Create application state
    let app_state = AppState {
        chat: Arc::new(ChatService::new(model, scraper)),
        limiter: Arc::new(RateLimiter::new(store, &config.rate_limit)),
    };

    // Build the router with routes
    let app = create_router(app_state);

    let listener = TcpListener::bind(server_addr).await?;
    tracing::info!(%server_addr, "listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutting down");
}
