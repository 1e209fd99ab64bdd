//! Start a reasoning-proxy server programmatically.
//!
//! Usage:
//!   export UPSTREAM_API_KEY=nvapi-your-key
//!   cargo run --example basic_proxy

use reasoning_proxy::{build_router, AppState, ProxyConfig, SharedLogger};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = ProxyConfig::find_and_load(None)?;
    config.resolve_api_key()?;

    println!("Upstream: {}", config.upstream.base_url);
    println!("Models mapped: {}", config.models.map.len());
    println!("Show reasoning: {}", config.reasoning.show_reasoning);

    let logger = SharedLogger::new("proxy-example.log")?;
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.upstream.timeout_secs))
        .build()?;

    let port = config.port;
    let state = Arc::new(AppState {
        config,
        client,
        logger,
    });

    let app = build_router(state);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("Listening on http://{addr}");
    println!();
    println!("  OPENAI_BASE_URL=http://localhost:{port}/v1");

    axum::serve(listener, app).await?;
    Ok(())
}
