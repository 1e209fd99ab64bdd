use clap::Parser;
use reasoning_proxy::config::config_search_paths;
use reasoning_proxy::{build_router, AppState, ProxyConfig, SharedLogger};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "reasoning-proxy",
    about = "OpenAI-compatible gateway that shows streamed reasoning as <think> content",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Upstream base URL, e.g. https://integrate.api.nvidia.com/v1 (overrides config)
    #[arg(long)]
    base_url: Option<String>,

    /// Show or hide reasoning in responses (overrides config)
    #[arg(long)]
    show_reasoning: Option<bool>,

    /// Ask the backend for thinking mode (overrides config)
    #[arg(long)]
    thinking_mode: Option<bool>,

    /// Log file path
    #[arg(long, default_value = "reasoning-proxy.log")]
    log_file: PathBuf,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reasoning_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(base_url) = cli.base_url {
        config.upstream.base_url = base_url;
    }
    if let Some(show) = cli.show_reasoning {
        config.reasoning.show_reasoning = show;
    }
    if let Some(thinking) = cli.thinking_mode {
        config.reasoning.thinking_mode = thinking;
    }

    // Validate eagerly so a missing key fails at startup, not on first request
    config.resolve_api_key()?;

    let logger = SharedLogger::new(&cli.log_file)?;

    info!("reasoning-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("  Upstream:        {}", config.upstream.base_url);
    info!("  Show reasoning:  {}", config.reasoning.show_reasoning);
    info!("  Thinking mode:   {}", config.reasoning.thinking_mode);
    info!("  Port:            {}", config.port);
    info!("  Models:          {} mapped", config.models.map.len());
    info!("  Log file:        {}", cli.log_file.display());

    logger.info(
        "startup",
        format!(
            "Starting reasoning-proxy upstream={} port={} show_reasoning={}",
            config.upstream.base_url, config.port, config.reasoning.show_reasoning
        ),
    );

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
    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("  OPENAI_BASE_URL=http://localhost:{}/v1", port);

    axum::serve(listener, app).await?;

    Ok(())
}
