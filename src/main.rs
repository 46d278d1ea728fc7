use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use unified_proxy::{build_router, AppState, AuditLog, PromptResolver, ProxyConfig, SharedLogger};

#[derive(Parser)]
#[command(
    name = "unified-proxy",
    about = "Anthropic Messages <-> OpenAI Chat Completions translating proxy",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Backend name (overrides config)
    #[arg(long)]
    backend: Option<String>,

    /// Disable per-request audit capture regardless of config
    #[arg(long)]
    no_audit: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unified_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(ref backend) = cli.backend {
        config.backend.name = backend.clone();
    }
    if cli.no_audit {
        config.logging.audit = false;
    }

    let logger = SharedLogger::new(&config.logging.file)?;

    // Validate config eagerly so misconfiguration fails at startup.
    let base_url = config.effective_base_url()?;
    let _api_key = config.resolve_api_key()?;

    let prompt_resolver = PromptResolver::from_settings(&config.prompt)?;
    let audit = if config.logging.audit {
        AuditLog::new(&config.logging.audit_dir, true)
    } else {
        AuditLog::disabled()
    };

    info!("unified-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("  Backend:   {}", config.backend.name);
    info!("  Base URL:  {}", base_url);
    info!(
        "  Format:    {}",
        match config.wire_format() {
            unified_proxy::backends::WireFormat::Anthropic => "anthropic (passthrough)",
            unified_proxy::backends::WireFormat::OpenAi => "openai (translate)",
        }
    );
    info!("  Port:      {}", config.port);
    info!("  Models:    {} mapped", config.models.len());
    info!(
        "  Prompt:    {}",
        if prompt_resolver.is_some() {
            "custom template"
        } else {
            "passthrough"
        }
    );
    if audit.is_enabled() {
        info!("  Audit:     {}", config.logging.audit_dir.display());
    }

    logger.info(
        "startup",
        format!(
            "Starting unified-proxy backend={} base_url={} port={}",
            config.backend.name, base_url, config.port
        ),
    );

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let state = Arc::new(AppState {
        config: config.clone(),
        client,
        logger: logger.clone(),
        audit,
        prompt_resolver,
    });

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{bind_addr}");
    info!("Point a Messages-API client at ANTHROPIC_BASE_URL=http://localhost:{}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
