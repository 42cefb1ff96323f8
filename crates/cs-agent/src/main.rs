//! cs-agent: Customer Support Agent Main Binary
//!
//! Usage:
//!   cs-agent                        - Start server mode (HTTP API)
//!   cs-agent --cli [--session ID]   - Start interactive CLI mode
//!   cs-agent --config PATH          - Load configuration from PATH
//!   cs-agent --help                 - Show help

mod cli;

use std::sync::Arc;
use std::time::Duration;

use cs_api::{AppState, ChatPage};
use cs_core::{ChatService, Config, LlmClient, SessionStore};
use tracing_subscriber::EnvFilter;

/// Session id used by the CLI when none is given
const DEFAULT_CLI_SESSION: &str = "cli-session";

/// Run mode
#[derive(Debug, PartialEq, Eq)]
enum RunMode {
    /// Server mode (HTTP API)
    Server,
    /// Interactive CLI mode
    Cli,
    /// Show help
    Help,
    /// Show version
    Version,
}

/// Parsed command line
#[derive(Debug)]
struct Args {
    mode: RunMode,
    config_path: Option<String>,
    session_id: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    match args.mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("cs-agent {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse()?)
        )
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = match &args.config_path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path);
            Config::from_toml_file(path).map_err(|e| anyhow::anyhow!("Config error: {}", e))?
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?,
    };
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    tracing::info!("Starting cs-agent...");
    tracing::info!("Model: {} ({:?})", config.llm.model, config.llm.provider);

    if config.llm.api_key.is_empty() {
        tracing::warn!("No API key configured (set OPENAI_API_KEY or LLM_API_KEY); chat requests will fail");
    }

    let client = LlmClient::new(&config.llm)
        .map_err(|e| anyhow::anyhow!("Failed to create LLM client: {}", e))?;

    let chat = Arc::new(
        ChatService::from_config(&config, Arc::new(client))
            .map_err(|e| anyhow::anyhow!("Failed to create chat service: {}", e))?,
    );

    match args.mode {
        RunMode::Cli => {
            tracing::info!("Running in CLI mode");
            cli::run_cli(chat, &args.session_id).await
        }
        RunMode::Server => run_server(config, chat).await,
        _ => Ok(()),
    }
}

/// Parse command line arguments
fn parse_args<I>(args: I) -> anyhow::Result<Args>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = Args {
        mode: RunMode::Server,
        config_path: None,
        session_id: DEFAULT_CLI_SESSION.to_string(),
    };

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--cli" | "-c" => parsed.mode = RunMode::Cli,
            "--help" | "-h" => return Ok(Args { mode: RunMode::Help, ..parsed }),
            "--version" | "-v" => return Ok(Args { mode: RunMode::Version, ..parsed }),
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
                parsed.config_path = Some(path);
            }
            "--session" | "-s" => {
                let id = args
                    .next()
                    .filter(|id| !id.trim().is_empty())
                    .ok_or_else(|| anyhow::anyhow!("--session requires an id"))?;
                parsed.session_id = id;
            }
            other => return Err(anyhow::anyhow!("Unknown argument: {} (see --help)", other)),
        }
    }

    Ok(parsed)
}

/// Print help message
fn print_help() {
    println!("cs-agent - Customer Support AI Agent");
    println!();
    println!("Usage:");
    println!("  cs-agent                       Start server mode (HTTP API)");
    println!("  cs-agent --cli [--session ID]  Start interactive CLI mode");
    println!("  cs-agent --config PATH         Load configuration from a TOML file");
    println!("  cs-agent --help                Show this help message");
    println!("  cs-agent --version             Show version");
    println!();
    println!("Environment Variables:");
    println!("  OPENAI_API_KEY         API key");
    println!("  LLM_API_KEY            API key (takes precedence over OPENAI_API_KEY)");
    println!("  LLM_MODEL              Model name (default: gpt-4o-mini)");
    println!("  LLM_PROVIDER           Provider: openai or claude (default: openai)");
    println!("  LLM_BASE_URL           Custom API endpoint");
    println!("  LLM_TIMEOUT_SECS       Completion timeout in seconds (default: 60)");
    println!("  API_HOST               HTTP API host (default: 0.0.0.0)");
    println!("  API_PORT               HTTP API port (default: 8000)");
    println!("  API_ALLOWED_ORIGINS    Comma-separated CORS origins (default: any)");
    println!("  CHAT_PAGE_PATH         HTML file served at GET /chat");
    println!("  SESSION_MAX_TURNS      Turns kept per session (default: 100)");
    println!("  SESSION_TTL_SECS       Idle session lifetime, 0 disables (default: 3600)");
    println!("  SESSION_MAX_SESSIONS   Sessions kept in memory (default: 10000)");
    println!("  PROMPT_PROFILE         storefront or cod-policy (default: storefront)");
    println!("  CHAT_FAILURE_POLICY    error or fallback (default: error)");
}

/// Spawn the background task that drops idle sessions
fn spawn_session_sweeper(store: Arc<SessionStore>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = store.evict_expired();
            if evicted > 0 {
                tracing::debug!("Evicted {} idle sessions, {} remaining", evicted, store.len());
            }
        }
    })
}

/// Run server mode (HTTP API)
async fn run_server(config: Config, chat: Arc<ChatService>) -> anyhow::Result<()> {
    let sweeper = if config.session.ttl_secs > 0 && config.session.sweep_interval_secs > 0 {
        Some(spawn_session_sweeper(
            Arc::clone(chat.store()),
            Duration::from_secs(config.session.sweep_interval_secs),
        ))
    } else {
        tracing::info!("Session sweeper disabled");
        None
    };

    let chat_page = ChatPage::from_path(config.api.chat_page_path.as_deref());
    let state = AppState::new(chat, chat_page);

    tracing::info!("cs-agent initialized successfully");
    tracing::info!("Press Ctrl+C to exit");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
        tracing::info!("Shutting down...");
    };

    let result = cs_api::start_server(&config.api, state, shutdown).await;

    if let Some(handle) = sweeper {
        handle.abort();
    }

    tracing::info!("Shutdown complete");
    result
}
