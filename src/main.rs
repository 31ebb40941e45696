use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mission_control::config::{self, Config};
use mission_control::missions::MissionService;
use mission_control::store::PersistentStore;
use mission_control::{api, mcp};

#[derive(Parser)]
#[command(name = "mctl")]
#[command(about = "Goal-driven missions with validated attempts for AI agents")]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct StoreArgs {
    /// Directory holding the mission snapshot
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Keep missions in memory only
    #[arg(long, global = true)]
    no_persist: bool,

    /// Days to keep completed missions (0 keeps them forever)
    #[arg(long, global = true, default_value_t = config::DEFAULT_COMPLETED_RETENTION_DAYS)]
    completed_retention_days: u32,

    /// Days to keep failed missions (0 keeps them forever)
    #[arg(long, global = true, default_value_t = config::DEFAULT_FAILED_RETENTION_DAYS)]
    failed_retention_days: u32,

    /// Delay before a change is written to disk
    #[arg(long, global = true, default_value = "1000")]
    flush_debounce_ms: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = config::DEFAULT_LOG_LEVEL)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Start MCP server via stdio
    Mcp,
    /// Remove finished missions past their retention window
    Sweep,
    /// Show what is in the mission store
    Status,
}

impl StoreArgs {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match self.state_dir {
            Some(dir) => Config::new(dir),
            None => Config::with_default_dir()?,
        };
        config.persistence_enabled = !self.no_persist;
        config.completed_retention_days = self.completed_retention_days;
        config.failed_retention_days = self.failed_retention_days;
        config.flush_debounce = Duration::from_millis(self.flush_debounce_ms);
        config.log_level = self.log_level;
        Ok(config)
    }
}

/// Initialize tracing with output to stderr (for MCP mode) or stdout
fn init_tracing(use_stderr: bool, level: &str) {
    let filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(
        |_| format!("mission_control={level},mctl={level},tower_http={level}"),
    ));

    if use_stderr {
        // MCP mode: log to stderr so stdout is clean for protocol
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn serve(service: MissionService, port: u16) -> anyhow::Result<()> {
    tracing::info!("Starting mission control server on port {}", port);

    let app = api::create_router(service.clone());

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Mission control listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    service.store().shutdown().await?;
    Ok(())
}

fn print_status(service: &MissionService, config: &Config) -> anyhow::Result<()> {
    let missions = service.list_missions(None);

    let mut by_state: BTreeMap<&'static str, usize> = BTreeMap::new();
    for mission in &missions {
        *by_state.entry(mission.state.as_str()).or_default() += 1;
    }

    if config.persistence_enabled {
        println!("State directory: {}", config.state_dir.display());
    } else {
        println!("State directory: (persistence disabled)");
    }
    println!("Missions: {}", missions.len());
    for (state, count) in &by_state {
        println!("  {:<12} {}", state, count);
    }

    let metrics = service.store().metrics();
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.store.into_config()?;

    // MCP mode needs stderr for logging since stdout is the protocol channel
    let use_stderr = matches!(cli.command, Some(Commands::Mcp));
    init_tracing(use_stderr, &config.log_level);

    let store = PersistentStore::open(config.store_config())?;
    let service = MissionService::new(store.clone());

    // `status` is read-only and reports what is on disk.
    let read_only = matches!(cli.command, Some(Commands::Status));
    let removed = if read_only {
        Vec::new()
    } else {
        service.sweep_expired()
    };

    match cli.command {
        Some(Commands::Serve { port }) => serve(service, port).await?,
        Some(Commands::Mcp) => {
            mcp::run_stdio_server(service).await?;
            store.shutdown().await?;
        }
        Some(Commands::Sweep) => {
            store.shutdown().await?;
            println!("Removed {} expired mission(s)", removed.len());
            for id in removed {
                println!("  {}", id);
            }
        }
        Some(Commands::Status) => print_status(&service, &config)?,
        None => serve(service, 3000).await?,
    }

    Ok(())
}
