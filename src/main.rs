// ABOUTME: Main entry point for the roompoll long-polling server
// ABOUTME: Parses the CLI, initializes logging and config, builds sources, and serves HTTP

use anyhow::Result;
use clap::{Parser, Subcommand};
use roompoll::{config::Config, metrics, paths, server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "roompoll")]
#[command(about = "Long-polling event server that waits on many event sources at once")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Start,

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
    /// Print which config file would be loaded
    Path,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);
    dotenvy::dotenv().ok();

    match cli.command.unwrap_or(Commands::Start) {
        Commands::Start => start().await,
        Commands::Config { action } => match action {
            ConfigCommand::Show => {
                let config = Config::load()?;
                print!("{}", config.to_toml()?);
                Ok(())
            }
            ConfigCommand::Path => {
                match Config::find_config_file() {
                    Some(path) => println!("{}", path.display()),
                    None => println!(
                        "No config file found (defaults apply; would read {})",
                        paths::config_file().display()
                    ),
                }
                Ok(())
            }
        },
    }
}

async fn start() -> Result<()> {
    tracing::info!("Starting roompoll");

    let config = Config::load()?;
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        default_room = %config.server.default_room,
        wait_timeout_secs = config.poll.wait_timeout_secs,
        sources = config.sources.len(),
        "Configuration loaded"
    );

    let metrics_handle = if config.metrics.enabled {
        Some(metrics::init_metrics()?)
    } else {
        None
    };

    let state = server::AppState::from_config(&config, metrics_handle).await?;
    server::serve(&config.server, state).await
}
