mod commands;
mod config;
mod server;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::commands::{cmd_analyze, cmd_history, cmd_stats, cmd_today, cmd_week};
use crate::config::{Config, VisionArgs, init_tracing};
use smartmacro_core::db::HistoryStore;
use smartmacro_core::service::{DEFAULT_HISTORY_DAYS, NutritionService, Reports};
use smartmacro_core::vision::VisionClient;

#[derive(Parser)]
#[command(
    name = "smartmacro",
    version,
    about = "Estimate nutrition from food photos and track it over time"
)]
struct Cli {
    /// Path to the history database
    #[arg(long, global = true, env = "DATABASE_PATH", value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a food photo and save the result to history
    Analyze {
        /// Path to the image file (JPEG, PNG, GIF or WebP)
        image: PathBuf,
        /// User the analysis belongs to
        #[arg(short, long)]
        user: i64,
        /// Display name stored with the record
        #[arg(long)]
        username: Option<String>,
        /// Reference to the original photo (default: the image path)
        #[arg(long)]
        source: Option<String>,
        #[command(flatten)]
        vision: VisionArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recently analyzed meals (newest first, at most 20)
    History {
        #[arg(short, long)]
        user: i64,
        /// Number of days to look back (1-30)
        #[arg(short, long, default_value_t = DEFAULT_HISTORY_DAYS)]
        days: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show totals for one day (defaults to today, UTC)
    Today {
        #[arg(short, long)]
        user: i64,
        /// Date to show (YYYY-MM-DD, today or yesterday)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show averages for the current Monday-based week
    Week {
        #[arg(short, long)]
        user: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show all-time statistics
    Stats {
        #[arg(short, long)]
        user: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        #[command(flatten)]
        vision: VisionArgs,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if matches!(cli.command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    init_tracing(default_level);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.db)?;
    let store = HistoryStore::open(&config.db_path).with_context(|| {
        format!("Failed to open history database: {}", config.db_path.display())
    })?;

    match cli.command {
        Commands::Analyze {
            image,
            user,
            username,
            source,
            vision,
            json,
        } => {
            let client = VisionClient::new(vision.analyzer_config()?)?;
            let service = NutritionService::new(Arc::new(client), store);
            cmd_analyze(&service, &image, user, username.as_deref(), source, json).await
        }
        Commands::History { user, days, json } => {
            cmd_history(&Reports::new(store), user, days, json)
        }
        Commands::Today { user, date, json } => cmd_today(&Reports::new(store), user, date, json),
        Commands::Week { user, json } => cmd_week(&Reports::new(store), user, json),
        Commands::Stats { user, json } => cmd_stats(&Reports::new(store), user, json),
        Commands::Serve { port, bind, vision } => {
            // Read endpoints work without a key; analysis is disabled instead
            let service = match vision.analyzer_config() {
                Ok(analyzer) => {
                    let client = VisionClient::new(analyzer)?;
                    Some(NutritionService::new(Arc::new(client), store.clone()))
                }
                Err(e) => {
                    eprintln!("Warning: {e:#}. Photo analysis endpoint is disabled.");
                    None
                }
            };
            server::start_server(Reports::new(store), service, port, &bind).await
        }
    }
}
