use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use windvane::app::App;
use windvane::config::Config;

#[derive(Parser)]
#[command(name = "windvane", about = "Short-window binary market divergence engine")]
struct Cli {
    /// Path to the config file
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Log signals without placing orders
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };
    if cli.dry_run {
        config.execution.dry_run = true;
    }

    config.init_logging();
    info!("windvane starting");

    tokio::select! {
        result = App::run(config) => {
            if let Err(e) = result {
                error!(error = %e, "fatal error");
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    info!("windvane stopped");
}
