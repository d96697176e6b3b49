//! Binary entrypoint: load `.env`, install the tracing subscriber, parse the
//! CLI, and map any error to its spec.md §7 exit code.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use barnabee_core::cli::{self, Cli};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    if let Err(err) = cli::run(cli).await {
        tracing::error!(error = %err, "barnabee exited with an error");
        std::process::exit(err.exit_code());
    }
}
