use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use diffbot_runtime::config::Args;

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();

    if let Err(e) = diffbot_runtime::runtime::run(args).await {
        error!("Control task aborted: {}", e);
        std::process::exit(1);
    }
}
