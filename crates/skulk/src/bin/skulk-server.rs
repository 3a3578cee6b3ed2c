//! Skulk room session server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin skulk-server
//! cargo run --bin skulk-server -- --host 0.0.0.0 --port 9000 --log-level debug
//! ```

use clap::Parser;
use skulk::logging::setup_logger;
use skulk::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "skulk-server", version)]
#[command(about = "WebSocket room server for the Skulk social-deduction game", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "SKULK_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "SKULK_PORT", default_value_t = 8080)]
    port: u16,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Seed for impostor and task sampling
    #[arg(long, env = "SKULK_RNG_SEED")]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    let settings = RoomSettings {
        rng_seed: args.seed,
        ..RoomSettings::default()
    };
    let addr = format!("{}:{}", args.host, args.port);
    let server = match SkulkServer::builder().bind(&addr).settings(settings).build().await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to start");
            std::process::exit(1);
        }
    };
    let orchestrator = server.orchestrator();

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            if let Err(e) = orchestrator.shutdown().await {
                tracing::warn!(error = %e, "orchestrator already stopped");
            }
        }
    }
}
