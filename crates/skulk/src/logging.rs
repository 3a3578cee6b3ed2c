//! Tracing subscriber setup for the server binary.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose events the default filter lets through.
const TARGETS: [&str; 6] = [
    "skulk",
    "skulk_room",
    "skulk_session",
    "skulk_timer",
    "skulk_transport",
    "skulk_protocol",
];

/// Installs a global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise every Skulk crate and the binary
/// log at `default_level`.
pub fn setup_logger(binary_name: &str, default_level: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(binary_name, default_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn default_filter(binary_name: &str, level: &str) -> String {
    TARGETS
        .iter()
        .copied()
        .chain(std::iter::once(binary_name))
        .map(|target| format!("{}={level}", target.replace('-', "_")))
        .collect::<Vec<_>>()
        .join(",")
}
