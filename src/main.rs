//! vintry - adaptive multi-tier product page acquisition.
//!
//! A routing layer that retrieves product pages from retail, producer, and
//! award sites that vary wildly in how aggressively they block automation.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vintry::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "vintry=info"
    } else {
        "vintry=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Run CLI
    cli::run().await
}
