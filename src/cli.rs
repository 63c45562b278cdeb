//! CLI commands: operational and debugging surface over the fetch router.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};
use crate::fetch::Router;
use crate::models::{FetchHints, Tier};

#[derive(Parser)]
#[command(name = "vintry")]
#[command(about = "Adaptive multi-tier product page acquisition")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one URL through the tier router
    Fetch {
        /// URL to fetch
        url: String,
        /// Force a starting tier (1=direct, 2=browser, 3=render API)
        #[arg(short, long)]
        tier: Option<u8>,
        /// Print the fetched content to stdout
        #[arg(short, long)]
        content: bool,
        /// Print the full result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the learned profile for a domain
    Profile {
        /// Domain (hostname) to inspect
        domain: String,
    },

    /// List domains with live profiles
    Profiles,

    /// Show router configuration and store status
    Status,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (settings, _config) = load_settings_with_options(LoadOptions {
        config_path: cli.config.clone(),
        data: cli.data_dir.clone(),
    })
    .await;
    settings.ensure_directories()?;

    match cli.command {
        Commands::Fetch {
            url,
            tier,
            content,
            json,
        } => {
            let force_tier = match tier {
                Some(n) => Some(
                    Tier::from_number(n)
                        .with_context(|| format!("Invalid tier {n}, expected 1-3"))?,
                ),
                None => None,
            };

            let router = Router::from_settings(&settings).await?;
            let result = router
                .fetch(
                    &url,
                    FetchHints {
                        force_tier,
                        product_type_hint: None,
                    },
                )
                .await;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            for (i, attempt) in result.attempts.iter().enumerate() {
                let outcome = if attempt.succeeded() {
                    "ok".to_string()
                } else if let Some(ref soft) = attempt.soft_failure {
                    format!("soft failure: {soft}")
                } else {
                    attempt.error.clone().unwrap_or_else(|| "error".to_string())
                };
                println!(
                    "attempt {} tier={} timeout={}ms elapsed={}ms {}",
                    i + 1,
                    attempt.tier,
                    attempt.timeout_ms,
                    attempt.elapsed_ms,
                    outcome
                );
            }

            if result.succeeded {
                println!(
                    "fetched {} via {} in {}ms ({} bytes)",
                    result.final_url.as_deref().unwrap_or(&url),
                    result.final_tier.map(|t| t.to_string()).unwrap_or_default(),
                    result.total_elapsed_ms,
                    result.content.as_deref().map(str::len).unwrap_or(0)
                );
                if content {
                    if let Some(ref body) = result.content {
                        println!("{body}");
                    }
                }
                Ok(())
            } else {
                anyhow::bail!("all tiers exhausted for {url}");
            }
        }

        Commands::Profile { domain } => {
            let router = Router::from_settings(&settings).await?;
            let profile = router
                .store()
                .get(&domain)
                .await
                .map_err(|e| anyhow::anyhow!("profile store: {e}"))?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
            Ok(())
        }

        Commands::Profiles => {
            let router = Router::from_settings(&settings).await?;
            let domains = router
                .store()
                .domains()
                .await
                .map_err(|e| anyhow::anyhow!("profile store: {e}"))?;
            if domains.is_empty() {
                println!("no live domain profiles");
            }
            for domain in domains {
                println!("{domain}");
            }
            Ok(())
        }

        Commands::Status => {
            println!("data dir:      {}", settings.data_dir.display());
            println!(
                "profile store: {}",
                settings.profile_store.as_deref().unwrap_or("sqlite")
            );
            println!(
                "render API:    {}",
                settings
                    .render_api_url
                    .as_deref()
                    .unwrap_or("not configured")
            );
            println!(
                "browser:       {}",
                settings
                    .browser
                    .remote_url
                    .as_deref()
                    .unwrap_or("local chrome")
            );
            println!(
                "sticky tier 3 expiry: {} days",
                settings.router.sticky_tier3_expiry_days
            );

            let router = Router::from_settings(&settings).await?;
            match router.store().domains().await {
                Ok(domains) => println!("live profiles: {}", domains.len()),
                Err(e) => println!("live profiles: store unreachable ({e})"),
            }
            Ok(())
        }
    }
}
