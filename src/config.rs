//! Configuration management for vintry using the prefer crate for discovery.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::fetch::BrowserTierConfig;

/// Default database filename for the sqlite profile store.
pub const DEFAULT_DATABASE_FILENAME: &str = "vintry.db";

/// Every named tunable of the routing core. All of these ship with one
/// consistent default set and are overridable from the config file; none
/// are hardcoded at call sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// EMA smoothing factor for success rates and latency.
    pub ema_alpha: f64,
    /// Minimum recorded attempts before history shortcuts apply.
    pub min_samples_for_shortcuts: u64,
    /// Tier 3 fast path: tier3 rate above this...
    pub tier3_fast_path_rate: f64,
    /// ...while tier1 rate is below this.
    pub tier1_giveup_rate: f64,
    /// Tier 2 fast path: tier2 rate above this...
    pub tier2_fast_path_rate: f64,
    /// ...while tier1 rate is below this.
    pub tier1_weak_rate: f64,
    /// Classifier floor: a transport-successful attempt at a tier whose
    /// historical rate is below this is still treated as a soft failure.
    pub low_success_floor: f64,

    /// Conservative baseline timeout for domains without history.
    pub base_timeout_ms: u64,
    /// Hard ceiling on any per-attempt timeout.
    pub max_timeout_ms: u64,
    /// Successes needed before the learned baseline timeout is trusted.
    pub min_successes_for_baseline: u64,
    /// Floor for the learned baseline timeout.
    pub min_recommended_timeout_ms: u64,

    /// Sticky Tier 3 expiry window. Source material disagrees on this value
    /// (3 vs 7 days); 3 is the chosen default, see DESIGN.md.
    pub sticky_tier3_expiry_days: i64,

    /// Bodies shorter than this with no visible text are JS placeholders;
    /// shorter than this at all is treated as an age-gate candidate.
    pub placeholder_min_len: usize,
    /// Age-verification phrases (matched case-insensitively).
    pub age_gate_phrases: Vec<String>,
    /// Affirmative button texts the browser tier will click on age gates.
    pub age_gate_buttons: Vec<String>,

    /// Politeness delay bounds between attempts to the same domain.
    pub pace_min_ms: u64,
    pub pace_max_ms: u64,

    /// Consecutive logical-fetch failures per domain before alerting.
    pub failure_alert_threshold: u32,

    /// Intra-tier network-error retries for the direct fetcher (0-3).
    pub direct_max_retries: u32,

    /// Cost units recorded per paid rendering call.
    pub render_cost_units: f64,

    /// Profile store retention window.
    pub profile_ttl_days: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            ema_alpha: 0.2,
            min_samples_for_shortcuts: 10,
            tier3_fast_path_rate: 0.8,
            tier1_giveup_rate: 0.2,
            tier2_fast_path_rate: 0.8,
            tier1_weak_rate: 0.3,
            low_success_floor: 0.3,
            base_timeout_ms: 10_000,
            max_timeout_ms: 60_000,
            min_successes_for_baseline: 5,
            min_recommended_timeout_ms: 5_000,
            sticky_tier3_expiry_days: 3,
            placeholder_min_len: 500,
            age_gate_phrases: default_age_gate_phrases(),
            age_gate_buttons: default_age_gate_buttons(),
            pace_min_ms: 500,
            pace_max_ms: 1_500,
            failure_alert_threshold: 5,
            direct_max_retries: 2,
            render_cost_units: 1.0,
            profile_ttl_days: 30,
        }
    }
}

fn default_age_gate_phrases() -> Vec<String> {
    [
        "legal drinking age",
        "are you 21",
        "are you 18",
        "age verification",
        "verify your age",
        "must be 21",
        "must be of legal",
        "21 years of age",
        "confirm your age",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_age_gate_buttons() -> Vec<String> {
    [
        "yes",
        "enter",
        "confirm",
        "agree",
        "accept",
        "i am 21",
        "i am 18",
        "i'm over 21",
        "over 18",
        "over 21",
        "i am of legal drinking age",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory (sqlite store, cookie state).
    pub data_dir: PathBuf,
    /// Profile store URL (None = sqlite in data_dir, "memory" = ephemeral,
    /// "redis://..." = shared Redis).
    pub profile_store: Option<String>,
    /// User agent for direct requests. "impersonate" rotates real browser
    /// user agents; any other string is used verbatim.
    pub user_agent: Option<String>,
    /// Paid rendering/proxy API endpoint and token (Tier 3).
    pub render_api_url: Option<String>,
    pub render_api_token: Option<String>,
    /// Headless browser settings (Tier 2).
    pub browser: BrowserTierConfig,
    /// Routing tunables.
    pub router: RouterConfig,
}

impl Default for Settings {
    fn default() -> Self {
        // Default to a per-user data directory, falling back gracefully.
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vintry");

        Self {
            data_dir,
            profile_store: None,
            user_agent: None,
            render_api_url: None,
            render_api_token: None,
            browser: BrowserTierConfig::default(),
            router: RouterConfig::default(),
        }
    }
}

impl Settings {
    /// Full path to the sqlite profile database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DEFAULT_DATABASE_FILENAME)
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Profile store URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_store: Option<String>,
    /// User agent string or "impersonate".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Paid rendering API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_api_url: Option<String>,
    /// Paid rendering API token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_api_token: Option<String>,
    /// Browser tier configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<BrowserTierConfig>,
    /// Routing tunables.
    #[serde(default)]
    pub router: RouterConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers vintry config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("vintry").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(_) => Self::default(),
                    }
                } else {
                    Self::default()
                }
            }
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML, and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref store) = self.profile_store {
            settings.profile_store = Some(store.clone());
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(ref url) = self.render_api_url {
            settings.render_api_url = Some(url.clone());
        }
        if let Some(ref token) = self.render_api_token {
            settings.render_api_token = Some(token.clone());
        }
        if let Some(ref browser) = self.browser {
            settings.browser = browser.clone();
        }
        settings.router = self.router.clone();
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory override (--data flag).
    pub data: Option<PathBuf>,
}

/// Load settings with explicit options. Returns (Settings, Config).
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let config = if let Some(ref config_path) = options.config_path {
        Config::load_from_path(config_path)
            .await
            .unwrap_or_default()
    } else {
        Config::load().await
    };

    let mut settings = Settings::default();

    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    config.apply_to_settings(&mut settings, &base_dir);

    if let Some(ref data_dir) = options.data {
        settings.data_dir = data_dir.clone();
    }

    // Environment variables take precedence over config.
    if let Some(store) = env_nonempty("PROFILE_STORE") {
        tracing::debug!("Using PROFILE_STORE from environment: {}", store);
        settings.profile_store = Some(store);
    }
    if let Some(url) = env_nonempty("RENDER_API_URL") {
        tracing::debug!("Using RENDER_API_URL from environment: {}", url);
        settings.render_api_url = Some(url);
    }
    if let Some(token) = env_nonempty("RENDER_API_TOKEN") {
        settings.render_api_token = Some(token);
    }
    if let Some(browser_url) = env_nonempty("BROWSER_URL") {
        tracing::debug!("Using BROWSER_URL from environment: {}", browser_url);
        settings.browser.remote_url = Some(browser_url);
    }
    if let Some(user_agent) = env_nonempty("VINTRY_USER_AGENT") {
        settings.user_agent = Some(user_agent);
    }

    (settings, config)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_config_defaults_are_consistent() {
        let cfg = RouterConfig::default();
        assert_eq!(cfg.ema_alpha, 0.2);
        assert_eq!(cfg.base_timeout_ms, 10_000);
        assert_eq!(cfg.max_timeout_ms, 60_000);
        assert_eq!(cfg.sticky_tier3_expiry_days, 3);
        assert!(cfg.pace_min_ms < cfg.pace_max_ms);
        assert!(cfg.direct_max_retries <= 3);
        assert!(!cfg.age_gate_phrases.is_empty());
    }

    #[test]
    fn test_partial_router_section_keeps_defaults() {
        let toml = r#"
            [router]
            sticky_tier3_expiry_days = 7
            placeholder_min_len = 300
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.router.sticky_tier3_expiry_days, 7);
        assert_eq!(config.router.placeholder_min_len, 300);
        // Untouched fields keep the default set.
        assert_eq!(config.router.ema_alpha, 0.2);
        assert_eq!(config.router.max_timeout_ms, 60_000);
    }

    #[test]
    fn test_apply_to_settings() {
        let config = Config {
            data_dir: Some("/tmp/vintry-test".to_string()),
            profile_store: Some("memory".to_string()),
            user_agent: Some("impersonate".to_string()),
            ..Default::default()
        };

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, Path::new("/"));
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/vintry-test"));
        assert_eq!(settings.profile_store.as_deref(), Some("memory"));
        assert_eq!(settings.user_agent.as_deref(), Some("impersonate"));
    }
}
