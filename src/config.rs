//! Runtime configuration and immutable filter/profile documents.
//!
//! Runtime knobs come from environment variables (with `.env` support in the
//! binary). The filter template and threshold profiles are versioned JSON
//! documents loaded once at startup; they are never mutated in place, a
//! reload swaps the whole value.

use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::path::Path;

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
    UnknownProfile(String),
    UnknownTemplate(String),
    Io(String),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
            ConfigError::UnknownProfile(name) => write!(f, "Unknown profile: {}", name),
            ConfigError::UnknownTemplate(name) => write!(f, "Unknown filter template: {}", name),
            ConfigError::Io(msg) => write!(f, "Config file error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Config parse error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Process-level runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: String,

    /// WebSocket endpoint for the logs subscription feed.
    pub ws_url: String,

    /// HTTP JSON-RPC endpoint for transaction lookups.
    pub rpc_url: String,

    /// Telegram credentials. Alerts are log-only when absent.
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,

    /// Directory holding `filters/` and `profiles/` JSON documents.
    pub config_dir: String,

    /// Named filter template and threshold profile to activate.
    pub filter_template: String,
    pub profile: String,

    /// Notification channel buffer between subscription and workers.
    pub channel_buffer: usize,

    /// Maximum concurrent transaction resolutions.
    pub resolver_workers: usize,

    /// Dedup gate retention, in signatures.
    pub dedup_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `POOLWATCH_WS_URL` (wss:// or ws://)
    /// - `POOLWATCH_RPC_URL` (https:// or http://)
    ///
    /// Optional (defaults in parentheses):
    /// - `POOLWATCH_DB_PATH` (data/poolwatch.db)
    /// - `POOLWATCH_CONFIG_DIR` (config)
    /// - `FILTER_TEMPLATE` (default), `POOLWATCH_PROFILE` (balanced)
    /// - `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`
    /// - `NOTIFICATION_CHANNEL_BUFFER` (1000)
    /// - `RESOLVER_WORKERS` (8), `DEDUP_CAPACITY` (1000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let ws_url = env::var("POOLWATCH_WS_URL")
            .map_err(|_| ConfigError::MissingVariable("POOLWATCH_WS_URL".to_string()))?;

        if !ws_url.starts_with("wss://") && !ws_url.starts_with("ws://") {
            return Err(ConfigError::InvalidValue(
                "POOLWATCH_WS_URL must start with wss:// or ws://".to_string(),
            ));
        }

        let rpc_url = env::var("POOLWATCH_RPC_URL")
            .map_err(|_| ConfigError::MissingVariable("POOLWATCH_RPC_URL".to_string()))?;

        if !rpc_url.starts_with("https://") && !rpc_url.starts_with("http://") {
            return Err(ConfigError::InvalidValue(
                "POOLWATCH_RPC_URL must start with https:// or http://".to_string(),
            ));
        }

        Ok(Self {
            db_path: env::var("POOLWATCH_DB_PATH")
                .unwrap_or_else(|_| "data/poolwatch.db".to_string()),
            ws_url,
            rpc_url,
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_chat_id: env::var("TELEGRAM_CHAT_ID").ok(),
            config_dir: env::var("POOLWATCH_CONFIG_DIR").unwrap_or_else(|_| "config".to_string()),
            filter_template: env::var("FILTER_TEMPLATE").unwrap_or_else(|_| "default".to_string()),
            profile: env::var("POOLWATCH_PROFILE").unwrap_or_else(|_| "balanced".to_string()),
            channel_buffer: env::var("NOTIFICATION_CHANNEL_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1_000),
            resolver_workers: env::var("RESOLVER_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8),
            dedup_capacity: env::var("DEDUP_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1_000),
        })
    }
}

fn default_max_pair_age_hours() -> f64 {
    24.0
}

fn default_preferred_pair_age_hours() -> f64 {
    6.0
}

fn default_max_market_cap() -> f64 {
    20_000_000.0
}

fn default_signal_window_minutes() -> i64 {
    30
}

fn default_require_multi_signal() -> bool {
    true
}

fn default_hard_reject_baseline() -> f64 {
    20.0
}

fn default_legacy_memes() -> HashSet<String> {
    [
        "BONK", "WIF", "DOGE", "SHIB", "PEPE", "FLOKI", "BABYDOGE", "MOON", "SAMO", "KING",
        "MONKY",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Hard-reject thresholds. Any one trigger discards the event outright.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HardRejectRules {
    #[serde(rename = "pair_age_hours_gt", default = "default_max_pair_age_hours")]
    pub pair_age_hours: f64,
    #[serde(rename = "market_cap_usd_gte", default = "default_max_market_cap")]
    pub market_cap_usd: f64,
    #[serde(rename = "baseline_liquidity_sol_gt", default = "default_hard_reject_baseline")]
    pub baseline_liquidity_sol: f64,
}

impl Default for HardRejectRules {
    fn default() -> Self {
        Self {
            pair_age_hours: default_max_pair_age_hours(),
            market_cap_usd: default_max_market_cap(),
            baseline_liquidity_sol: default_hard_reject_baseline(),
        }
    }
}

/// Immutable early-stage filter template.
///
/// Loaded once per process lifetime from `config/filters/<name>.json`;
/// swapped only by restart, never mutated while evaluations may read it.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FilterTemplate {
    #[serde(default = "default_max_pair_age_hours")]
    pub max_pair_age_hours: f64,
    #[serde(default = "default_preferred_pair_age_hours")]
    pub preferred_pair_age_hours: f64,
    #[serde(rename = "max_market_cap", default = "default_max_market_cap")]
    pub max_market_cap_usd: f64,
    #[serde(default = "default_signal_window_minutes")]
    pub signal_window_minutes: i64,
    #[serde(default = "default_require_multi_signal")]
    pub require_multi_signal: bool,
    #[serde(rename = "hard_reject_if", default)]
    pub hard_reject: HardRejectRules,
    #[serde(default = "default_legacy_memes")]
    pub legacy_memes: HashSet<String>,
}

impl Default for FilterTemplate {
    fn default() -> Self {
        Self {
            max_pair_age_hours: default_max_pair_age_hours(),
            preferred_pair_age_hours: default_preferred_pair_age_hours(),
            max_market_cap_usd: default_max_market_cap(),
            signal_window_minutes: default_signal_window_minutes(),
            require_multi_signal: default_require_multi_signal(),
            hard_reject: HardRejectRules::default(),
            legacy_memes: default_legacy_memes(),
        }
    }
}

impl FilterTemplate {
    /// Load a named template from `<config_dir>/filters/<name>.json`.
    ///
    /// The built-in `default` template is used when no file overrides it;
    /// any other missing name is an error.
    pub fn load(config_dir: &str, name: &str) -> Result<Self, ConfigError> {
        let path = Path::new(config_dir).join("filters").join(format!("{}.json", name));

        if !path.exists() {
            if name == "default" {
                return Ok(Self::default());
            }
            return Err(ConfigError::UnknownTemplate(name.to_string()));
        }

        let raw = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))
    }
}

/// Immutable per-kind alert thresholds plus the daily action quota.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FilterProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub lp_add_min_sol: f64,
    pub lp_add_min_usd: f64,
    pub lp_remove_min_pct: f64,
    pub volume_spike_multiplier: f64,
    pub max_actions_per_day: u32,
}

impl FilterProfile {
    fn built_in(name: &str) -> Option<Self> {
        let profile = match name {
            "conservative" => Self {
                name: "conservative".to_string(),
                description: "Only high-quality LP additions, lower alert frequency".to_string(),
                lp_add_min_sol: 2_000.0,
                lp_add_min_usd: 300_000.0,
                lp_remove_min_pct: 70.0,
                volume_spike_multiplier: 5.0,
                max_actions_per_day: 1,
            },
            "balanced" => Self {
                name: "balanced".to_string(),
                description: "Balanced alert frequency and opportunity coverage".to_string(),
                lp_add_min_sol: 500.0,
                lp_add_min_usd: 50_000.0,
                lp_remove_min_pct: 50.0,
                volume_spike_multiplier: 3.0,
                max_actions_per_day: 2,
            },
            "aggressive" => Self {
                name: "aggressive".to_string(),
                description: "More alerts, earlier entries, higher frequency".to_string(),
                lp_add_min_sol: 100.0,
                lp_add_min_usd: 5_000.0,
                lp_remove_min_pct: 30.0,
                volume_spike_multiplier: 2.0,
                max_actions_per_day: 5,
            },
            "degens_only" => Self {
                name: "degens_only".to_string(),
                description: "Maximum alerts, use at your own risk".to_string(),
                lp_add_min_sol: 50.0,
                lp_add_min_usd: 1_000.0,
                lp_remove_min_pct: 20.0,
                volume_spike_multiplier: 1.5,
                max_actions_per_day: 10,
            },
            _ => return None,
        };
        Some(profile)
    }

    /// Load a named profile: a JSON document under
    /// `<config_dir>/profiles/<name>.json` wins over the built-in set.
    pub fn load(config_dir: &str, name: &str) -> Result<Self, ConfigError> {
        let path = Path::new(config_dir).join("profiles").join(format!("{}.json", name));

        if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
            let mut profile: Self = serde_json::from_str(&raw)
                .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
            if profile.name.is_empty() {
                profile.name = name.to_string();
            }
            return Ok(profile);
        }

        Self::built_in(name).ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
    }

    pub fn built_in_names() -> &'static [&'static str] {
        &["conservative", "balanced", "aggressive", "degens_only"]
    }
}
