//! Runtime configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_duration_millis(key: &str, default_millis: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(default_millis))
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Worker pool and retry tuning for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub workers: usize,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            workers: env_usize("SCAN_WORKERS", 8).max(1),
            max_attempts: env_u32("SCAN_MAX_ATTEMPTS", 5).max(1),
            initial_backoff: env_duration_millis("SCAN_INITIAL_BACKOFF_MS", 1_000),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

/// Stall detection for a running scan.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    pub poll_interval: Duration,
    pub stall_timeout: Duration,
}

impl WatchdogConfig {
    pub fn from_env() -> Self {
        Self {
            poll_interval: env_duration_millis("SCAN_WATCHDOG_INTERVAL_MS", 5_000),
            stall_timeout: env_duration_millis("SCAN_STALL_TIMEOUT_MS", 30_000),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            stall_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub path: PathBuf,
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            path: PathBuf::from(env_string("CACHE_PATH", "./.cache/messages.db")),
            ttl: env_duration_secs("CACHE_TTL_SECS", 24 * 60 * 60),
            sweep_interval: env_duration_secs("CACHE_SWEEP_INTERVAL_SECS", 60 * 60),
        }
    }
}

/// Bounds applied to the requested scan window and the sender being scanned.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub sender: String,
    pub default_days: u32,
    pub max_days: u32,
}

impl WindowConfig {
    pub fn from_env() -> Self {
        let default_days = env_u32("SCAN_DEFAULT_DAYS", 10).max(1);
        let max_days = env_u32("SCAN_MAX_DAYS", 365).max(default_days);
        Self {
            sender: env_string("ORDER_SENDER", "help@walmart.com"),
            default_days,
            max_days,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            sender: "help@walmart.com".to_string(),
            default_days: 10,
            max_days: 365,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub access_token: Option<String>,
}

impl GmailConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env_string("GMAIL_API_BASE_URL", "https://gmail.googleapis.com/gmail/v1"),
            request_timeout: env_duration_millis("GMAIL_TIMEOUT_MS", 30_000),
            access_token: env::var("GMAIL_ACCESS_TOKEN")
                .ok()
                .filter(|token| !token.trim().is_empty()),
        }
    }
}

/// Aggregate configuration for the service and the CLI.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub watchdog: WatchdogConfig,
    pub cache: CacheConfig,
    pub window: WindowConfig,
    pub gmail: GmailConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            pipeline: PipelineConfig::from_env(),
            watchdog: WatchdogConfig::from_env(),
            cache: CacheConfig::from_env(),
            window: WindowConfig::from_env(),
            gmail: GmailConfig::from_env(),
        }
    }
}
