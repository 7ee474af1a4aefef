use std::str::FromStr;

use chrono::TimeDelta;

use crate::engine::WaitStrategy;
use crate::error::AppError;

/// Control-plane tunables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Dedup window: a fresh SUCCESS within this many minutes suppresses a
    /// new submission.
    pub scrape_interval_minutes: i64,
    /// Retry cap per record.
    pub max_retries: u32,
    /// PENDING records older than this are swept to FAILED.
    pub stale_timeout_minutes: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scrape_interval_minutes: 60,
            max_retries: 3,
            stale_timeout_minutes: 120,
        }
    }
}

impl PipelineConfig {
    /// Read configuration from environment variables.
    ///
    /// - `SCRAPE_INTERVAL_MINUTES` (default 60)
    /// - `MAX_RETRIES` (default 3)
    /// - `STALE_REQUEST_TIMEOUT_MINUTES` (default 120)
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            scrape_interval_minutes: env_parse("SCRAPE_INTERVAL_MINUTES", 60)?,
            max_retries: env_parse("MAX_RETRIES", 3)?,
            stale_timeout_minutes: env_parse("STALE_REQUEST_TIMEOUT_MINUTES", 120)?,
        })
    }

    pub fn dedup_window(&self) -> TimeDelta {
        TimeDelta::minutes(self.scrape_interval_minutes)
    }

    pub fn stale_timeout(&self) -> TimeDelta {
        TimeDelta::minutes(self.stale_timeout_minutes)
    }
}

/// Worker-plane tunables.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Simultaneous pages per worker process; realized as this many
    /// consumer loops, each holding one claim at a time.
    pub concurrent_scrapers: usize,
    /// Navigation timeout in milliseconds.
    pub nav_timeout_ms: u64,
    pub wait_strategy: WaitStrategy,
    /// Abort image/stylesheet/font requests to accelerate load.
    pub disable_images: bool,
    /// Abort stylesheet requests.
    pub disable_css: bool,
    /// Extra settle time after navigation, for pages that render late.
    pub dynamic_wait_ms: u64,
    pub user_agent: String,
}

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            concurrent_scrapers: 3,
            nav_timeout_ms: 15_000,
            wait_strategy: WaitStrategy::Fast,
            disable_images: true,
            disable_css: false,
            dynamic_wait_ms: 0,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ScraperConfig {
    /// Read configuration from environment variables.
    ///
    /// - `CONCURRENT_SCRAPERS` (default 3)
    /// - `NAV_TIMEOUT_MS` (default 15000)
    /// - `WAIT_STRATEGY` (fast | basic | moderate | comprehensive)
    /// - `DISABLE_IMAGES` (default true)
    /// - `DISABLE_CSS` (default false)
    /// - `DYNAMIC_WAIT_MS` (default 0)
    /// - `USER_AGENT` (defaults to a desktop Chrome string)
    pub fn from_env() -> Result<Self, AppError> {
        let concurrent_scrapers: usize = env_parse("CONCURRENT_SCRAPERS", 3)?;
        if concurrent_scrapers == 0 {
            return Err(AppError::Config(
                "CONCURRENT_SCRAPERS must be at least 1".into(),
            ));
        }
        Ok(Self {
            concurrent_scrapers,
            nav_timeout_ms: env_parse("NAV_TIMEOUT_MS", 15_000)?,
            wait_strategy: env_parse("WAIT_STRATEGY", WaitStrategy::Fast)?,
            disable_images: env_bool("DISABLE_IMAGES", true)?,
            disable_css: env_bool("DISABLE_CSS", false)?,
            dynamic_wait_ms: env_parse("DYNAMIC_WAIT_MS", 0)?,
            user_agent: std::env::var("USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.into()),
        })
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("Invalid {name}: '{raw}'"))),
    }
}

fn env_bool(name: &str, default: bool) -> Result<bool, AppError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(AppError::Config(format!(
                "Invalid {name}: '{raw}' (expected true/false)"
            ))),
        },
    }
}
