//! Run configuration for the retrieval engine.
//!
//! One explicit record replaces the scattered mode toggles the target site's
//! operators used to juggle: confirmation on/off, test mode, and the bounded
//! loop limits all live here and are consumed in exactly one place each.

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Everything one engine run needs. Deserializable so callers can load it
/// from a settings file; every tunable has a default.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Entry URL of the portal (the login page).
    pub base_url: String,
    pub credentials: Credentials,
    /// Root directory downloads are bound to. Created if absent.
    pub download_root: PathBuf,
    #[serde(default = "default_true")]
    pub headless: bool,
    /// When false the remote system is never told to consume an order, so the
    /// same rows reappear every round and client-side tracking kicks in.
    #[serde(default = "default_true")]
    pub confirmation_enabled: bool,
    /// Process a single order and stop.
    #[serde(default)]
    pub test_mode: bool,
    /// Hard ceiling on listing rounds, checked before every transition.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Consecutive rounds without a new row identifier before the engine
    /// declares discovery stalled (confirmation-disabled mode only).
    #[serde(default = "default_stall_limit")]
    pub stall_limit: u32,
    #[serde(default)]
    pub timeouts: Timeouts,
    /// Port the chromedriver process listens on.
    #[serde(default = "default_webdriver_port")]
    pub webdriver_port: u16,
}

/// Login triple for the portal.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub org_code: String,
    pub login_id: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("org_code", &self.org_code)
            .field("login_id", &self.login_id)
            .field("password", &"***")
            .finish()
    }
}

/// Per-wait bounds, in milliseconds so they deserialize plainly.
#[derive(Debug, Clone, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_page_ready_ms")]
    pub page_ready_ms: u64,
    /// Budget each locator strategy gets before the next one is tried.
    #[serde(default = "default_per_strategy_ms")]
    pub per_strategy_ms: u64,
    #[serde(default = "default_download_ms")]
    pub download_ms: u64,
    /// Poll interval shared by all bounded waits.
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
}

impl Timeouts {
    pub fn page_ready(&self) -> Duration {
        Duration::from_millis(self.page_ready_ms)
    }

    pub fn per_strategy(&self) -> Duration {
        Duration::from_millis(self.per_strategy_ms)
    }

    pub fn download(&self) -> Duration {
        Duration::from_millis(self.download_ms)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            page_ready_ms: default_page_ready_ms(),
            per_strategy_ms: default_per_strategy_ms(),
            download_ms: default_download_ms(),
            poll_ms: default_poll_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_rounds() -> u32 {
    50
}

fn default_stall_limit() -> u32 {
    3
}

fn default_webdriver_port() -> u16 {
    9515
}

fn default_page_ready_ms() -> u64 {
    15_000
}

fn default_per_strategy_ms() -> u64 {
    10_000
}

fn default_download_ms() -> u64 {
    60_000
}

fn default_poll_ms() -> u64 {
    500
}
