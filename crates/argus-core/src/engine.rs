//! The browser seam.
//!
//! The worker logic is generic over a [`PageEngine`] so attempts are
//! testable without Chromium. The real implementation lives in the
//! `argus-browser` crate.

use std::future::Future;
use std::str::FromStr;

use crate::error::AppError;

/// What to wait for after navigation before reading the DOM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitStrategy {
    /// DOM parsed (DOMContentLoaded). The default.
    #[default]
    Fast,
    /// `load` event fired.
    Basic,
    /// Network idle: no outstanding connections.
    Moderate,
    /// Network idle: at most 2 outstanding connections for 500 ms.
    Comprehensive,
}

impl WaitStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitStrategy::Fast => "fast",
            WaitStrategy::Basic => "basic",
            WaitStrategy::Moderate => "moderate",
            WaitStrategy::Comprehensive => "comprehensive",
        }
    }

    /// Connections allowed to remain open for the network to count as idle.
    pub fn idle_threshold(&self) -> Option<usize> {
        match self {
            WaitStrategy::Fast | WaitStrategy::Basic => None,
            WaitStrategy::Moderate => Some(0),
            WaitStrategy::Comprehensive => Some(2),
        }
    }
}

impl FromStr for WaitStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(WaitStrategy::Fast),
            "basic" => Ok(WaitStrategy::Basic),
            "moderate" => Ok(WaitStrategy::Moderate),
            "comprehensive" => Ok(WaitStrategy::Comprehensive),
            _ => Err(format!("Unknown wait strategy: {s}")),
        }
    }
}

/// Raw outcome of one page load, before classification.
#[derive(Debug, Clone)]
pub struct PageFetch {
    /// Status of the main document response; `None` when navigation yielded
    /// no response at all.
    pub http_status: Option<u16>,
    pub status_text: Option<String>,
    /// Serialized DOM after the configured wait.
    pub content: String,
    /// MIME type of the main document response.
    pub content_type: Option<String>,
    /// URL of the final response after redirects.
    pub final_url: String,
    /// URLs followed to reach `final_url`, excluding `final_url` itself,
    /// in navigation order. Not yet canonicalized.
    pub redirect_chain: Vec<String>,
}

/// Drives one page load per call against a shared browser process.
///
/// Implementations must close the page on every exit path — error paths
/// included — so a long-lived worker cannot leak tabs.
pub trait PageEngine: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<PageFetch, AppError>> + Send;
}
