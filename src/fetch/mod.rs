//! Fetch orchestration: strategy selection, identity ownership, and
//! anti-bot fallback escalation.
//!
//! The orchestrator owns the session identity and hands both strategies
//! a shared handle to it; all identity mutation happens inside short
//! lock scopes, so interleaved waves never observe a torn rotation or a
//! half-written cookie entry.
//!
//! Strategy choice: human mode (and explicit browser mode) drive every
//! retrieval through the browser; otherwise HTTP goes first and an
//! exhausted anti-bot-classified failure earns exactly one browser pass.
//! A failure of that pass is terminal for the URL — the fallback never
//! recurses.

pub mod browser;
pub mod http;

use std::sync::{Arc, Mutex};

use rand::thread_rng;
use tracing::warn;

use crate::config::ScrapeConfig;
use crate::error::FetchError;
use crate::identity::{IdentitySnapshot, IdentityState};

use browser::BrowserStrategy;
use http::HttpStrategy;

/// Which retrieval path produced a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMethod {
    Http,
    Browser,
    BrowserHuman,
}

impl std::fmt::Display for FetchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchMethod::Http => write!(f, "HTTP"),
            FetchMethod::Browser => write!(f, "Browser"),
            FetchMethod::BrowserHuman => write!(f, "Browser (Human Mode)"),
        }
    }
}

/// A successfully retrieved page and the path that produced it.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub html: String,
    pub method: FetchMethod,
}

/// Owns the identity and both fetch strategies for one run.
pub struct Fetcher {
    config: Arc<ScrapeConfig>,
    identity: Arc<Mutex<IdentityState>>,
    http: HttpStrategy,
    browser: BrowserStrategy,
}

impl Fetcher {
    pub fn new(config: ScrapeConfig) -> Self {
        let config = Arc::new(config);
        let identity = Arc::new(Mutex::new(IdentityState::new(&mut thread_rng())));
        Self {
            http: HttpStrategy::new(Arc::clone(&config), Arc::clone(&identity)),
            browser: BrowserStrategy::new(Arc::clone(&config), Arc::clone(&identity)),
            config,
            identity,
        }
    }

    /// Retrieve one URL, escalating through the configured strategies.
    ///
    /// The browser fallback starts with a fresh retry budget: the two
    /// strategies have distinct costs and backoff bases, and the switch
    /// is a deliberate second chance rather than a continuation.
    pub async fn retrieve(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        if self.config.human_mode {
            let html = self.browser.fetch(url).await?;
            return Ok(FetchOutcome {
                html,
                method: FetchMethod::BrowserHuman,
            });
        }
        if self.config.use_browser {
            let html = self.browser.fetch(url).await?;
            return Ok(FetchOutcome {
                html,
                method: FetchMethod::Browser,
            });
        }

        match self.http.fetch(url).await {
            Ok(html) => Ok(FetchOutcome {
                html,
                method: FetchMethod::Http,
            }),
            Err(err) if self.config.browser_fallback && err.is_anti_bot() => {
                warn!("HTTP blocked for {url}, switching to browser simulation");
                let html = self.browser.fetch(url).await?;
                Ok(FetchOutcome {
                    html,
                    method: FetchMethod::Browser,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// The run configuration this fetcher was built with.
    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// Current identity stats, for status output.
    pub fn identity_snapshot(&self) -> IdentitySnapshot {
        self.identity
            .lock()
            .expect("identity lock poisoned")
            .snapshot()
    }

    /// Release the browser session if one was started.
    pub async fn shutdown(&self) {
        self.browser.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_labels_match_reporting_format() {
        assert_eq!(FetchMethod::Http.to_string(), "HTTP");
        assert_eq!(FetchMethod::Browser.to_string(), "Browser");
        assert_eq!(FetchMethod::BrowserHuman.to_string(), "Browser (Human Mode)");
    }

    #[test]
    fn fetcher_exposes_identity_snapshot() {
        let fetcher = Fetcher::new(ScrapeConfig::default());
        let snap = fetcher.identity_snapshot();
        assert!(snap.agents_available >= 2);
        assert!(!snap.current_agent.is_empty());
        assert_eq!(snap.referer_history_len, 0);
    }
}
