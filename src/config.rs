//! Scrape run configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Browser viewport dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl FromStr for Viewport {
    type Err = String;

    /// Parse `"1280x720"` style strings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("bad width {w:?}: {e}"))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("bad height {h:?}: {e}"))?;
        if width == 0 || height == 0 {
            return Err("viewport dimensions must be non-zero".into());
        }
        Ok(Self { width, height })
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Configuration bundle for a scrape run.
///
/// The backoff bases govern retry waits inside the fetch strategies and
/// are separate from `base_delay`, which paces successful requests. The
/// browser base is larger than the HTTP base because a browser attempt
/// costs far more than a plain request.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Root directory for the output collaborator. Opaque to the core.
    pub output_dir: PathBuf,
    /// Base inter-page delay; actual delays are `base..2*base`.
    pub base_delay: Duration,
    /// Retry budget per fetch strategy (0 = single attempt).
    pub max_retries: u32,
    /// Skip HTTP entirely and drive every fetch through the browser.
    pub use_browser: bool,
    /// Extended human-behavior simulation in the browser strategy.
    pub human_mode: bool,
    /// Escalate anti-bot HTTP failures to one browser pass.
    pub browser_fallback: bool,
    /// Fixed viewport instead of a random draw from the pool.
    pub custom_viewport: Option<Viewport>,
    /// Exponential backoff base for the HTTP strategy.
    pub http_backoff_base: Duration,
    /// Exponential backoff base for the browser strategy.
    pub browser_backoff_base: Duration,
    /// Explicit Chromium binary path, overriding discovery.
    pub chromium_path: Option<PathBuf>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./scraped_data"),
            base_delay: Duration::from_millis(3000),
            max_retries: 5,
            use_browser: false,
            human_mode: false,
            browser_fallback: true,
            custom_viewport: None,
            http_backoff_base: Duration::from_millis(2000),
            browser_backoff_base: Duration::from_millis(3000),
            chromium_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_parses_well_formed_input() {
        let vp: Viewport = "1366x768".parse().unwrap();
        assert_eq!(vp.width, 1366);
        assert_eq!(vp.height, 768);
    }

    #[test]
    fn viewport_rejects_garbage() {
        assert!("1366".parse::<Viewport>().is_err());
        assert!("x768".parse::<Viewport>().is_err());
        assert!("0x768".parse::<Viewport>().is_err());
    }

    #[test]
    fn default_backoff_bases_are_ordered() {
        let cfg = ScrapeConfig::default();
        assert!(cfg.browser_backoff_base > cfg.http_backoff_base);
    }
}
