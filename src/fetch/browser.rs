//! Headless-browser fetch strategy using chromiumoxide.
//!
//! One browser process and one page are lazily started per run and
//! reused by every browser-strategy call; an async mutex serializes
//! access to that shared page, so concurrent waves simply queue here.
//! After navigation the page is "used" the way a person would use it —
//! the timing plans come from [`crate::timing`] and are played back with
//! synthetic DOM events, since a headless session has no OS cursor.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::{thread_rng, Rng};
use tracing::{debug, info, warn};

use crate::backoff;
use crate::config::{ScrapeConfig, Viewport};
use crate::error::FetchError;
use crate::identity::IdentityState;
use crate::timing::{
    self, Complexity, ExplorationPlan, PointerMove, ReadingFocus, ScrollPlan,
};

/// Navigation timeout window, drawn uniformly per attempt.
const NAV_TIMEOUT_MS: std::ops::Range<u64> = 15_000..25_000;

/// Viewport pool simulating a spread of common desktop devices.
const VIEWPORTS: [Viewport; 5] = [
    Viewport { width: 1920, height: 1080 },
    Viewport { width: 1366, height: 768 },
    Viewport { width: 1536, height: 864 },
    Viewport { width: 1440, height: 900 },
    Viewport { width: 1280, height: 720 },
];

/// Find the Chromium binary.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. QUARRY_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("QUARRY_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.quarry/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".quarry/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".quarry/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".quarry/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".quarry/chromium/chrome-linux64/chrome"),
                home.join(".quarry/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

struct BrowserSession {
    browser: Browser,
    page: Page,
    viewport: Viewport,
    handler: tokio::task::JoinHandle<()>,
}

/// Browser retrieval with human-behavior playback.
pub struct BrowserStrategy {
    config: Arc<ScrapeConfig>,
    identity: Arc<Mutex<IdentityState>>,
    session: tokio::sync::Mutex<Option<BrowserSession>>,
}

impl BrowserStrategy {
    pub fn new(config: Arc<ScrapeConfig>, identity: Arc<Mutex<IdentityState>>) -> Self {
        Self {
            config,
            identity,
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// Fetch a fully rendered page, retrying with the browser backoff
    /// base. Failures are never status-classified — navigation and
    /// runtime errors count toward the budget as-is.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut attempt = 0u32;
        loop {
            match self.attempt(url).await {
                Ok(html) => return Ok(html),
                Err(err) => {
                    if backoff::should_retry(attempt, self.config.max_retries) {
                        let wait = {
                            let mut rng = thread_rng();
                            backoff::delay(attempt, self.config.browser_backoff_base, &mut rng)
                        };
                        warn!(
                            "browser retry {}/{} for {url} in {:.1}s: {err}",
                            attempt + 1,
                            self.config.max_retries,
                            wait.as_secs_f64()
                        );
                        tokio::time::sleep(wait).await;
                        attempt += 1;
                    } else {
                        return Err(err);
                    }
                }
            }
        }
    }

    async fn attempt(&self, url: &str) -> Result<String, FetchError> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(self.start_session(url).await?);
        }
        let Some(session) = guard.as_ref() else {
            return Err(FetchError::Browser {
                url: url.to_string(),
                reason: "session unavailable".into(),
            });
        };

        // Draw the timeout and every behavior plan up front; the RNG
        // never crosses an await.
        let (nav_timeout, pause, reading, pointer, scroll, explore) = {
            let mut rng = thread_rng();
            (
                Duration::from_millis(rng.gen_range(NAV_TIMEOUT_MS)),
                timing::reading_pause(
                    if self.config.human_mode {
                        Complexity::Complex
                    } else {
                        Complexity::Medium
                    },
                    &mut rng,
                ),
                timing::reading_plan(&mut rng),
                timing::pointer_path(session.viewport, &mut rng),
                timing::scroll_plan(&mut rng),
                self.config.human_mode.then(|| timing::exploration_plan(&mut rng)),
            )
        };

        info!("browser fetching {url}");
        match tokio::time::timeout(nav_timeout, session.page.goto(url)).await {
            Ok(Ok(_)) => {
                let _ = session.page.wait_for_navigation().await;
            }
            Ok(Err(e)) => {
                return Err(FetchError::Browser {
                    url: url.to_string(),
                    reason: format!("navigation failed: {e}"),
                })
            }
            Err(_) => {
                return Err(FetchError::Browser {
                    url: url.to_string(),
                    reason: format!("navigation timed out after {}ms", nav_timeout.as_millis()),
                })
            }
        }

        debug!("simulated reading pause {:.1}s", pause.as_secs_f64());
        tokio::time::sleep(pause).await;
        if let Some(explore) = explore {
            // Extended human session: read first, wander, scroll, then
            // sweep the whole page.
            run_reading(&session.page, &reading).await;
            run_pointer(&session.page, &pointer).await;
            run_scroll(&session.page, &scroll).await;
            run_exploration(&session.page, &explore).await;
        } else {
            run_pointer(&session.page, &pointer).await;
            run_scroll(&session.page, &scroll).await;
            run_reading(&session.page, &reading).await;
        }

        let html = session
            .page
            .content()
            .await
            .map_err(|e| FetchError::Browser {
                url: url.to_string(),
                reason: format!("failed to read page content: {e}"),
            })?;
        info!("browser fetched {url} ({} bytes)", html.len());
        drop(guard);

        let pause = {
            let mut rng = thread_rng();
            timing::inter_page_delay(self.config.base_delay, &mut rng)
        };
        if !pause.is_zero() {
            debug!("inter-page delay {:.1}s", pause.as_secs_f64());
            tokio::time::sleep(pause).await;
        }

        Ok(html)
    }

    async fn start_session(&self, url: &str) -> Result<BrowserSession, FetchError> {
        let browser_err = |reason: String| FetchError::Browser {
            url: url.to_string(),
            reason,
        };

        let chrome_path = self
            .config
            .chromium_path
            .clone()
            .or_else(find_chromium)
            .ok_or_else(|| {
                browser_err("Chromium not found; set QUARRY_CHROMIUM_PATH or install Chrome".into())
            })?;

        let viewport = self.config.custom_viewport.unwrap_or_else(|| {
            let mut rng = thread_rng();
            VIEWPORTS[rng.gen_range(0..VIEWPORTS.len())]
        });

        let browser_config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-accelerated-2d-canvas")
            .arg("--no-first-run")
            .arg("--no-zygote")
            .arg("--disable-gpu")
            .window_size(viewport.width, viewport.height)
            .build()
            .map_err(|e| browser_err(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| browser_err(format!("failed to launch Chromium: {e}")))?;

        // The handler stream must be drained for the browser to work.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| browser_err(format!("failed to open page: {e}")))?;

        let agent = {
            let identity = self.identity.lock().expect("identity lock poisoned");
            identity.current_agent().to_string()
        };
        let ua = SetUserAgentOverrideParams::builder()
            .user_agent(agent)
            .build()
            .map_err(|e| browser_err(format!("failed to build user-agent override: {e}")))?;
        page.execute(ua)
            .await
            .map_err(|e| browser_err(format!("failed to set user agent: {e}")))?;

        info!(
            "browser initialized with viewport {}x{}",
            viewport.width, viewport.height
        );

        Ok(BrowserSession {
            browser,
            page,
            viewport,
            handler: handler_task,
        })
    }

    /// Close the browser session, if one was ever started. Idempotent.
    pub async fn close(&self) {
        let mut guard = self.session.lock().await;
        if let Some(mut session) = guard.take() {
            let _ = session.browser.close().await;
            session.handler.abort();
            debug!("browser closed");
        }
    }
}

// ── Behavior playback ────────────────────────────────────────────────────────
//
// A headless page has no real cursor, so pointer activity is played back
// as interpolated synthetic mousemove events; scrolling goes through
// window.scrollBy so scroll listeners and lazy loaders observe it.

fn pointer_script(x: u32, y: u32, steps: u32) -> String {
    format!(
        "(() => {{ const steps = {steps}; for (let i = 1; i <= steps; i++) {{ \
         document.dispatchEvent(new MouseEvent('mousemove', {{ clientX: Math.round({x} * i / steps), \
         clientY: Math.round({y} * i / steps), bubbles: true }})); }} \
         return document.elementFromPoint({x}, {y})?.tagName ?? ''; }})()"
    )
}

async fn run_pointer(page: &Page, path: &[PointerMove]) {
    for mv in path {
        let _ = page.evaluate(pointer_script(mv.x, mv.y, mv.steps)).await;
        tokio::time::sleep(mv.pause).await;
    }
}

async fn run_scroll(page: &Page, plan: &ScrollPlan) {
    for session in &plan.sessions {
        for pause in &session.pauses {
            let _ = page
                .evaluate(format!("window.scrollBy(0, {:.1})", session.step_px))
                .await;
            tokio::time::sleep(*pause).await;
        }
        if let Some(pause) = session.pause_after {
            tokio::time::sleep(pause).await;
        }
    }
    if let Some((pause, px)) = plan.rebound {
        tokio::time::sleep(pause).await;
        let _ = page.evaluate(format!("window.scrollBy(0, -{px})")).await;
    }
}

async fn run_reading(page: &Page, plan: &[ReadingFocus]) {
    for focus in plan {
        let _ = page
            .evaluate(pointer_script(focus.x, focus.y, focus.steps))
            .await;
        tokio::time::sleep(focus.dwell).await;
    }
}

async fn run_exploration(page: &Page, plan: &ExplorationPlan) {
    for stop in &plan.stops {
        let _ = page.evaluate(pointer_script(stop.x, stop.y, stop.steps)).await;
        tokio::time::sleep(stop.dwell).await;
        if let Some(hover) = stop.hover {
            tokio::time::sleep(hover).await;
        }
    }
    let _ = page
        .evaluate("window.scrollTo(0, document.body.scrollHeight)")
        .await;
    tokio::time::sleep(plan.bottom_pause).await;
    let _ = page.evaluate("window.scrollTo(0, 0)").await;
    tokio::time::sleep(plan.top_pause).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_pool_has_distinct_entries() {
        for vp in VIEWPORTS {
            assert!(vp.width >= 1280 && vp.height >= 720);
        }
        let mut sizes: Vec<_> = VIEWPORTS.iter().map(|v| (v.width, v.height)).collect();
        sizes.dedup();
        assert_eq!(sizes.len(), VIEWPORTS.len());
    }

    #[test]
    fn pointer_script_interpolates_to_target() {
        let script = pointer_script(400, 300, 10);
        assert!(script.contains("mousemove"));
        assert!(script.contains("elementFromPoint(400, 300)"));
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn browser_fetches_a_data_url() {
        let config = Arc::new(ScrapeConfig {
            base_delay: Duration::ZERO,
            max_retries: 0,
            ..ScrapeConfig::default()
        });
        let identity = Arc::new(Mutex::new(IdentityState::new(&mut thread_rng())));
        let strategy = BrowserStrategy::new(config, identity);
        let html = strategy
            .fetch("data:text/html,<h1>Hello</h1><p>World</p>")
            .await
            .expect("browser fetch failed");
        assert!(html.contains("Hello"));
        strategy.close().await;
    }
}
