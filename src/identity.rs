//! Rotating client identity: user-agent, per-host cookies, referer chain.
//!
//! The identity is what remote servers see across a run. It is owned by
//! the fetch orchestrator and mutated under a short-lived lock, so
//! concurrent waves observe whole updates only (a rotation never
//! interleaves with a cookie write).

use std::collections::HashMap;

use rand::Rng;

/// Realistic desktop user agents, rotated across requests.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/119.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36 Edg/119.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/120.0",
];

/// Referer history window. Oldest entries are evicted past this.
const REFERER_WINDOW: usize = 10;

/// Draw attempts before accepting a repeated user agent.
const ROTATION_DRAWS: usize = 5;

/// Probability of a spontaneous rotation on any request.
const RANDOM_ROTATION_CHANCE: f64 = 0.10;

/// Mutable session identity, one per run.
#[derive(Debug, Clone)]
pub struct IdentityState {
    current_agent: &'static str,
    cookies_by_host: HashMap<String, String>,
    referer_history: Vec<String>,
}

/// Read-only view of the identity for status reporting.
#[derive(Debug, Clone)]
pub struct IdentitySnapshot {
    pub agents_available: usize,
    pub current_agent: String,
    pub referer_history_len: usize,
    pub cookie_hosts: usize,
}

impl IdentityState {
    pub fn new(rng: &mut impl Rng) -> Self {
        Self {
            current_agent: USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())],
            cookies_by_host: HashMap::new(),
            referer_history: Vec::new(),
        }
    }

    pub fn current_agent(&self) -> &'static str {
        self.current_agent
    }

    /// Rotate to a new user agent, drawing up to [`ROTATION_DRAWS`] times
    /// to avoid repeating the current one. Distinctness is best-effort,
    /// not guaranteed.
    pub fn rotate(&mut self, rng: &mut impl Rng) -> &'static str {
        let previous = self.current_agent;
        for _ in 0..ROTATION_DRAWS {
            self.current_agent = USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())];
            if self.current_agent != previous {
                break;
            }
        }
        self.current_agent
    }

    /// Apply the rotation policy before a request is built. Rotates when
    /// this is a retry, on a 10% random draw, or when the target host
    /// differs from the host of the most recent referer.
    ///
    /// Returns true if a rotation happened.
    pub fn maybe_rotate(&mut self, is_retry: bool, target_host: &str, rng: &mut impl Rng) -> bool {
        let crossed_host = self
            .last_referer_host()
            .map(|h| h != target_host)
            .unwrap_or(false);
        let should = is_retry || rng.gen::<f64>() < RANDOM_ROTATION_CHANCE || crossed_host;
        if should {
            self.rotate(rng);
        }
        should
    }

    /// Store the cookie header value for a host from raw `Set-Cookie`
    /// values: each value's leading `name=value` pair, directives
    /// stripped, joined with `"; "`. Overwrites any previous entry for
    /// the host; nothing expires within a run.
    pub fn record_cookies(&mut self, host: &str, set_cookie_values: &[String]) {
        if set_cookie_values.is_empty() {
            return;
        }
        let joined = set_cookie_values
            .iter()
            .filter_map(|v| v.split(';').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; ");
        if !joined.is_empty() {
            self.cookies_by_host.insert(host.to_string(), joined);
        }
    }

    pub fn cookies_for(&self, host: &str) -> Option<&str> {
        self.cookies_by_host.get(host).map(String::as_str)
    }

    /// Append a URL to the referer window, evicting the oldest entry
    /// once the window holds [`REFERER_WINDOW`] URLs.
    pub fn push_referer(&mut self, url: &str) {
        self.referer_history.push(url.to_string());
        if self.referer_history.len() > REFERER_WINDOW {
            self.referer_history.remove(0);
        }
    }

    /// Most recent referer, used for every non-initial request.
    pub fn current_referer(&self) -> Option<&str> {
        self.referer_history.last().map(String::as_str)
    }

    /// True until the first successful request of the run.
    pub fn is_initial_request(&self) -> bool {
        self.referer_history.is_empty()
    }

    pub fn referer_history(&self) -> &[String] {
        &self.referer_history
    }

    fn last_referer_host(&self) -> Option<String> {
        let last = self.referer_history.last()?;
        url::Url::parse(last)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }

    pub fn snapshot(&self) -> IdentitySnapshot {
        IdentitySnapshot {
            agents_available: USER_AGENTS.len(),
            current_agent: self.current_agent.to_string(),
            referer_history_len: self.referer_history.len(),
            cookie_hosts: self.cookies_by_host.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn rotation_stays_in_pool() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut id = IdentityState::new(&mut rng);
        for _ in 0..200 {
            let agent = id.rotate(&mut rng);
            assert!(USER_AGENTS.contains(&agent));
        }
    }

    #[test]
    fn rotation_rarely_repeats() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut id = IdentityState::new(&mut rng);
        let mut repeats = 0;
        for _ in 0..200 {
            let before = id.current_agent();
            let after = id.rotate(&mut rng);
            if before == after {
                repeats += 1;
            }
        }
        // Five draws from a 16-agent pool repeat with probability 16^-5.
        assert_eq!(repeats, 0, "unexpected repeat rotations: {repeats}");
    }

    #[test]
    fn retry_always_triggers_rotation_policy() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut id = IdentityState::new(&mut rng);
        assert!(id.maybe_rotate(true, "example.com", &mut rng));
    }

    #[test]
    fn host_change_triggers_rotation() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut id = IdentityState::new(&mut rng);
        id.push_referer("https://alpha.example/wiki/A");
        assert!(id.maybe_rotate(false, "beta.example", &mut rng));
    }

    #[test]
    fn referer_window_keeps_last_ten_in_order() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut id = IdentityState::new(&mut rng);
        for i in 0..15 {
            id.push_referer(&format!("https://example.com/page/{i}"));
        }
        assert_eq!(id.referer_history().len(), 10);
        assert_eq!(id.referer_history()[0], "https://example.com/page/5");
        assert_eq!(id.current_referer(), Some("https://example.com/page/14"));
    }

    #[test]
    fn cookies_strip_directives_and_join() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut id = IdentityState::new(&mut rng);
        id.record_cookies(
            "example.com",
            &[
                "session=abc123; Path=/; HttpOnly".to_string(),
                "theme=dark; Max-Age=3600".to_string(),
            ],
        );
        assert_eq!(id.cookies_for("example.com"), Some("session=abc123; theme=dark"));
        assert_eq!(id.cookies_for("other.com"), None);
    }

    #[test]
    fn empty_set_cookie_is_ignored() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut id = IdentityState::new(&mut rng);
        id.record_cookies("example.com", &[]);
        assert_eq!(id.cookies_for("example.com"), None);
    }
}
