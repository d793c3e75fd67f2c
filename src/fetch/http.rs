//! Plain HTTP fetch strategy.
//!
//! One request per attempt through a shared reqwest client, with
//! identity-aware headers, status classification, and a bounded
//! jittered-backoff retry loop. Compression negotiation is left to the
//! client so decoding always matches what was advertised.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::thread_rng;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, REFERER, SET_COOKIE, USER_AGENT};
use tracing::{debug, info, warn};
use url::Url;

use crate::backoff;
use crate::config::ScrapeConfig;
use crate::error::FetchError;
use crate::identity::IdentityState;
use crate::timing;

/// Per-request timeout.
const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Redirects followed before giving up.
const MAX_REDIRECTS: usize = 5;

/// HTTP retrieval with a rotating identity.
pub struct HttpStrategy {
    client: reqwest::Client,
    config: Arc<ScrapeConfig>,
    identity: Arc<Mutex<IdentityState>>,
}

impl HttpStrategy {
    pub fn new(config: Arc<ScrapeConfig>, identity: Arc<Mutex<IdentityState>>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            config,
            identity,
        }
    }

    /// Fetch a page, retrying retryable failures up to the configured
    /// budget, then surface the last failure.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut attempt = 0u32;
        loop {
            match self.attempt(url, attempt).await {
                Ok(html) => return Ok(html),
                Err(err) => {
                    if err.is_retryable() && backoff::should_retry(attempt, self.config.max_retries)
                    {
                        let wait = {
                            let mut rng = thread_rng();
                            backoff::delay(attempt, self.config.http_backoff_base, &mut rng)
                        };
                        warn!(
                            "retry {}/{} for {url} in {:.1}s: {err}",
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

    async fn attempt(&self, url: &str, attempt: u32) -> Result<String, FetchError> {
        let host = host_of(url)?;

        // Rotation decision and header assembly happen under one lock so
        // concurrent fetches never see a half-updated identity.
        let headers = {
            let mut rng = thread_rng();
            let mut identity = self.identity.lock().expect("identity lock poisoned");
            if identity.maybe_rotate(attempt > 0, &host, &mut rng) {
                debug!("rotated user agent to {}", identity.current_agent());
            }
            build_headers(&identity, &host)
        };

        info!("fetching {url}");
        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(FetchError::from_status(url, status));
        }

        let set_cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();

        let body = response.text().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        {
            let mut identity = self.identity.lock().expect("identity lock poisoned");
            identity.record_cookies(&host, &set_cookies);
            identity.push_referer(url);
        }

        info!("fetched {url} ({status}, {} bytes)", body.len());

        let pause = {
            let mut rng = thread_rng();
            timing::inter_page_delay(self.config.base_delay, &mut rng)
        };
        if !pause.is_zero() {
            debug!("post-fetch pause {:.1}s", pause.as_secs_f64());
            tokio::time::sleep(pause).await;
        }

        Ok(body)
    }
}

fn host_of(url: &str) -> Result<String, FetchError> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .ok_or_else(|| FetchError::Transport {
            url: url.to_string(),
            reason: "invalid URL".into(),
        })
}

/// Realistic Chrome-shaped header set plus the rotating identity parts.
/// `Sec-Fetch-Site` distinguishes the run's very first request; Referer
/// and Cookie appear only once the identity has something to say.
fn build_headers(identity: &IdentityState, host: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(ua) = HeaderValue::from_str(identity.current_agent()) {
        headers.insert(USER_AGENT, ua);
    }
    headers.insert(
        "Accept",
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,\
             image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
        ),
    );
    headers.insert("Accept-Language", HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert("DNT", HeaderValue::from_static("1"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));
    headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
    headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
    headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
    headers.insert(
        "Sec-Fetch-Site",
        HeaderValue::from_static(if identity.is_initial_request() {
            "none"
        } else {
            "same-origin"
        }),
    );
    headers.insert("Sec-Fetch-User", HeaderValue::from_static("?1"));
    headers.insert("Cache-Control", HeaderValue::from_static("max-age=0"));
    headers.insert(
        "sec-ch-ua",
        HeaderValue::from_static(
            "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\"",
        ),
    );
    headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
    headers.insert("sec-ch-ua-platform", HeaderValue::from_static("\"Windows\""));

    if let Some(referer) = identity.current_referer() {
        if let Ok(value) = HeaderValue::from_str(referer) {
            headers.insert(REFERER, value);
        }
    }
    if let Some(cookies) = identity.cookies_for(host) {
        if let Ok(value) = HeaderValue::from_str(cookies) {
            headers.insert(COOKIE, value);
        }
    }
    headers
}
