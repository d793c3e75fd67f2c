//! Fetch error taxonomy.
//!
//! Every failure a fetch strategy can produce is classified into one of
//! these variants. Classification drives two decisions downstream: whether
//! the strategy retries (`is_retryable`) and whether the orchestrator
//! escalates an exhausted HTTP fetch to the browser (`is_anti_bot`).

use thiserror::Error;

/// A classified fetch failure.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level failure: connect/timeout errors and 5xx responses.
    #[error("transport failure fetching {url}: {reason}")]
    Transport { url: String, reason: String },

    /// HTTP 403 — access forbidden, anti-bot protection suspected.
    #[error("access forbidden for {url} - anti-bot protection detected")]
    AntiBot { url: String },

    /// HTTP 429 — requests too frequent.
    #[error("rate limited fetching {url} - requests too frequent")]
    RateLimited { url: String },

    /// HTTP 404.
    #[error("page not found: {url}")]
    NotFound { url: String },

    /// Any other status >= 400.
    #[error("HTTP {status} fetching {url}")]
    Http { url: String, status: u16 },

    /// Navigation or runtime failure inside the browser strategy.
    #[error("browser fetch failed for {url}: {reason}")]
    Browser { url: String, reason: String },
}

impl FetchError {
    /// Whether the owning strategy may retry after this failure.
    ///
    /// 404 is the one terminal classification: a missing page does not
    /// appear on retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::NotFound { .. })
    }

    /// Whether this failure looks like bot detection.
    ///
    /// The typed variant covers responses we classified ourselves; the
    /// message-pattern check covers failures that crossed a string
    /// boundary (e.g. a wrapped transport error carrying a server's
    /// "anti-bot" page text).
    pub fn is_anti_bot(&self) -> bool {
        if matches!(self, FetchError::AntiBot { .. }) {
            return true;
        }
        let msg = self.to_string().to_lowercase();
        msg.contains("anti-bot") || msg.contains("access forbidden") || msg.contains("403")
    }

    /// The URL this failure occurred on.
    pub fn url(&self) -> &str {
        match self {
            FetchError::Transport { url, .. }
            | FetchError::AntiBot { url }
            | FetchError::RateLimited { url }
            | FetchError::NotFound { url }
            | FetchError::Http { url, .. }
            | FetchError::Browser { url, .. } => url,
        }
    }

    /// Classify a non-success HTTP status.
    ///
    /// Statuses below 400 are never passed here; >= 500 is transport-class
    /// so it shares the retry path with network failures.
    pub fn from_status(url: &str, status: u16) -> Self {
        match status {
            403 => FetchError::AntiBot { url: url.into() },
            404 => FetchError::NotFound { url: url.into() },
            429 => FetchError::RateLimited { url: url.into() },
            s if s >= 500 => FetchError::Transport {
                url: url.into(),
                reason: format!("HTTP {s}"),
            },
            s => FetchError::Http {
                url: url.into(),
                status: s,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            FetchError::from_status("http://a", 403),
            FetchError::AntiBot { .. }
        ));
        assert!(matches!(
            FetchError::from_status("http://a", 404),
            FetchError::NotFound { .. }
        ));
        assert!(matches!(
            FetchError::from_status("http://a", 429),
            FetchError::RateLimited { .. }
        ));
        assert!(matches!(
            FetchError::from_status("http://a", 418),
            FetchError::Http { status: 418, .. }
        ));
        assert!(matches!(
            FetchError::from_status("http://a", 503),
            FetchError::Transport { .. }
        ));
    }

    #[test]
    fn not_found_is_terminal() {
        assert!(!FetchError::from_status("http://a", 404).is_retryable());
        assert!(FetchError::from_status("http://a", 429).is_retryable());
        assert!(FetchError::from_status("http://a", 500).is_retryable());
        assert!(FetchError::Browser {
            url: "http://a".into(),
            reason: "timeout".into()
        }
        .is_retryable());
    }

    #[test]
    fn anti_bot_detection_covers_variant_and_message() {
        assert!(FetchError::from_status("http://a", 403).is_anti_bot());
        assert!(!FetchError::from_status("http://a", 429).is_anti_bot());
        let wrapped = FetchError::Transport {
            url: "http://a".into(),
            reason: "upstream said: anti-bot challenge".into(),
        };
        assert!(wrapped.is_anti_bot());
    }
}
