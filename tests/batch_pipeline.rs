//! Scheduler-level tests: the whole fetch → extract → sink pipeline
//! against a mock server, including failure recording, early abort, wave
//! concurrency, and the anti-bot browser fallback path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use quarry::batch::{BatchOptions, Scheduler};
use quarry::config::ScrapeConfig;
use quarry::error::FetchError;
use quarry::extract::SelectorCascade;
use quarry::fetch::Fetcher;
use quarry::output::{FileSink, NullSink, OutputFormat};

const WIKI_PAGE: &str = r#"
    <html><body>
    <h1 class="firstHeading">Test Article</h1>
    <div class="mw-parser-output">
        <p>A.</p>
        <p>B.</p>
        <div class="infobox"><table><tr><th>Founded</th><td>1990</td></tr></table></div>
    </div>
    </body></html>"#;

fn fast_config() -> ScrapeConfig {
    ScrapeConfig {
        base_delay: Duration::ZERO,
        max_retries: 0,
        http_backoff_base: Duration::from_millis(1),
        browser_backoff_base: Duration::from_millis(1),
        // Deterministically absent so fallback attempts fail fast
        // instead of depending on an installed Chrome.
        chromium_path: Some(PathBuf::from("/nonexistent/quarry-test-chromium")),
        ..ScrapeConfig::default()
    }
}

fn scheduler(config: ScrapeConfig) -> Scheduler {
    Scheduler::new(
        Arc::new(Fetcher::new(config)),
        Arc::new(SelectorCascade::default()),
        Arc::new(NullSink),
    )
}

async fn mount_page(server: &MockServer, route: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(WIKI_PAGE))
        .mount(server)
        .await;
}

#[tokio::test]
async fn scrape_page_produces_full_record() {
    let server = MockServer::start().await;
    mount_page(&server, "/wiki/Test_Article").await;

    let scheduler = scheduler(fast_config());
    let url = format!("{}/wiki/Test_Article", server.uri());
    let record = scheduler.scrape_page(&url).await.expect("scrape failed");

    assert_eq!(record.title, "Test Article");
    assert_eq!(record.content, "A.\n\nB.");
    assert_eq!(record.metadata.word_count, 2);
    assert_eq!(record.infobox.get("Founded"), Some(&"1990".to_string()));
    assert_eq!(record.metadata.scraping_method, "HTTP");
    assert_eq!(record.url, url);
}

#[tokio::test]
async fn failed_url_is_recorded_and_batch_continues() {
    let server = MockServer::start().await;
    mount_page(&server, "/wiki/One").await;
    Mock::given(method("GET"))
        .and(path("/wiki/Two"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_page(&server, "/wiki/Three").await;

    let urls = vec![
        format!("{}/wiki/One", server.uri()),
        format!("{}/wiki/Two", server.uri()),
        format!("{}/wiki/Three", server.uri()),
    ];
    let outcome = scheduler(fast_config())
        .run(&urls, &BatchOptions::default())
        .await;

    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.failed, vec![urls[1].clone()]);
}

#[tokio::test]
async fn stop_on_error_aborts_before_later_urls() {
    let server = MockServer::start().await;
    mount_page(&server, "/wiki/One").await;
    Mock::given(method("GET"))
        .and(path("/wiki/Two"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let third = Mock::given(method("GET"))
        .and(path("/wiki/Three"))
        .respond_with(ResponseTemplate::new(200).set_body_string(WIKI_PAGE))
        .expect(0);
    server.register(third).await;

    let urls = vec![
        format!("{}/wiki/One", server.uri()),
        format!("{}/wiki/Two", server.uri()),
        format!("{}/wiki/Three", server.uri()),
    ];
    let options = BatchOptions {
        continue_on_error: false,
        ..BatchOptions::default()
    };
    let outcome = scheduler(fast_config()).run(&urls, &options).await;

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.failed, vec![urls[1].clone()]);
    // The expect(0) on /wiki/Three is verified when the server drops.
}

#[tokio::test]
async fn concurrent_waves_process_every_url() {
    let server = MockServer::start().await;
    for route in ["/wiki/A", "/wiki/B", "/wiki/C", "/wiki/D", "/wiki/E"] {
        mount_page(&server, route).await;
    }

    let urls: Vec<String> = ["A", "B", "C", "D", "E"]
        .iter()
        .map(|n| format!("{}/wiki/{n}", server.uri()))
        .collect();
    let options = BatchOptions {
        max_concurrent: 2,
        ..BatchOptions::default()
    };
    let outcome = scheduler(fast_config()).run(&urls, &options).await;

    assert_eq!(outcome.results.len(), 5);
    assert!(outcome.failed.is_empty());
    assert_eq!(server.received_requests().await.unwrap().len(), 5);
}

#[tokio::test]
async fn anti_bot_failure_gets_exactly_one_browser_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/Guarded"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(fast_config());
    let url = format!("{}/wiki/Guarded", server.uri());
    let err = fetcher.retrieve(&url).await.expect_err("should fail");

    // The HTTP 403 escalated to the browser once; with no Chromium that
    // pass fails too, and the failure is terminal — no second fallback.
    assert!(matches!(err, FetchError::Browser { .. }), "got {err}");
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn anti_bot_failure_propagates_when_fallback_disabled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/Guarded"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let config = ScrapeConfig {
        browser_fallback: false,
        ..fast_config()
    };
    let fetcher = Fetcher::new(config);
    let err = fetcher
        .retrieve(&format!("{}/wiki/Guarded", server.uri()))
        .await
        .expect_err("should fail");
    assert!(matches!(err, FetchError::AntiBot { .. }));
}

#[tokio::test]
async fn batch_writes_files_and_progress_snapshot() {
    let server = MockServer::start().await;
    mount_page(&server, "/wiki/Solo").await;
    Mock::given(method("GET"))
        .and(path("/wiki/Gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let sink = FileSink::new(dir.path(), OutputFormat::Json).unwrap();
    let scheduler = Scheduler::new(
        Arc::new(Fetcher::new(fast_config())),
        Arc::new(SelectorCascade::default()),
        Arc::new(sink),
    );

    let urls = vec![
        format!("{}/wiki/Solo", server.uri()),
        format!("{}/wiki/Gone", server.uri()),
    ];
    let outcome = scheduler.run(&urls, &BatchOptions::default()).await;
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.failed.len(), 1);

    assert_eq!(
        std::fs::read_dir(dir.path().join("json")).unwrap().count(),
        1
    );
    let progress: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("batch_progress.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(progress["totalUrls"], 2);
    assert_eq!(progress["remaining"], 1);
    assert_eq!(progress["successRate"], 50.0);
    assert_eq!(progress["failedUrls"][0], urls[1]);
}
