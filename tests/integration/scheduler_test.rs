// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{direct_scheduler, html, scheduler_config, CountingControl, LoopbackEngine};
use esgcrawl::engines::fetch_scheduler::FetchScheduler;
use esgcrawl::engines::rotation::{RotationConfig, RotationController};
use esgcrawl::infrastructure::cache::page_cache::PageCache;
use esgcrawl::utils::errors::NetworkError;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_concurrent_duplicates_issue_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/report"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(html("Report", "annual report"), "text/html")
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let scheduler = direct_scheduler(3);
    let url = format!("{}/report", server.uri());

    let results = join_all((0..8).map(|_| scheduler.fetch(&url))).await;
    let pages: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
    assert!(pages.iter().all(|p| Arc::ptr_eq(p, &pages[0])));
    assert_eq!(pages[0].title, "Report");
}

#[tokio::test]
async fn test_cached_page_skips_network_and_rotation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esg"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html("ESG", "body"), "text/html"))
        .expect(2)
        .mount(&server)
        .await;

    let control = Arc::new(CountingControl::default());
    let rotation = Arc::new(RotationController::tor(
        "127.0.0.1:9050",
        control.clone(),
        RotationConfig {
            cooldown: Duration::ZERO,
            settle: Duration::ZERO,
        },
    ));
    let cache = Arc::new(PageCache::new(8, Duration::from_secs(60)));
    let tor = FetchScheduler::new(
        Arc::new(LoopbackEngine),
        rotation.clone(),
        cache.clone(),
        scheduler_config(1),
    );
    let direct = FetchScheduler::new(
        Arc::new(LoopbackEngine),
        Arc::new(RotationController::direct()),
        cache.clone(),
        scheduler_config(1),
    );
    let url = format!("{}/esg", server.uri());

    let first = tor.fetch(&url).await.unwrap();
    control.wait_for_signals(1).await;
    let generation = rotation.generation();

    let second = tor.fetch(&url).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(control.signals(), 1);
    assert_eq!(rotation.generation(), generation);
    assert_eq!(cache.stats().hits, 1);

    // 直连模式使用独立的缓存键
    let plain = direct.fetch(&url).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &plain));
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html("Flaky", "ok"), "text/html"))
        .expect(1)
        .mount(&server)
        .await;

    let page = direct_scheduler(3)
        .fetch(&format!("{}/flaky", server.uri()))
        .await
        .unwrap();
    assert_eq!(page.attempts, 2);
    assert_eq!(page.status_code, 200);
}

#[tokio::test]
async fn test_terminal_failure_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let scheduler = direct_scheduler(2);
    let url = format!("{}/broken", server.uri());

    for _ in 0..2 {
        let result = scheduler.fetch(&url).await;
        assert!(matches!(
            result,
            Err(NetworkError::Status { status: 500, .. })
        ));
    }
}
