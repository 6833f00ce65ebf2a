// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{html, stub_pipeline, RELEVANT_MARKER};
use esgcrawl::domain::models::report::FailureReason;
use esgcrawl::utils::errors::CrawlError;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_page(server: &MockServer, route: &str, body: String, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(body, "text/html")
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

async fn esg_site(slow_governance: Duration) -> MockServer {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        html(
            "Acme",
            r#"<nav>
                 <a href="/sustainability">Sustainability</a>
                 <a href="/governance#board">Governance</a>
                 <a href="/about">About us</a>
                 <a href="/governance">Governance again</a>
                 <a href="/shop">Shop</a>
                 <a href="mailto:esg@acme.test">Contact</a>
               </nav>"#,
        ),
        Duration::ZERO,
    )
    .await;
    mount_page(
        &server,
        "/sustainability",
        html(
            "Sustainability",
            &format!("{} We cut carbon emissions by 40 percent.", RELEVANT_MARKER),
        ),
        Duration::ZERO,
    )
    .await;
    mount_page(
        &server,
        "/governance",
        html(
            "Governance",
            &format!("{} The board audit committee meets quarterly.", RELEVANT_MARKER),
        ),
        slow_governance,
    )
    .await;
    mount_page(
        &server,
        "/about",
        html("About", "We have sold garden furniture since 1952."),
        Duration::ZERO,
    )
    .await;
    server
}

#[tokio::test]
async fn test_two_relevant_of_three_candidates() {
    let server = esg_site(Duration::ZERO).await;
    let base = format!("{}/", server.uri());

    let report = stub_pipeline(Duration::from_secs(30))
        .run_crawl(&base, false)
        .await
        .unwrap();

    assert!(!report.timed_out);
    assert_eq!(report.stats.discovered, 3);
    assert_eq!(report.pages.len(), 2);
    assert!(report
        .pages
        .keys()
        .all(|url| url.ends_with("/sustainability") || url.ends_with("/governance")));

    for page in report.pages.values() {
        assert!(page.filtered.confidence > 0.3);
        let score = page.score.as_ref().unwrap();
        assert!(score.scores.values().all(|s| (0.0..=100.0).contains(s)));
        assert!((0.0..=100.0).contains(&score.overall_score));
    }

    assert_eq!(report.excluded.len(), 1);
    let about = report
        .excluded
        .iter()
        .find(|(url, _)| url.ends_with("/about"))
        .map(|(_, failure)| failure.reason);
    assert_eq!(about, Some(FailureReason::NotRelevant));
}

#[tokio::test]
async fn test_timeout_returns_partial_report() {
    let server = esg_site(Duration::from_secs(10)).await;
    let base = format!("{}/", server.uri());

    let started = Instant::now();
    let report = stub_pipeline(Duration::from_millis(1500))
        .run_crawl(&base, false)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(report.timed_out);
    assert_eq!(report.pages.len(), 1);
    assert!(report.pages.keys().all(|url| url.ends_with("/sustainability")));

    let governance = report
        .excluded
        .iter()
        .find(|(url, _)| url.ends_with("/governance"))
        .map(|(_, failure)| failure.reason);
    assert_eq!(governance, Some(FailureReason::Cancelled));
    assert_eq!(report.stats.cancelled, 1);
}

#[tokio::test]
async fn test_unreachable_seed_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = stub_pipeline(Duration::from_secs(10))
        .run_crawl(&format!("{}/", server.uri()), false)
        .await;
    assert!(matches!(result, Err(CrawlError::SeedFetch(_))));
}

#[tokio::test]
async fn test_links_resolve_against_redirect_target() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/en/home"))
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/en/home",
        html("Acme", r#"<a href="sustainability">Sustainability</a>"#),
        Duration::ZERO,
    )
    .await;
    mount_page(
        &server,
        "/en/sustainability",
        html(
            "Sustainability",
            &format!("{} Our plants run on renewable energy.", RELEVANT_MARKER),
        ),
        Duration::ZERO,
    )
    .await;

    let report = stub_pipeline(Duration::from_secs(30))
        .run_crawl(&format!("{}/", server.uri()), false)
        .await
        .unwrap();

    assert_eq!(report.stats.discovered, 1);
    assert_eq!(
        report.pages.keys().collect::<Vec<_>>(),
        vec![&format!("{}/en/sustainability", server.uri())]
    );
    assert!(report.excluded.is_empty());
}
