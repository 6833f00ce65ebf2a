// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::CountingControl;
use esgcrawl::domain::models::identity::Egress;
use esgcrawl::engines::identity_pool::{IdentityPool, PoolConfig};
use esgcrawl::engines::rotation::{RotationConfig, RotationController};
use esgcrawl::utils::errors::RotationError;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

fn five_second_cooldown() -> RotationConfig {
    RotationConfig {
        cooldown: Duration::from_secs(5),
        settle: Duration::ZERO,
    }
}

#[tokio::test]
async fn test_rotation_respects_cooldown() {
    tokio::time::pause();
    let control = Arc::new(CountingControl::default());
    let rotation = RotationController::tor("127.0.0.1:9050", control.clone(), five_second_cooldown());
    let initial = rotation.acquire_current_identity();

    let rotated = rotation.request_rotation().await.unwrap();
    assert_ne!(rotated, initial);

    tokio::time::advance(Duration::from_secs(2)).await;
    match rotation.request_rotation().await {
        Err(RotationError::Cooldown { remaining }) => {
            assert!(remaining <= Duration::from_secs(3));
        }
        other => panic!("expected cooldown rejection, got {:?}", other),
    }
    assert_eq!(rotation.acquire_current_identity(), rotated);

    tokio::time::advance(Duration::from_secs(4)).await;
    let again = rotation.request_rotation().await.unwrap();
    assert_ne!(again, rotated);
    assert_eq!(control.signals(), 2);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_rotation() {
    tokio::time::pause();
    let control = Arc::new(CountingControl::with_delay(Duration::from_millis(50)));
    let rotation = Arc::new(RotationController::tor(
        "127.0.0.1:9050",
        control.clone(),
        five_second_cooldown(),
    ));

    let results = join_all((0..6).map(|_| {
        let rotation = rotation.clone();
        async move { rotation.request_rotation().await }
    }))
    .await;

    assert_eq!(control.signals(), 1);
    let identities: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
    assert!(identities.iter().all(|i| *i == identities[0]));
    assert_eq!(rotation.generation(), identities[0].generation);
}

#[tokio::test]
async fn test_proxy_rotation_moves_between_healthy_proxies() {
    tokio::time::pause();
    let pool = Arc::new(IdentityPool::with_identities(
        PoolConfig {
            max_consecutive_failures: 1,
            min_healthy: 0,
            verify_concurrency: 4,
        },
        [
            Egress::proxy("10.0.0.1:8080"),
            Egress::proxy("10.0.0.2:8080"),
        ],
    ));
    let rotation = RotationController::proxy(pool.clone(), None, five_second_cooldown()).unwrap();

    let first = rotation.acquire_current_identity();
    let second = rotation.request_rotation().await.unwrap();
    assert_ne!(first.egress, second.egress);

    // 淘汰当前代理后，冷却结束时只剩另一个可选
    rotation.report_failure(&second);
    tokio::time::advance(Duration::from_secs(6)).await;
    let third = rotation.request_rotation().await.unwrap();
    assert_eq!(third.egress, first.egress);
    assert_eq!(pool.healthy_count(), 1);
}
