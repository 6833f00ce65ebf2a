// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::models::identity::{Egress, Identity, IdentityHealth};
use crate::engines::traits::{FetchEngine, FetchRequest};
use crate::infrastructure::proxy_source::ProxySource;

/// 身份池配置
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// 连续失败多少次后淘汰
    pub max_consecutive_failures: u32,
    /// 健康身份低于该数量时需要补充
    pub min_healthy: usize,
    /// 补充时的并发验证数量
    pub verify_concurrency: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            min_healthy: 5,
            verify_concurrency: 50,
        }
    }
}

/// 身份验证器
#[async_trait]
pub trait IdentityProbe: Send + Sync {
    /// 候选出口是否可用
    async fn probe(&self, egress: &Egress) -> bool;
}

/// 通过回显地址验证代理
///
/// 经候选代理请求回显地址，返回200即视为可用
pub struct EchoProbe {
    engine: Arc<dyn FetchEngine>,
    echo_url: String,
    timeout: Duration,
}

impl EchoProbe {
    pub fn new(engine: Arc<dyn FetchEngine>, echo_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            engine,
            echo_url: echo_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl IdentityProbe for EchoProbe {
    async fn probe(&self, egress: &Egress) -> bool {
        let request = FetchRequest::new(
            self.echo_url.clone(),
            Identity::new(egress.clone()),
            self.timeout,
        );
        match self.engine.fetch(&request).await {
            Ok(response) => response.status_code == 200,
            Err(e) => {
                debug!("Probe failed for {}: {}", egress, e);
                false
            }
        }
    }
}

/// 池中的条目
#[derive(Debug, Clone)]
struct PoolEntry {
    identity: Identity,
    consecutive_failures: u32,
    last_checked: DateTime<Utc>,
}

/// 身份池
///
/// 维护出口身份及其健康状态。失败只计在派发时实际使用的那个身份上，
/// 连续失败达到上限后不再分配。
pub struct IdentityPool {
    entries: RwLock<Vec<PoolEntry>>,
    cursor: AtomicUsize,
    config: PoolConfig,
}

impl IdentityPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            cursor: AtomicUsize::new(0),
            config,
        }
    }

    /// 用已验证的出口创建身份池
    pub fn with_identities(config: PoolConfig, egresses: impl IntoIterator<Item = Egress>) -> Self {
        let pool = Self::new(config);
        for egress in egresses {
            pool.add_verified(egress);
        }
        pool
    }

    /// 加入一个已验证的出口，已知出口（包括已淘汰的）不会重复加入
    pub fn add_verified(&self, egress: Egress) -> bool {
        let mut entries = self.entries.write();
        if entries.iter().any(|e| e.identity.egress == egress) {
            return false;
        }
        let mut identity = Identity::new(egress);
        identity.health = IdentityHealth::Healthy;
        entries.push(PoolEntry {
            identity,
            consecutive_failures: 0,
            last_checked: Utc::now(),
        });
        true
    }

    /// 记录一次成功，清零连续失败计数
    pub fn record_success(&self, egress: &Egress) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.iter_mut().find(|e| &e.identity.egress == egress) {
            entry.consecutive_failures = 0;
            entry.last_checked = Utc::now();
            if entry.identity.health != IdentityHealth::Failed {
                entry.identity.health = IdentityHealth::Healthy;
            }
        }
    }

    /// 记录一次失败
    ///
    /// # 返回值
    ///
    /// 本次失败导致该身份被淘汰时返回true
    pub fn record_failure(&self, egress: &Egress) -> bool {
        let mut entries = self.entries.write();
        let Some(entry) = entries.iter_mut().find(|e| &e.identity.egress == egress) else {
            return false;
        };
        entry.consecutive_failures += 1;
        entry.last_checked = Utc::now();

        if entry.identity.health != IdentityHealth::Failed
            && entry.consecutive_failures >= self.config.max_consecutive_failures
        {
            entry.identity.health = IdentityHealth::Failed;
            metrics::counter!("identity_retired_total").increment(1);
            warn!(
                "Identity {} retired after {} consecutive failures",
                egress, entry.consecutive_failures
            );
            return true;
        }
        false
    }

    /// 轮询取下一个健康身份，可排除一个出口
    pub fn next_healthy(&self, exclude: Option<&Egress>) -> Option<Identity> {
        let entries = self.entries.read();
        let healthy: Vec<&PoolEntry> = entries
            .iter()
            .filter(|e| e.identity.health == IdentityHealth::Healthy)
            .filter(|e| exclude != Some(&e.identity.egress))
            .collect();
        if healthy.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % healthy.len();
        Some(healthy[index].identity.clone())
    }

    /// 当前健康身份数量
    pub fn healthy_count(&self) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|e| e.identity.health == IdentityHealth::Healthy)
            .count()
    }

    pub fn health_of(&self, egress: &Egress) -> Option<IdentityHealth> {
        self.entries
            .read()
            .iter()
            .find(|e| &e.identity.egress == egress)
            .map(|e| e.identity.health)
    }

    pub fn needs_replenish(&self) -> bool {
        self.healthy_count() < self.config.min_healthy
    }

    /// 从代理来源补充身份
    ///
    /// 已知的出口不再验证；候选以有界并发验证，通过的以健康状态加入
    ///
    /// # 返回值
    ///
    /// 新加入的身份数量
    pub async fn replenish(&self, source: &dyn ProxySource, probe: &dyn IdentityProbe) -> usize {
        let known: HashSet<Egress> = self
            .entries
            .read()
            .iter()
            .map(|e| e.identity.egress.clone())
            .collect();

        let candidates: Vec<Egress> = source
            .fetch_candidates()
            .await
            .into_iter()
            .map(Egress::proxy)
            .filter(|egress| !known.contains(egress))
            .collect();
        let total = candidates.len();

        let verified: Vec<Egress> = stream::iter(candidates)
            .map(|egress| async move {
                let ok = probe.probe(&egress).await;
                (egress, ok)
            })
            .buffer_unordered(self.config.verify_concurrency.max(1))
            .filter_map(|(egress, ok)| async move { ok.then_some(egress) })
            .collect()
            .await;

        let added = verified
            .into_iter()
            .filter(|egress| self.add_verified(egress.clone()))
            .count();
        info!("Verified {}/{} proxy candidates", added, total);
        added
    }
}
