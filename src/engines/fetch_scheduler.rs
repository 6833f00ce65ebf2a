// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, instrument, warn};

use crate::domain::models::identity::{AnonymityMode, Identity};
use crate::domain::models::page::{FetchTask, PageResult};
use crate::engines::rotation::RotationController;
use crate::engines::traits::{FetchEngine, FetchRequest, FetchResponse};
use crate::infrastructure::cache::page_cache::{CacheKey, PageCache};
use crate::utils::errors::NetworkError;
use crate::utils::html::parse_document;
use crate::utils::retry_policy::RetryPolicy;
use crate::utils::url_utils::normalize_url;

type FetchCell = Arc<OnceCell<Result<Arc<PageResult>, NetworkError>>>;

/// 调度器配置
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 最大并发抓取数
    pub concurrency: usize,
    /// 每个URL的最大尝试次数
    pub max_attempts: u32,
    /// 单次请求超时
    pub timeout: Duration,
    /// 重试退避策略
    pub retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            max_attempts: 3,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// 抓取调度器
///
/// 依次经过：缓存查询、按URL合并进行中的请求、并发信号量、带身份轮换的重试。
/// 同一URL（同一匿名模式下）任意时刻最多只有一个请求在网络上。
pub struct FetchScheduler {
    engine: Arc<dyn FetchEngine>,
    rotation: Arc<RotationController>,
    cache: Arc<PageCache>,
    in_flight: DashMap<CacheKey, FetchCell>,
    permits: Semaphore,
    config: SchedulerConfig,
}

impl FetchScheduler {
    pub fn new(
        engine: Arc<dyn FetchEngine>,
        rotation: Arc<RotationController>,
        cache: Arc<PageCache>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            engine,
            rotation,
            cache,
            in_flight: DashMap::new(),
            permits: Semaphore::new(config.concurrency.max(1)),
            config,
        }
    }

    pub fn mode(&self) -> AnonymityMode {
        self.rotation.mode()
    }

    pub fn rotation(&self) -> &Arc<RotationController> {
        &self.rotation
    }

    /// 抓取页面
    ///
    /// 缓存命中时不产生网络请求，也不触发轮换。并发的重复请求共享同一次抓取的结果，
    /// 失败结果只交给当时等待的调用者，不写入缓存。
    #[instrument(skip(self), fields(mode = ?self.mode()))]
    pub async fn fetch(&self, url: &str) -> Result<Arc<PageResult>, NetworkError> {
        let normalized =
            normalize_url(url).map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", url, e)))?;
        let key = CacheKey::new(normalized, self.mode());

        if let Some(page) = self.cache.get(&key) {
            metrics::counter!("fetch_cache_hits_total").increment(1);
            debug!("Cache hit for {}", key.url);
            return Ok(page);
        }

        let cell = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                debug!("Joining in-flight fetch for {}", key.url);
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                // 前一个请求可能刚写完缓存并移除了自己的条目
                if let Some(page) = self.cache.get(&key) {
                    metrics::counter!("fetch_cache_hits_total").increment(1);
                    return Ok(page);
                }
                let cell: FetchCell = Arc::new(OnceCell::new());
                entry.insert(cell.clone());
                cell
            }
        };

        // 发起者被取消时，由下一个等待者接手执行
        cell.get_or_init(|| async {
            let outcome = self.fetch_with_retries(&key).await;
            if let Ok(page) = &outcome {
                self.cache.insert(key.clone(), page.clone());
            }
            self.in_flight.remove_if(&key, |_, v| Arc::ptr_eq(v, &cell));
            outcome
        })
        .await
        .clone()
    }

    async fn fetch_with_retries(&self, key: &CacheKey) -> Result<Arc<PageResult>, NetworkError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| NetworkError::Request("调度器已关闭".to_string()))?;

        let mut task = FetchTask {
            url: key.url.clone(),
            attempt: 1,
            identity: self.rotation.acquire_current_identity(),
        };

        loop {
            metrics::counter!("fetch_requests_total").increment(1);
            let request = FetchRequest::new(task.url.clone(), task.identity.clone(), self.config.timeout);
            let result = match tokio::time::timeout(self.config.timeout, self.engine.fetch(&request)).await {
                Ok(result) => result,
                Err(_) => Err(NetworkError::Timeout(task.url.clone())),
            };

            // 匿名模式下每次请求之后都换线路，无论成败
            let anonymized = task.identity.is_anonymized();
            if anonymized {
                self.rotate_in_background();
            }

            match result {
                Ok(response) => {
                    metrics::histogram!("fetch_duration_ms").record(response.response_time_ms as f64);
                    self.rotation.report_success(&task.identity);
                    return Ok(Arc::new(build_page(&task, response)));
                }
                Err(e) => {
                    self.rotation.report_failure(&task.identity);
                    if !e.is_retryable() || task.attempt >= self.config.max_attempts {
                        warn!(
                            "Giving up on {} after {} attempt(s): {}",
                            task.url, task.attempt, e
                        );
                        return Err(e);
                    }
                    debug!(
                        "Attempt {} for {} via {} failed: {}",
                        task.attempt, task.url, task.identity.egress, e
                    );

                    task.identity = self.next_identity(&task.identity, anonymized).await;
                    let backoff = self.config.retry.calculate_backoff(task.attempt);
                    task.attempt += 1;
                    if !backoff.is_zero() {
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }
    }

    /// 在后台请求轮换
    ///
    /// 控制通道缓慢或无响应时不影响本次抓取的返回，也不占用并发许可。
    /// 并发到达的轮换请求合并为一次。
    fn rotate_in_background(&self) {
        let rotation = Arc::clone(&self.rotation);
        tokio::spawn(async move {
            if let Err(e) = rotation.request_rotation().await {
                debug!("Post-request rotation skipped: {}", e);
            }
        });
    }

    /// 失败之后下一次尝试使用的身份
    async fn next_identity(&self, failed: &Identity, already_rotated: bool) -> Identity {
        if already_rotated {
            return self.rotation.acquire_current_identity();
        }
        match self.rotation.request_rotation().await {
            Ok(identity) if identity.egress != failed.egress => return identity,
            Ok(_) => {}
            Err(e) => debug!("Forced rotation unavailable: {}", e),
        }
        // 冷却期内直接从池中换一个，避免用同一个失败身份重试
        self.rotation
            .pool()
            .and_then(|pool| pool.next_healthy(Some(&failed.egress)))
            .unwrap_or_else(|| self.rotation.acquire_current_identity())
    }
}

fn build_page(task: &FetchTask, response: FetchResponse) -> PageResult {
    let parsed = parse_document(&response.content);
    PageResult {
        url: task.url.clone(),
        final_url: response.final_url,
        status_code: response.status_code,
        title: parsed.title,
        text: parsed.text,
        headings: parsed.headings,
        meta: parsed.meta,
        links: parsed.links,
        headers: response.headers,
        fetched_at: Utc::now(),
        identity_mode: task.identity.mode(),
        attempts: task.attempt,
    }
}
