// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};
use url::Url;

use crate::config::settings::Settings;
use crate::domain::models::report::{CrawlReport, FailureReason, PageFailure, PageOutcome, UrlOutcome};
use crate::domain::services::esg_scorer::{CategoryWeights, EsgScorer};
use crate::domain::services::link_discovery::LinkDiscoverer;
use crate::domain::services::llm_service::LLMService;
use crate::domain::services::ml_scorer::{ExternalMetrics, LinearEsgModel, MlEsgScorer};
use crate::domain::services::relevance_filter::{to_filtered, RelevanceConfig, RelevanceFilter};
use crate::domain::services::sentiment::LexiconSentiment;
use crate::domain::services::structuring::StructuringPipeline;
use crate::engines::fetch_scheduler::{FetchScheduler, SchedulerConfig};
use crate::engines::identity_pool::{EchoProbe, IdentityPool, PoolConfig};
use crate::engines::reqwest_engine::ReqwestEngine;
use crate::engines::rotation::{Replenisher, RotationConfig, RotationController};
use crate::engines::traits::FetchEngine;
use crate::infrastructure::cache::page_cache::PageCache;
use crate::infrastructure::metric_sources::{ChainGasSource, KlimaCarbonSource, SnapshotDaoSource};
use crate::infrastructure::proxy_source::HttpProxyListSource;
use crate::infrastructure::tor_control::TorControlClient;
use crate::utils::errors::CrawlError;
use crate::utils::retry_policy::RetryPolicy;
use crate::utils::url_utils::{is_http, normalize_parsed};

/// 流水线配置
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 整次爬取的截止时间
    pub crawl_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            crawl_timeout: Duration::from_secs(120),
        }
    }
}

/// 单页处理：抓取、相关性过滤、结构化整理、评分
pub struct PageProcessor {
    filter: Arc<RelevanceFilter>,
    structuring: Arc<StructuringPipeline>,
    scorer: Arc<EsgScorer>,
    ml: Option<Arc<MlEsgScorer>>,
}

impl PageProcessor {
    pub fn new(
        filter: Arc<RelevanceFilter>,
        structuring: Arc<StructuringPipeline>,
        scorer: Arc<EsgScorer>,
        ml: Option<Arc<MlEsgScorer>>,
    ) -> Self {
        Self {
            filter,
            structuring,
            scorer,
            ml,
        }
    }

    /// 处理一个候选URL，所有失败都落在返回的结果里
    ///
    /// # 参数
    ///
    /// * `metrics` - 本次爬取共享的外部指标，第一个需要的页面负责获取
    pub async fn process(
        &self,
        scheduler: &FetchScheduler,
        url: &str,
        metrics: &OnceCell<ExternalMetrics>,
    ) -> PageOutcome {
        let page = match scheduler.fetch(url).await {
            Ok(page) => page,
            Err(e) => {
                return PageOutcome::Excluded(PageFailure::new(FailureReason::FetchFailed, e.to_string()))
            }
        };

        let classification = self.filter.classify_page(&page).await;
        let Some(filtered) = to_filtered(&page.url, &classification) else {
            return PageOutcome::Excluded(PageFailure::new(
                FailureReason::NotRelevant,
                format!(
                    "confidence {:.3} not above {}",
                    classification.confidence,
                    self.filter.threshold()
                ),
            ));
        };

        let mut outcome = UrlOutcome {
            url: page.url.clone(),
            title: page.title.clone(),
            filtered,
            document: None,
            score: None,
            raw_text: None,
            failure: None,
        };

        match self.structuring.structure(&page.text).await {
            Ok(document) => {
                let mut score = self.scorer.score(&document).await;
                if let Some(ml) = &self.ml {
                    let metrics = metrics.get_or_init(|| ml.collect_metrics()).await;
                    ml.assess(&document, metrics).await.attach_to(&mut score);
                }
                outcome.score = Some(score);
                outcome.document = Some(document);
            }
            Err(e) => {
                warn!("Structuring failed for {}, keeping raw text: {}", page.url, e);
                outcome.raw_text = Some(page.text.clone());
                outcome.failure = Some(PageFailure::new(FailureReason::StructuringFailed, e.to_string()));
            }
        }

        PageOutcome::Admitted(Box::new(outcome))
    }
}

/// 爬取流水线
///
/// 标准调度器用于非匿名爬取（代理池或直连），匿名调度器走Tor。两者共享同一个页面缓存，
/// 缓存键包含匿名模式，结果互不混用。
pub struct CrawlPipeline {
    standard: Arc<FetchScheduler>,
    anonymous: Option<Arc<FetchScheduler>>,
    processor: Arc<PageProcessor>,
    discoverer: LinkDiscoverer,
    config: PipelineConfig,
}

impl CrawlPipeline {
    pub fn new(
        standard: Arc<FetchScheduler>,
        anonymous: Option<Arc<FetchScheduler>>,
        processor: Arc<PageProcessor>,
        discoverer: LinkDiscoverer,
        config: PipelineConfig,
    ) -> Self {
        Self {
            standard,
            anonymous,
            processor,
            discoverer,
            config,
        }
    }

    /// 根据配置组装完整流水线
    ///
    /// 代理池补充后没有健康代理时退回直连；Tor控制通道认证失败只记录警告，
    /// 轮换请求会在运行时各自失败并沿用当前线路。
    pub async fn from_settings(settings: &Settings) -> Result<Self, CrawlError> {
        let engine: Arc<dyn FetchEngine> = Arc::new(ReqwestEngine);
        let fetch = &settings.fetch;
        let cache = Arc::new(PageCache::new(fetch.cache_capacity, fetch.cache_ttl()));
        let scheduler_config = SchedulerConfig {
            concurrency: fetch.concurrency,
            max_attempts: fetch.max_attempts,
            timeout: fetch.timeout(),
            retry: RetryPolicy::default(),
        };
        let rotation_config = RotationConfig {
            cooldown: Duration::from_secs(settings.anonymity.cooldown_secs),
            settle: Duration::from_millis(settings.anonymity.settle_millis),
        };

        let standard_rotation = if settings.proxy.enabled {
            Self::proxy_rotation(settings, engine.clone(), rotation_config.clone()).await
        } else {
            RotationController::direct()
        };
        info!("Standard fetches use {:?} mode", standard_rotation.mode());
        let standard = Arc::new(FetchScheduler::new(
            engine.clone(),
            Arc::new(standard_rotation),
            cache.clone(),
            scheduler_config.clone(),
        ));

        let anonymous = if settings.anonymity.enabled {
            let control = Arc::new(
                TorControlClient::new(
                    settings.anonymity.control_addr.clone(),
                    settings.anonymity.control_password.clone(),
                )
                .with_timeout(Duration::from_secs(settings.anonymity.control_timeout_secs)),
            );
            let rotation =
                RotationController::tor(settings.anonymity.socks_addr.clone(), control, rotation_config);
            if let Err(e) = rotation.verify_control().await {
                warn!("Tor control channel unavailable, circuits will not rotate: {}", e);
            }
            Some(Arc::new(FetchScheduler::new(
                engine,
                Arc::new(rotation),
                cache,
                scheduler_config,
            )))
        } else {
            None
        };

        let llm = Arc::new(LLMService::from_settings(&settings.llm));
        let relevance = &settings.relevance;
        let filter = Arc::new(RelevanceFilter::new(
            llm.clone(),
            RelevanceConfig {
                threshold: relevance.threshold,
                max_chars: relevance.max_chars,
                summary_chars: relevance.summary_chars,
                categories: relevance.categories.clone(),
            },
        ));
        let structuring = Arc::new(StructuringPipeline::new(llm));
        let scorer = Arc::new(EsgScorer::new(
            Arc::new(LexiconSentiment),
            CategoryWeights::from_settings(&settings.scoring)?,
        ));

        let ml = match (&settings.chain.infura_api_key, settings.chain.ml_enabled) {
            (Some(key), true) => Some(Arc::new(MlEsgScorer::new(
                Arc::new(ChainGasSource::from_infura_key(key)),
                Arc::new(SnapshotDaoSource::new(settings.chain.snapshot_url.clone())),
                Arc::new(KlimaCarbonSource::new(settings.chain.klima_subgraph_url.clone())),
                Arc::new(LinearEsgModel::default()),
            ))),
            _ => None,
        };

        Ok(Self::new(
            standard,
            anonymous,
            Arc::new(PageProcessor::new(filter, structuring, scorer, ml)),
            LinkDiscoverer::default(),
            PipelineConfig {
                crawl_timeout: fetch.crawl_timeout(),
            },
        ))
    }

    async fn proxy_rotation(
        settings: &Settings,
        engine: Arc<dyn FetchEngine>,
        config: RotationConfig,
    ) -> RotationController {
        let proxy = &settings.proxy;
        let verify_timeout = Duration::from_secs(proxy.verify_timeout_secs);
        let pool = Arc::new(IdentityPool::new(PoolConfig {
            max_consecutive_failures: proxy.max_consecutive_failures,
            min_healthy: proxy.min_healthy,
            verify_concurrency: proxy.verify_concurrency,
        }));
        let replenisher = Replenisher {
            source: Arc::new(HttpProxyListSource::new(proxy.sources.clone(), verify_timeout)),
            probe: Arc::new(EchoProbe::new(engine, proxy.echo_url.clone(), verify_timeout)),
        };

        let added = pool
            .replenish(replenisher.source.as_ref(), replenisher.probe.as_ref())
            .await;
        info!("Proxy pool initialized with {} verified proxies", added);

        match RotationController::proxy(pool, Some(replenisher), config) {
            Ok(rotation) => rotation,
            Err(e) => {
                warn!("Falling back to direct fetches: {}", e);
                RotationController::direct()
            }
        }
    }

    /// 执行一次爬取
    ///
    /// 种子URL无效、请求匿名但未启用、种子页面抓取失败时返回错误；其余所有失败都记录在报告中。
    /// 超过截止时间时取消所有未完成的页面，已完成的结果保留。
    #[instrument(skip(self))]
    pub async fn run_crawl(&self, base_url: &str, use_anonymity: bool) -> Result<CrawlReport, CrawlError> {
        let deadline = Instant::now() + self.config.crawl_timeout;

        let mut base = Url::parse(base_url.trim())
            .map_err(|e| CrawlError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if !is_http(&base) {
            return Err(CrawlError::InvalidUrl(base_url.to_string()));
        }
        let base_key = normalize_parsed(&mut base);

        let scheduler = if use_anonymity {
            self.anonymous.clone().ok_or(CrawlError::AnonymityDisabled)?
        } else {
            self.standard.clone()
        };

        let mut report = CrawlReport::new(base_key.clone(), scheduler.mode());
        info!("Crawl {} started for {}", report.run_id, base_key);

        let seed = match tokio::time::timeout_at(deadline, scheduler.fetch(&base_key)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Crawl timed out while fetching seed page {}", base_key);
                report.timed_out = true;
                report.finish();
                return Ok(report);
            }
        };

        // 重定向后的地址才是相对链接的基准
        let seed_url = Url::parse(&seed.final_url)
            .or_else(|_| Url::parse(&seed.url))
            .unwrap_or(base);
        let discovered = self.discoverer.discover(&seed_url, &seed.links);
        report.stats.discovered = discovered.candidates.len();
        report.decentralized_refs = discovered.decentralized_refs;
        info!("Discovered {} candidate links", discovered.candidates.len());

        let metrics = Arc::new(OnceCell::new());
        let mut pending: HashSet<String> = HashSet::new();
        let mut join_set = JoinSet::new();
        for url in discovered.candidates {
            pending.insert(url.clone());
            let scheduler = scheduler.clone();
            let processor = self.processor.clone();
            let metrics = metrics.clone();
            join_set.spawn(async move {
                let outcome = processor.process(&scheduler, &url, &metrics).await;
                (url, outcome)
            });
        }

        loop {
            match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                Ok(Some(Ok((url, outcome)))) => {
                    pending.remove(&url);
                    report.record(url, outcome);
                }
                Ok(Some(Err(e))) => error!("Page task failed: {}", e),
                Ok(None) => break,
                Err(_) => {
                    warn!("Crawl deadline reached with {} page(s) outstanding", pending.len());
                    join_set.abort_all();
                    report.timed_out = true;
                    break;
                }
            }
        }

        let (reason, message) = if report.timed_out {
            (FailureReason::Cancelled, "crawl deadline reached")
        } else {
            (FailureReason::FetchFailed, "page task aborted")
        };
        for url in pending {
            report.record(url, PageOutcome::Excluded(PageFailure::new(reason, message)));
        }

        report.finish();
        info!(
            "Crawl {} finished: {} relevant, {} excluded",
            report.run_id,
            report.pages.len(),
            report.excluded.len()
        );
        Ok(report)
    }
}
