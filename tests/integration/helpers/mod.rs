// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use esgcrawl::application::use_cases::crawl_use_case::{CrawlPipeline, PageProcessor, PipelineConfig};
use esgcrawl::domain::services::esg_scorer::{CategoryWeights, EsgScorer};
use esgcrawl::domain::services::link_discovery::LinkDiscoverer;
use esgcrawl::domain::services::relevance_filter::{EmbeddingOracle, RelevanceConfig, RelevanceFilter};
use esgcrawl::domain::services::sentiment::LexiconSentiment;
use esgcrawl::domain::services::structuring::{GenerativeOracle, StructuringPipeline};
use esgcrawl::engines::fetch_scheduler::{FetchScheduler, SchedulerConfig};
use esgcrawl::domain::models::identity::Identity;
use esgcrawl::engines::reqwest_engine::ReqwestEngine;
use esgcrawl::engines::rotation::RotationController;
use esgcrawl::engines::traits::{FetchEngine, FetchRequest, FetchResponse};
use esgcrawl::infrastructure::cache::page_cache::PageCache;
use esgcrawl::infrastructure::tor_control::ControlChannel;
use esgcrawl::utils::errors::{NetworkError, OracleError, RotationError};
use esgcrawl::utils::retry_policy::RetryPolicy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 页面正文中出现该标记时，与第一个类别的相似度为0.5
pub const RELEVANT_MARKER: &str = "esg-high";

/// 类别嵌入为基向量；正文与第一个类别的相似度为0.5（含标记）或0.1
pub struct MarkerEmbedding;

#[async_trait]
impl EmbeddingOracle for MarkerEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, OracleError> {
        let categories = RelevanceConfig::default().categories;
        let mut vector = vec![0.0f32; categories.len() + 1];
        if let Some(i) = categories.iter().position(|c| c == text) {
            vector[i] = 1.0;
            return Ok(vector);
        }
        let similarity: f32 = if text.contains(RELEVANT_MARKER) { 0.5 } else { 0.1 };
        vector[0] = similarity;
        vector[categories.len()] = (1.0 - similarity * similarity).sqrt();
        Ok(vector)
    }
}

/// 总是返回同一份整理结果
pub struct CannedStructurer;

#[async_trait]
impl GenerativeOracle for CannedStructurer {
    async fn generate(&self, _prompt: &str) -> Result<String, OracleError> {
        Ok(r#"{"clean_text": "We cut carbon emissions and publish audits.",
               "environmental": ["We cut carbon emissions."],
               "social": [],
               "governance": ["The board publishes audits."]}"#
            .to_string())
    }
}

/// 记录 NEWNYM 次数的控制通道，可为每次信号设置耗时
#[derive(Default)]
pub struct CountingControl {
    pub signals: AtomicUsize,
    pub delay: Duration,
}

impl CountingControl {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            signals: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn signals(&self) -> usize {
        self.signals.load(Ordering::SeqCst)
    }

    /// 等待后台轮换发出指定次数的信号
    pub async fn wait_for_signals(&self, expected: usize) {
        for _ in 0..200 {
            if self.signals() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} NEWNYM signals, saw {}", expected, self.signals());
    }
}

#[async_trait]
impl ControlChannel for CountingControl {
    async fn authenticate(&self) -> Result<(), RotationError> {
        Ok(())
    }

    async fn signal_new_identity(&self) -> Result<(), RotationError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.signals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 忽略出口身份、总是直连的引擎，用于让匿名模式的调度器访问本地模拟服务器
pub struct LoopbackEngine;

#[async_trait]
impl FetchEngine for LoopbackEngine {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
        let mut direct = request.clone();
        direct.identity = Identity::direct();
        ReqwestEngine.fetch(&direct).await
    }
}

pub fn scheduler_config(max_attempts: u32) -> SchedulerConfig {
    SchedulerConfig {
        concurrency: 4,
        max_attempts,
        timeout: Duration::from_secs(30),
        retry: RetryPolicy::immediate(),
    }
}

/// 直连的真实HTTP调度器
pub fn direct_scheduler(max_attempts: u32) -> Arc<FetchScheduler> {
    Arc::new(FetchScheduler::new(
        Arc::new(ReqwestEngine),
        Arc::new(RotationController::direct()),
        Arc::new(PageCache::new(64, Duration::from_secs(300))),
        scheduler_config(max_attempts),
    ))
}

/// 使用桩预言机、直连抓取的流水线
pub fn stub_pipeline(crawl_timeout: Duration) -> CrawlPipeline {
    let processor = PageProcessor::new(
        Arc::new(RelevanceFilter::new(
            Arc::new(MarkerEmbedding),
            RelevanceConfig::default(),
        )),
        Arc::new(StructuringPipeline::new(Arc::new(CannedStructurer))),
        Arc::new(EsgScorer::new(
            Arc::new(LexiconSentiment),
            CategoryWeights::default(),
        )),
        None,
    );
    CrawlPipeline::new(
        direct_scheduler(1),
        None,
        Arc::new(processor),
        LinkDiscoverer::default(),
        PipelineConfig { crawl_timeout },
    )
}

pub fn html(title: &str, body: &str) -> String {
    format!(
        "<html><head><title>{}</title></head><body>{}</body></html>",
        title, body
    )
}
