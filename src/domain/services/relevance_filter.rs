// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::models::content::{Classification, FilteredContent};
use crate::domain::models::page::PageResult;
use crate::utils::errors::OracleError;
use crate::utils::html::collapse_whitespace;

/// 向量化预言机
#[async_trait]
pub trait EmbeddingOracle: Send + Sync {
    /// 返回固定维度的向量
    async fn embed(&self, text: &str) -> Result<Vec<f32>, OracleError>;
}

/// 相关性过滤配置
#[derive(Debug, Clone)]
pub struct RelevanceConfig {
    /// 准入阈值（严格大于）
    pub threshold: f64,
    /// 参与向量化的最大字符数
    pub max_chars: usize,
    /// 摘要长度
    pub summary_chars: usize,
    /// 分类标签
    pub categories: Vec<String>,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            max_chars: 512,
            summary_chars: 200,
            categories: [
                "sustainability",
                "environmental",
                "social responsibility",
                "governance",
                "blockchain",
                "crypto",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// 余弦相似度，任一向量为零或维度不一致时为0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// 置信度是否达到准入条件
pub fn admits(confidence: f64, threshold: f64) -> bool {
    confidence > threshold
}

/// 截取前 `max_chars` 个字符，超出时追加省略号
fn summarize(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// 相关性过滤器
///
/// 文本与每个类别的向量计算余弦相似度，取最大者。预言机失败时判为不相关。
pub struct RelevanceFilter {
    oracle: Arc<dyn EmbeddingOracle>,
    config: RelevanceConfig,
    category_cache: DashMap<String, Arc<Vec<f32>>>,
}

impl RelevanceFilter {
    pub fn new(oracle: Arc<dyn EmbeddingOracle>, config: RelevanceConfig) -> Self {
        Self {
            oracle,
            config,
            category_cache: DashMap::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    async fn category_embedding(&self, category: &str) -> Result<Arc<Vec<f32>>, OracleError> {
        if let Some(cached) = self.category_cache.get(category) {
            return Ok(cached.clone());
        }
        let embedding = Arc::new(self.oracle.embed(category).await?);
        self.category_cache
            .insert(category.to_string(), embedding.clone());
        Ok(embedding)
    }

    /// 对文本分类
    ///
    /// # 参数
    ///
    /// * `text` - 待分类文本，合并空白后截断到 `max_chars` 个字符
    /// * `categories` - 候选类别
    pub async fn classify(&self, text: &str, categories: &[String]) -> Classification {
        let collapsed = collapse_whitespace(text);
        if collapsed.is_empty() || categories.is_empty() {
            return Classification::not_relevant();
        }
        let truncated: String = collapsed.chars().take(self.config.max_chars).collect();

        let text_embedding = match self.oracle.embed(&truncated).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Embedding oracle failed, treating text as not relevant: {}", e);
                return Classification::not_relevant();
            }
        };

        let mut best: Option<(&String, f64)> = None;
        for category in categories {
            let embedding = match self.category_embedding(category).await {
                Ok(v) => v,
                Err(e) => {
                    warn!("Embedding oracle failed for category {}: {}", category, e);
                    return Classification::not_relevant();
                }
            };
            let similarity = cosine_similarity(&text_embedding, &embedding);
            if best.is_none_or(|(_, s)| similarity > s) {
                best = Some((category, similarity));
            }
        }

        let Some((category, similarity)) = best else {
            return Classification::not_relevant();
        };
        let confidence = if similarity.is_finite() {
            similarity.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let is_relevant = admits(confidence, self.config.threshold);
        debug!(
            "Best category {} with confidence {:.3} (relevant: {})",
            category, confidence, is_relevant
        );

        Classification {
            is_relevant,
            category: is_relevant.then(|| category.clone()),
            confidence,
            summary: summarize(&collapsed, self.config.summary_chars),
        }
    }

    /// 按配置的类别对页面分类，依次使用正文、标题、URL中第一个非空的
    pub async fn classify_page(&self, page: &PageResult) -> Classification {
        self.classify(page.main_text(), &self.config.categories)
            .await
    }
}

/// 通过准入时生成 `FilteredContent`
pub fn to_filtered(source_url: &str, classification: &Classification) -> Option<FilteredContent> {
    if !classification.is_relevant {
        return None;
    }
    Some(FilteredContent {
        source_url: source_url.to_string(),
        category: classification.category.clone()?,
        confidence: classification.confidence,
        summary: classification.summary.clone(),
    })
}
