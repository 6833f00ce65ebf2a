// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::settings::ScoringSettings;
use crate::domain::models::content::{EsgCategory, StructuredDocument};
use crate::domain::models::score::{CategoryDetail, ScoreResult};
use crate::domain::services::sentiment::SentimentOracle;
use crate::utils::errors::ConfigError;

const ENVIRONMENTAL_KEYWORDS: &[&str] = &[
    "sustainability",
    "renewable",
    "carbon",
    "emissions",
    "climate",
    "environmental",
    "green",
    "energy",
    "waste",
    "recycling",
];

const SOCIAL_KEYWORDS: &[&str] = &[
    "community",
    "diversity",
    "inclusion",
    "employee",
    "health",
    "safety",
    "human rights",
    "labor",
    "fair",
    "social",
];

const GOVERNANCE_KEYWORDS: &[&str] = &[
    "transparency",
    "compliance",
    "board",
    "audit",
    "risk",
    "ethics",
    "corruption",
    "governance",
    "regulatory",
    "policy",
];

const BLOCKCHAIN_KEYWORDS: &[&str] = &[
    "blockchain",
    "crypto",
    "token",
    "web3",
    "decentralized",
    "smart contract",
    "consensus",
    "distributed ledger",
];

/// 权重之和允许的误差
const WEIGHT_TOLERANCE: f64 = 1e-6;

fn keywords_for(category: EsgCategory) -> &'static [&'static str] {
    match category {
        EsgCategory::Environmental => ENVIRONMENTAL_KEYWORDS,
        EsgCategory::Social => SOCIAL_KEYWORDS,
        EsgCategory::Governance => GOVERNANCE_KEYWORDS,
    }
}

/// 四舍五入到两位小数
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 关键词出现次数（不区分大小写，按子串计）
pub fn keyword_hits(text: &str, keywords: &[&str]) -> usize {
    let lower = text.to_lowercase();
    keywords.iter().map(|k| lower.matches(k).count()).sum()
}

/// 关键词密度得分：`min(100, 100 * hits / (words + 1))`
pub fn base_score(text: &str, keywords: &[&str]) -> f64 {
    if text.trim().is_empty() {
        return 0.0;
    }
    let words = text.split_whitespace().count();
    let hits = keyword_hits(text, keywords);
    (100.0 * hits as f64 / (words as f64 + 1.0)).min(100.0)
}

/// 极性 [-1, 1] 映射为乘数 [0.5, 1.5]
pub fn sentiment_multiplier(polarity: f64) -> f64 {
    if !polarity.is_finite() {
        return 1.0;
    }
    1.0 + 0.5 * polarity.clamp(-1.0, 1.0)
}

/// ESG类别权重，之和恒为1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryWeights {
    environmental: f64,
    social: f64,
    governance: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            environmental: 0.35,
            social: 0.35,
            governance: 0.30,
        }
    }
}

impl CategoryWeights {
    pub fn new(environmental: f64, social: f64, governance: f64) -> Result<Self, ConfigError> {
        let sum = environmental + social + governance;
        let finite = [environmental, social, governance]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0);
        if !finite || (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::InvalidWeights(sum));
        }
        Ok(Self {
            environmental,
            social,
            governance,
        })
    }

    /// 未覆盖时使用默认权重
    pub fn from_settings(settings: &ScoringSettings) -> Result<Self, ConfigError> {
        match settings.weights() {
            Some([e, s, g]) => Self::new(e, s, g),
            None => Ok(Self::default()),
        }
    }

    pub fn weight(&self, category: EsgCategory) -> f64 {
        match category {
            EsgCategory::Environmental => self.environmental,
            EsgCategory::Social => self.social,
            EsgCategory::Governance => self.governance,
        }
    }

    pub fn sum(&self) -> f64 {
        self.environmental + self.social + self.governance
    }
}

/// ESG评分器
///
/// 每个类别：关键词密度得分乘以情感乘数，再按权重求和得到总分。
/// 区块链契合度单独计算，不参与加权。
pub struct EsgScorer {
    sentiment: Arc<dyn SentimentOracle>,
    weights: CategoryWeights,
}

impl EsgScorer {
    pub fn new(sentiment: Arc<dyn SentimentOracle>, weights: CategoryWeights) -> Self {
        Self { sentiment, weights }
    }

    pub fn weights(&self) -> &CategoryWeights {
        &self.weights
    }

    /// 情感预言机失败时乘数为1
    async fn multiplier(&self, text: &str) -> f64 {
        if text.trim().is_empty() {
            return 1.0;
        }
        match self.sentiment.polarity(text).await {
            Ok(polarity) => sentiment_multiplier(polarity),
            Err(e) => {
                debug!("Sentiment oracle failed, using neutral multiplier: {}", e);
                1.0
            }
        }
    }

    /// 对结构化文档评分
    pub async fn score(&self, document: &StructuredDocument) -> ScoreResult {
        let mut scores = BTreeMap::new();
        let mut category_details = BTreeMap::new();
        let mut overall = 0.0;

        for category in EsgCategory::ALL {
            let text = document.joined(category);
            let base = base_score(&text, keywords_for(category));
            let multiplier = self.multiplier(&text).await;
            let final_score = round2((base * multiplier).clamp(0.0, 100.0));

            overall += final_score * self.weights.weight(category);
            scores.insert(category.to_string(), final_score);
            category_details.insert(
                category.to_string(),
                CategoryDetail {
                    base_score: round2(base),
                    sentiment_multiplier: round2(multiplier),
                    final_score,
                },
            );
        }

        ScoreResult {
            scores,
            category_details,
            overall_score: round2(overall.clamp(0.0, 100.0)),
            blockchain_alignment: round2(base_score(&document.clean_text, BLOCKCHAIN_KEYWORDS)),
            feature_importance: BTreeMap::new(),
            local_explanation: None,
            ml: None,
        }
    }
}
