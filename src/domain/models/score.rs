// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 特征名称，顺序固定
pub const FEATURE_NAMES: [&str; 10] = [
    "energy_efficiency",
    "carbon_offset_ratio",
    "renewable_energy_usage",
    "waste_management_score",
    "social_impact_score",
    "employee_welfare_index",
    "community_engagement_rate",
    "governance_score",
    "dao_participation",
    "transparency_score",
];

/// 固定顺序的特征向量
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: [f64; 10],
}

impl FeatureVector {
    pub fn new(values: [f64; 10]) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }

    /// 每个分量限制到 [0, 100]，非有限值记为0
    pub fn scaled(&self) -> Self {
        let mut values = self.values;
        for v in values.iter_mut() {
            *v = if v.is_finite() { v.clamp(0.0, 100.0) } else { 0.0 };
        }
        Self { values }
    }

    pub fn named(&self) -> BTreeMap<String, f64> {
        zip_named(&self.values)
    }
}

/// 将与特征顺序对齐的数值转换为按名称索引的映射
pub fn zip_named(values: &[f64]) -> BTreeMap<String, f64> {
    FEATURE_NAMES
        .iter()
        .zip(values.iter())
        .map(|(name, v)| (name.to_string(), *v))
        .collect()
}

/// 单个类别的评分明细
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryDetail {
    pub base_score: f64,
    pub sentiment_multiplier: f64,
    pub final_score: f64,
}

/// 机器学习评分路径的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlAssessment {
    pub predicted_score: f64,
    /// 原始特征
    pub features: FeatureVector,
    pub category_scores: BTreeMap<String, f64>,
    /// 使用了默认值的外部数据源
    pub degraded_sources: Vec<String>,
}

/// 评分结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub scores: BTreeMap<String, f64>,
    pub category_details: BTreeMap<String, CategoryDetail>,
    pub overall_score: f64,
    pub blockchain_alignment: f64,
    pub feature_importance: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_explanation: Option<BTreeMap<String, f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ml: Option<MlAssessment>,
}
