// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::domain::models::content::StructuredDocument;
use crate::domain::models::score::{zip_named, FeatureVector, MlAssessment, ScoreResult};
use crate::domain::services::esg_scorer::round2;
use crate::utils::errors::OracleError;

/// 每单位gas的估算能耗（kWh）
pub const ENERGY_PER_GAS_KWH: f64 = 0.000000392;

/// 员工福利指数没有数据来源，取中性常数
pub const NEUTRAL_EMPLOYEE_WELFARE: f64 = 75.0;

/// 线性模型的特征权重，与特征顺序对齐，和为1
pub const LINEAR_MODEL_WEIGHTS: [f64; 10] = [0.15, 0.15, 0.12, 0.12, 0.10, 0.10, 0.08, 0.08, 0.05, 0.05];

/// L1/L2 能耗指标
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergyMetrics {
    pub l1_kwh: f64,
    pub l2_kwh: f64,
    /// `1 - l2_gas / l1_gas`
    pub l2_efficiency: f64,
}

impl EnergyMetrics {
    pub fn from_gas(l1_gas: u64, l2_gas: u64) -> Self {
        let l2_efficiency = if l1_gas == 0 {
            0.0
        } else {
            1.0 - l2_gas as f64 / l1_gas as f64
        };
        Self {
            l1_kwh: l1_gas as f64 * ENERGY_PER_GAS_KWH,
            l2_kwh: l2_gas as f64 * ENERGY_PER_GAS_KWH,
            l2_efficiency,
        }
    }
}

/// DAO治理指标
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DaoMetrics {
    pub proposal_count: usize,
    pub execution_rate: f64,
    pub participation_rate: f64,
}

/// 单个提案的投票情况
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProposalSample {
    pub votes: f64,
    pub quorum: f64,
    pub executed: bool,
}

impl DaoMetrics {
    /// 参与率为 `votes / quorum` 的平均值，法定人数为0的提案不计入
    pub fn from_proposals(proposals: &[ProposalSample]) -> Self {
        if proposals.is_empty() {
            return Self::default();
        }
        let executed = proposals.iter().filter(|p| p.executed).count();
        let ratios: Vec<f64> = proposals
            .iter()
            .filter(|p| p.quorum > 0.0)
            .map(|p| p.votes / p.quorum)
            .collect();
        let participation_rate = if ratios.is_empty() {
            0.0
        } else {
            ratios.iter().sum::<f64>() / ratios.len() as f64
        };
        Self {
            proposal_count: proposals.len(),
            execution_rate: executed as f64 / proposals.len() as f64,
            participation_rate,
        }
    }
}

/// 碳抵消指标
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CarbonMetrics {
    pub carbon_locked: f64,
    pub offset_rate: f64,
}

/// 链上gas数据源
#[async_trait]
pub trait ChainGasOracle: Send + Sync {
    async fn energy_metrics(&self) -> Result<EnergyMetrics, OracleError>;
}

/// DAO治理数据源
#[async_trait]
pub trait DaoGovernanceOracle: Send + Sync {
    async fn dao_metrics(&self) -> Result<DaoMetrics, OracleError>;
}

/// 碳抵消数据源
#[async_trait]
pub trait CarbonOffsetOracle: Send + Sync {
    async fn carbon_metrics(&self) -> Result<CarbonMetrics, OracleError>;
}

/// 回归模型预言机
#[async_trait]
pub trait RegressionOracle: Send + Sync {
    /// 预测分数
    async fn predict(&self, features: &FeatureVector) -> Result<f64, OracleError>;

    /// 每个特征对预测的贡献，与特征顺序对齐
    async fn explain(&self, features: &FeatureVector) -> Result<Vec<f64>, OracleError>;

    /// 局部解释，不支持时返回 `None`
    async fn explain_local(&self, _features: &FeatureVector) -> Result<Option<Vec<f64>>, OracleError> {
        Ok(None)
    }
}

/// 默认的线性模型
///
/// 预测为加权和；全局解释为相对中点50的贡献 `w * (x - 50)`，局部解释为 `w * x`
#[derive(Debug, Clone, Copy)]
pub struct LinearEsgModel {
    weights: [f64; 10],
}

impl Default for LinearEsgModel {
    fn default() -> Self {
        Self {
            weights: LINEAR_MODEL_WEIGHTS,
        }
    }
}

#[async_trait]
impl RegressionOracle for LinearEsgModel {
    async fn predict(&self, features: &FeatureVector) -> Result<f64, OracleError> {
        Ok(self
            .weights
            .iter()
            .zip(features.values.iter())
            .map(|(w, x)| w * x)
            .sum())
    }

    async fn explain(&self, features: &FeatureVector) -> Result<Vec<f64>, OracleError> {
        Ok(self
            .weights
            .iter()
            .zip(features.values.iter())
            .map(|(w, x)| w * (x - 50.0))
            .collect())
    }

    async fn explain_local(&self, features: &FeatureVector) -> Result<Option<Vec<f64>>, OracleError> {
        Ok(Some(
            self.weights
                .iter()
                .zip(features.values.iter())
                .map(|(w, x)| w * x)
                .collect(),
        ))
    }
}

/// 外部指标，失败的数据源已替换为默认值
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalMetrics {
    pub energy: EnergyMetrics,
    pub dao: DaoMetrics,
    pub carbon: CarbonMetrics,
    /// 使用了默认值的数据源名称
    pub degraded: Vec<String>,
}

/// 从文档和外部指标构造原始特征
pub fn extract_features(document: &StructuredDocument, metrics: &ExternalMetrics) -> FeatureVector {
    let energy = &metrics.energy;
    let dao = &metrics.dao;
    let total_kwh = energy.l1_kwh + energy.l2_kwh;

    let renewable = if total_kwh == 0.0 {
        0.0
    } else {
        energy.l2_kwh / total_kwh * 100.0
    };
    let disclosures =
        (document.environmental.len() + document.social.len() + document.governance.len()) as f64;

    FeatureVector::new([
        energy.l2_efficiency * 100.0,
        metrics.carbon.carbon_locked / (energy.l1_kwh + 1.0),
        renewable,
        (1.0 - energy.l2_kwh / (energy.l1_kwh + 1.0)) * 100.0,
        (15.0 * document.social.len() as f64).min(100.0),
        NEUTRAL_EMPLOYEE_WELFARE,
        dao.participation_rate * 100.0,
        dao.execution_rate * dao.participation_rate * 100.0,
        dao.participation_rate * 100.0,
        (2.0 * disclosures / 3.0).min(100.0),
    ])
}

/// 机器学习评分的输出
#[derive(Debug, Clone, PartialEq)]
pub struct MlScoring {
    pub assessment: MlAssessment,
    pub feature_importance: BTreeMap<String, f64>,
    pub local_explanation: Option<BTreeMap<String, f64>>,
}

impl MlScoring {
    /// 合并到关键词评分结果中
    pub fn attach_to(self, result: &mut ScoreResult) {
        result.feature_importance = self.feature_importance;
        result.local_explanation = self.local_explanation;
        result.ml = Some(self.assessment);
    }
}

/// 基于外部指标的机器学习评分
pub struct MlEsgScorer {
    gas: Arc<dyn ChainGasOracle>,
    dao: Arc<dyn DaoGovernanceOracle>,
    carbon: Arc<dyn CarbonOffsetOracle>,
    model: Arc<dyn RegressionOracle>,
}

impl MlEsgScorer {
    pub fn new(
        gas: Arc<dyn ChainGasOracle>,
        dao: Arc<dyn DaoGovernanceOracle>,
        carbon: Arc<dyn CarbonOffsetOracle>,
        model: Arc<dyn RegressionOracle>,
    ) -> Self {
        Self {
            gas,
            dao,
            carbon,
            model,
        }
    }

    /// 并发获取三类外部指标，单个数据源失败时使用默认值
    pub async fn collect_metrics(&self) -> ExternalMetrics {
        let (energy, dao, carbon) = tokio::join!(
            self.gas.energy_metrics(),
            self.dao.dao_metrics(),
            self.carbon.carbon_metrics()
        );

        let mut degraded = Vec::new();
        let energy = energy.unwrap_or_else(|e| {
            warn!("Chain gas metrics unavailable: {}", e);
            degraded.push("chain_gas".to_string());
            EnergyMetrics::default()
        });
        let dao = dao.unwrap_or_else(|e| {
            warn!("DAO governance metrics unavailable: {}", e);
            degraded.push("dao_governance".to_string());
            DaoMetrics::default()
        });
        let carbon = carbon.unwrap_or_else(|e| {
            warn!("Carbon offset metrics unavailable: {}", e);
            degraded.push("carbon_offset".to_string());
            CarbonMetrics::default()
        });

        ExternalMetrics {
            energy,
            dao,
            carbon,
            degraded,
        }
    }

    /// 对文档做机器学习评分，任何一步失败都只降级对应的输出
    pub async fn assess(&self, document: &StructuredDocument, metrics: &ExternalMetrics) -> MlScoring {
        let features = extract_features(document, metrics);
        let scaled = features.scaled();
        let mut degraded = metrics.degraded.clone();

        let predicted_score = match self.model.predict(&scaled).await {
            Ok(score) if score.is_finite() => round2(score.clamp(0.0, 100.0)),
            Ok(_) | Err(_) => {
                degraded.push("model".to_string());
                0.0
            }
        };

        let feature_importance = match self.model.explain(&scaled).await {
            Ok(values) => zip_named(&values),
            Err(e) => {
                warn!("Feature importance unavailable: {}", e);
                degraded.push("explainer".to_string());
                BTreeMap::new()
            }
        };

        let local_explanation = match self.model.explain_local(&scaled).await {
            Ok(values) => values.map(|v| zip_named(&v)),
            Err(e) => {
                warn!("Local explanation unavailable: {}", e);
                None
            }
        };

        let s = &scaled.values;
        let mut category_scores = BTreeMap::new();
        category_scores.insert("environmental".to_string(), round2((s[0] + s[1]) / 2.0));
        category_scores.insert("social".to_string(), round2(s[9]));
        category_scores.insert("governance".to_string(), round2((s[7] + s[8]) / 2.0));

        MlScoring {
            assessment: MlAssessment {
                predicted_score,
                features,
                category_scores,
                degraded_sources: degraded,
            },
            feature_importance,
            local_explanation,
        }
    }
}
