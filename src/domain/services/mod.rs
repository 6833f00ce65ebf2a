// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 该模块包含从页面到评分的核心业务逻辑，外部模型与数据源都以预言机trait的形式注入。
///
/// 包含的服务：
/// - 链接发现（link_discovery）：从种子页面中挑选候选子页面
/// - 相关性过滤（relevance_filter）：基于向量相似度的主题判断
/// - 结构化整理（structuring）：将原始文本整理为按ESG类别划分的文档
/// - 情感分析（sentiment）：词典情感极性
/// - ESG评分（esg_scorer）：关键词密度与情感乘数的加权评分
/// - 机器学习评分（ml_scorer）：链上与治理指标构成的特征向量及其解释
/// - LLM服务（llm_service）：兼容OpenAI接口的嵌入与生成客户端
pub mod esg_scorer;
pub mod link_discovery;
pub mod llm_service;
pub mod ml_scorer;
pub mod relevance_filter;
pub mod sentiment;
pub mod structuring;
