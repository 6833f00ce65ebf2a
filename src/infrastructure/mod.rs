// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 负责与外部系统的交互：
/// - 缓存（cache）：按URL与匿名模式索引的页面缓存
/// - 指标数据源（metric_sources）：链上gas、DAO治理与碳抵消数据
/// - 代理来源（proxy_source）：公开代理列表
/// - Tor控制（tor_control）：控制端口客户端
pub mod cache;
pub mod metric_sources;
pub mod proxy_source;
pub mod tor_control;
