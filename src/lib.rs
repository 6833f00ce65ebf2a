// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 爬取流水线的组装与执行
pub mod application;

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含各阶段的数据模型与评分、过滤等领域服务
pub mod domain;

/// 引擎模块
///
/// 实现网页抓取、身份池与身份轮换
pub mod engines;

/// 基础设施模块
///
/// 提供外部服务集成，如缓存、Tor控制端口、代理列表与链上数据源
pub mod infrastructure;

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
pub mod utils;
