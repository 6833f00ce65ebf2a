// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含系统的核心业务逻辑，包括：
/// - 领域模型（models）：各处理阶段的数据结构
/// - 服务（services）：过滤、整理与评分规则
pub mod models;
pub mod services;
