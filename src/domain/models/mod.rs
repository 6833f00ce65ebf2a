// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 每个处理阶段一种强类型记录：抓取结果、过滤内容、结构化文档、评分结果与最终报告。
pub mod content;
pub mod identity;
pub mod page;
pub mod report;
pub mod score;
