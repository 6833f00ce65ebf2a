// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理应用程序的配置设置，包括匿名网络、代理池、抓取调度、评分与外部服务等配置
pub mod settings;
