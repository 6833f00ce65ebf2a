// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 引擎模块
///
/// 网络出口身份的管理与轮换，以及在其之上带缓存、合并与重试的抓取调度
pub mod fetch_scheduler;
pub mod identity_pool;
pub mod reqwest_engine;
pub mod rotation;
pub mod traits;
