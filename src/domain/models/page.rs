// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::identity::{AnonymityMode, Identity};

/// 抓取任务
///
/// 以规范化URL为键，调度器保证同一URL同时最多只有一个任务在执行。
#[derive(Debug, Clone)]
pub struct FetchTask {
    /// 规范化后的URL
    pub url: String,
    /// 当前尝试次数（从1开始）
    pub attempt: u32,
    /// 派发时捕获的身份
    pub identity: Identity,
}

/// 页面中的链接
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    /// 原始href
    pub href: String,
    /// 锚文本
    pub text: String,
}

/// 页面抓取结果
///
/// 生成后不可变，通过 `Arc` 在缓存和调用方之间共享。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 请求的规范化URL，也是缓存键
    pub url: String,
    /// 跟随重定向之后的地址，相对链接以它为基准解析
    pub final_url: String,
    pub status_code: u16,
    pub title: String,
    /// 正文文本，已合并空白
    pub text: String,
    pub headings: Vec<String>,
    pub meta: HashMap<String, String>,
    pub links: Vec<PageLink>,
    pub headers: HashMap<String, String>,
    pub fetched_at: DateTime<Utc>,
    pub identity_mode: AnonymityMode,
    /// 成功前用掉的尝试次数
    pub attempts: u32,
}

impl PageResult {
    /// 用于相关性判断的主要文本
    ///
    /// 依次取正文、标题、URL中第一个非空的。
    pub fn main_text(&self) -> &str {
        [self.text.as_str(), self.title.as_str(), self.url.as_str()]
            .into_iter()
            .find(|s| !s.trim().is_empty())
            .unwrap_or("")
    }
}
