// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::models::identity::Identity;
use crate::utils::errors::NetworkError;

/// 抓取请求
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// 目标URL
    pub url: String,
    /// 本次请求使用的出口身份，在派发时确定
    pub identity: Identity,
    /// 超时时间
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, identity: Identity, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            identity,
            timeout,
        }
    }
}

/// 抓取响应
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP状态码
    pub status_code: u16,
    /// 响应内容
    pub content: String,
    /// 响应头
    pub headers: HashMap<String, String>,
    /// 响应时间（毫秒）
    pub response_time_ms: u64,
    /// 重定向后的最终地址
    pub final_url: String,
}

/// 抓取引擎特征
///
/// 所有出站页面请求都经过该接口，便于在测试中替换为桩实现
#[async_trait]
pub trait FetchEngine: Send + Sync {
    /// 通过请求中的身份抓取页面
    ///
    /// # 参数
    ///
    /// * `request` - 抓取请求
    ///
    /// # 返回值
    ///
    /// * `Ok(FetchResponse)` - 2xx 响应
    /// * `Err(NetworkError)` - 超时、连接失败、代理无效或非2xx状态
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError>;
}
