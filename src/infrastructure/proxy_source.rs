// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

/// 代理候选来源
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// 获取 `host:port` 形式的候选代理，已去重
    async fn fetch_candidates(&self) -> Vec<String>;
}

/// 从公共代理列表下载候选
///
/// 每个地址返回按行分隔的 `host:port`，单个来源失败只记录日志
pub struct HttpProxyListSource {
    client: reqwest::Client,
    sources: Vec<String>,
}

impl HttpProxyListSource {
    pub fn new(sources: Vec<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client, sources }
    }

    async fn fetch_one(&self, source: &str) -> Result<String, reqwest::Error> {
        self.client
            .get(source)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

#[async_trait]
impl ProxySource for HttpProxyListSource {
    async fn fetch_candidates(&self) -> Vec<String> {
        let bodies = futures::future::join_all(self.sources.iter().map(|s| self.fetch_one(s))).await;

        let mut combined = String::new();
        for (source, body) in self.sources.iter().zip(bodies) {
            match body {
                Ok(text) => {
                    combined.push_str(&text);
                    combined.push('\n');
                }
                Err(e) => warn!("Failed to fetch proxy list from {}: {}", source, e),
            }
        }

        let candidates = parse_proxy_list(&combined);
        debug!("Collected {} proxy candidates", candidates.len());
        candidates
    }
}

/// 解析代理列表
///
/// 忽略空行和 `#` 注释，只保留端口合法的 `host:port`，保持首次出现的顺序
pub fn parse_proxy_list(body: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| is_host_port(line))
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect()
}

fn is_host_port(entry: &str) -> bool {
    let Some((host, port)) = entry.rsplit_once(':') else {
        return false;
    };
    !host.is_empty()
        && !host.contains(char::is_whitespace)
        && !host.contains('/')
        && port.parse::<u16>().is_ok_and(|p| p > 0)
}
