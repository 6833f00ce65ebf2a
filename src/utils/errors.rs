// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;
use thiserror::Error;

/// 网络错误类型
///
/// 抓取超时、连接失败或非2xx响应。调度器会更换身份重试，超过上限后记为终态失败。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("请求超时: {0}")]
    Timeout(String),

    #[error("连接失败: {0}")]
    Connect(String),

    #[error("HTTP状态异常: {status} ({url})")]
    Status { status: u16, url: String },

    #[error("代理无效: {0}")]
    InvalidProxy(String),

    #[error("无效URL: {0}")]
    InvalidUrl(String),

    #[error("请求失败: {0}")]
    Request(String),
}

impl NetworkError {
    /// 判断错误是否可以换身份重试
    pub fn is_retryable(&self) -> bool {
        !matches!(self, NetworkError::InvalidUrl(_))
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            NetworkError::Timeout(e.to_string())
        } else if e.is_connect() {
            NetworkError::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            NetworkError::Status {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            NetworkError::Request(e.to_string())
        }
    }
}

/// 身份轮换错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RotationError {
    #[error("轮换冷却中，剩余 {remaining:?}")]
    Cooldown { remaining: Duration },

    #[error("控制通道不可用: {0}")]
    ControlChannel(String),

    #[error("没有可用的健康身份")]
    NoHealthyIdentity,
}

/// 外部预言机（模型/服务）错误类型
///
/// 永远不会中断爬取，每个调用方都有自己的默认值。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("未配置: {0}")]
    NotConfigured(String),

    #[error("服务不可用: {0}")]
    Unavailable(String),

    #[error("服务返回错误: {0}")]
    Http(String),

    #[error("响应格式无效: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for OracleError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            OracleError::Unavailable(e.to_string())
        } else if e.is_decode() {
            OracleError::InvalidResponse(e.to_string())
        } else {
            OracleError::Http(e.to_string())
        }
    }
}

/// 结构化输出的模式错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("不是有效的JSON: {0}")]
    NotJson(String),

    #[error("JSON结构不符合预期: {0}")]
    InvalidShape(String),
}

/// 配置错误，仅在启动阶段致命
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("缺少必需的凭据: {0}")]
    MissingCredential(String),

    #[error("类别权重之和必须为1.0，实际为 {0}")]
    InvalidWeights(f64),

    #[error("无效配置: {0}")]
    Invalid(String),

    #[error("配置加载失败: {0}")]
    Load(#[from] config::ConfigError),
}

/// 爬取流程错误
///
/// 单页失败不会出现在这里，它们被记录到报告中对应URL的条目上。
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("无效的起始URL: {0}")]
    InvalidUrl(String),

    #[error("匿名模式未启用")]
    AnonymityDisabled,

    #[error("起始页面抓取失败: {0}")]
    SeedFetch(#[from] NetworkError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
