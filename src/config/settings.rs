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

use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::utils::errors::ConfigError;

/// 应用程序配置设置
///
/// 包含匿名网络、代理池、抓取、相关性过滤、评分、LLM 与链上数据源等所有配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 匿名网络（Tor）配置
    pub anonymity: AnonymitySettings,
    /// 代理池配置
    pub proxy: ProxySettings,
    /// 抓取调度配置
    pub fetch: FetchSettings,
    /// 相关性过滤配置
    pub relevance: RelevanceSettings,
    /// 评分权重配置
    #[serde(default)]
    pub scoring: ScoringSettings,
    /// LLM 服务配置
    pub llm: LlmSettings,
    /// 链上与治理数据源配置
    pub chain: ChainSettings,
}

/// 匿名网络配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct AnonymitySettings {
    /// 是否启用匿名抓取
    pub enabled: bool,
    /// SOCKS 代理地址
    pub socks_addr: String,
    /// 控制端口地址
    pub control_addr: String,
    /// 控制端口密码
    pub control_password: Option<String>,
    /// 控制端口单次命令的超时（秒）
    pub control_timeout_secs: u64,
    /// 两次轮换之间的最小间隔（秒）
    pub cooldown_secs: u64,
    /// 新线路生效前的等待时间（毫秒）
    pub settle_millis: u64,
}

/// 代理池配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ProxySettings {
    /// 是否启用代理池
    pub enabled: bool,
    /// 公共代理列表地址
    pub sources: Vec<String>,
    /// 用于验证代理的回显地址
    pub echo_url: String,
    /// 并发验证数量
    pub verify_concurrency: usize,
    /// 单个代理验证超时（秒）
    pub verify_timeout_secs: u64,
    /// 连续失败多少次后淘汰
    pub max_consecutive_failures: u32,
    /// 健康代理低于该数量时补充
    pub min_healthy: usize,
}

/// 抓取调度配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct FetchSettings {
    /// 最大并发抓取数
    pub concurrency: usize,
    /// 每个URL的最大尝试次数
    pub max_attempts: u32,
    /// 单次请求超时（秒）
    pub timeout_secs: u64,
    /// 页面缓存容量
    pub cache_capacity: usize,
    /// 页面缓存有效期（秒）
    pub cache_ttl_secs: u64,
    /// 整个爬取任务的超时（秒）
    pub crawl_timeout_secs: u64,
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn crawl_timeout(&self) -> Duration {
        Duration::from_secs(self.crawl_timeout_secs)
    }
}

/// 相关性过滤配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct RelevanceSettings {
    /// 准入阈值，置信度必须严格大于该值
    pub threshold: f64,
    /// 参与分类的最大字符数
    pub max_chars: usize,
    /// 摘要长度
    pub summary_chars: usize,
    /// 分类标签
    pub categories: Vec<String>,
}

/// 评分权重配置设置
///
/// 三项都未设置时使用默认权重
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoringSettings {
    pub environmental: Option<f64>,
    pub social: Option<f64>,
    pub governance: Option<f64>,
}

/// LLM配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    /// API 密钥
    pub api_key: Option<String>,
    /// 生成模型
    pub model: String,
    /// 向量模型
    pub embedding_model: String,
    /// OpenAI 兼容接口地址
    pub api_base_url: String,
}

/// 链上与治理数据源配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ChainSettings {
    /// 是否启用基于链上数据的ML评分
    pub ml_enabled: bool,
    /// Infura 密钥
    pub infura_api_key: Option<String>,
    /// Snapshot GraphQL 地址
    pub snapshot_url: String,
    /// Klima 子图地址
    pub klima_subgraph_url: String,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次叠加内置默认值、`config/default`、`config/{APP_ENVIRONMENT}` 与
    /// `ESGCRAWL__` 前缀的环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("ESGCRAWL")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("proxy.sources")
                    .with_list_parse_key("relevance.categories")
                    .try_parsing(true),
            );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// 只带内置默认值的构建器
    pub fn builder() -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
        Config::builder()
            // Anonymity
            .set_default("anonymity.enabled", true)?
            .set_default("anonymity.socks_addr", "127.0.0.1:9050")?
            .set_default("anonymity.control_addr", "127.0.0.1:9051")?
            .set_default("anonymity.control_timeout_secs", 5)?
            .set_default("anonymity.cooldown_secs", 5)?
            .set_default("anonymity.settle_millis", 0)?
            // Proxy pool
            .set_default("proxy.enabled", true)?
            .set_default(
                "proxy.sources",
                vec![
                    "https://raw.githubusercontent.com/TheSpeedX/PROXY-List/master/http.txt",
                    "https://raw.githubusercontent.com/ShiftyTR/Proxy-List/master/http.txt",
                    "https://raw.githubusercontent.com/clarketm/proxy-list/master/proxy-list-raw.txt",
                ],
            )?
            .set_default("proxy.echo_url", "http://httpbin.org/ip")?
            .set_default("proxy.verify_concurrency", 50)?
            .set_default("proxy.verify_timeout_secs", 10)?
            .set_default("proxy.max_consecutive_failures", 3)?
            .set_default("proxy.min_healthy", 5)?
            // Fetch
            .set_default("fetch.concurrency", 8)?
            .set_default("fetch.max_attempts", 3)?
            .set_default("fetch.timeout_secs", 30)?
            .set_default("fetch.cache_capacity", 100)?
            .set_default("fetch.cache_ttl_secs", 3600)?
            .set_default("fetch.crawl_timeout_secs", 120)?
            // Relevance
            .set_default("relevance.threshold", 0.3)?
            .set_default("relevance.max_chars", 512)?
            .set_default("relevance.summary_chars", 200)?
            .set_default(
                "relevance.categories",
                vec![
                    "sustainability",
                    "environmental",
                    "social responsibility",
                    "governance",
                    "blockchain",
                    "crypto",
                ],
            )?
            // LLM
            .set_default("llm.model", "gpt-4o-mini")?
            .set_default("llm.embedding_model", "text-embedding-3-small")?
            .set_default("llm.api_base_url", "https://api.openai.com/v1")?
            // Chain
            .set_default("chain.ml_enabled", false)?
            .set_default("chain.snapshot_url", "https://hub.snapshot.org/graphql")?
            .set_default(
                "chain.klima_subgraph_url",
                "https://api.thegraph.com/subgraphs/name/klimadao/klimadao-staking",
            )
    }

    /// 启动前校验
    ///
    /// 已启用功能缺少凭据、权重之和不为1或数值越界时返回错误
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .llm
            .api_key
            .as_deref()
            .is_none_or(|k| k.trim().is_empty())
        {
            return Err(ConfigError::MissingCredential("llm.api_key".to_string()));
        }

        if self.chain.ml_enabled
            && self
                .chain
                .infura_api_key
                .as_deref()
                .is_none_or(|k| k.trim().is_empty())
        {
            return Err(ConfigError::MissingCredential(
                "chain.infura_api_key".to_string(),
            ));
        }

        if let Some(weights) = self.scoring.weights() {
            let sum: f64 = weights.iter().sum();
            if (sum - 1.0).abs() > 1e-6 {
                return Err(ConfigError::InvalidWeights(sum));
            }
        }

        if !(0.0..=1.0).contains(&self.relevance.threshold) {
            return Err(ConfigError::Invalid(format!(
                "relevance.threshold 必须在 [0, 1] 之间: {}",
                self.relevance.threshold
            )));
        }
        if self.anonymity.control_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "anonymity.control_timeout_secs 不能为0".to_string(),
            ));
        }
        if self.fetch.concurrency == 0 {
            return Err(ConfigError::Invalid("fetch.concurrency 不能为0".to_string()));
        }
        if self.fetch.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "fetch.max_attempts 不能为0".to_string(),
            ));
        }

        Ok(())
    }
}

impl ScoringSettings {
    /// 任意一项被覆盖时返回完整权重（未设置的项按0计）
    pub fn weights(&self) -> Option<[f64; 3]> {
        if self.environmental.is_none() && self.social.is_none() && self.governance.is_none() {
            return None;
        }
        Some([
            self.environmental.unwrap_or(0.0),
            self.social.unwrap_or(0.0),
            self.governance.unwrap_or(0.0),
        ])
    }
}
