// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 匿名模式
///
/// 也是页面缓存键的一部分，不同模式下抓取到的结果互不共享。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnonymityMode {
    /// 直连
    Direct,
    /// HTTP代理
    Proxy,
    /// Tor匿名网络
    Tor,
}

/// 身份健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityHealth {
    /// 未验证
    Unverified,
    /// 健康
    Healthy,
    /// 已失效，不再分配
    Failed,
}

/// 出口描述
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Egress {
    /// 不经过任何代理
    Direct,
    /// `host:port` 形式的HTTP代理
    Proxy { address: String },
    /// Tor SOCKS入口，线路由控制端口切换
    Tor { socks_addr: String },
}

impl Egress {
    pub fn proxy(address: impl Into<String>) -> Self {
        Egress::Proxy {
            address: address.into(),
        }
    }

    pub fn tor(socks_addr: impl Into<String>) -> Self {
        Egress::Tor {
            socks_addr: socks_addr.into(),
        }
    }

    pub fn mode(&self) -> AnonymityMode {
        match self {
            Egress::Direct => AnonymityMode::Direct,
            Egress::Proxy { .. } => AnonymityMode::Proxy,
            Egress::Tor { .. } => AnonymityMode::Tor,
        }
    }

    /// 供HTTP客户端使用的代理URL
    ///
    /// Tor使用 `socks5h`，让DNS解析也走匿名网络。
    pub fn proxy_url(&self) -> Option<String> {
        match self {
            Egress::Direct => None,
            Egress::Proxy { address } => Some(format!("http://{}", address)),
            Egress::Tor { socks_addr } => Some(format!("socks5h://{}", socks_addr)),
        }
    }
}

impl fmt::Display for Egress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Egress::Direct => write!(f, "direct"),
            Egress::Proxy { address } => write!(f, "proxy:{}", address),
            Egress::Tor { socks_addr } => write!(f, "tor:{}", socks_addr),
        }
    }
}

/// 出口身份
///
/// `generation` 由轮换控制器在激活时赋值。Tor线路切换后出口地址不变，
/// 只能通过代次区分前后两个身份。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub egress: Egress,
    pub health: IdentityHealth,
    pub generation: u64,
}

impl Identity {
    pub fn new(egress: Egress) -> Self {
        Self {
            egress,
            health: IdentityHealth::Unverified,
            generation: 0,
        }
    }

    pub fn direct() -> Self {
        Self {
            egress: Egress::Direct,
            health: IdentityHealth::Healthy,
            generation: 0,
        }
    }

    pub fn mode(&self) -> AnonymityMode {
        self.egress.mode()
    }

    /// 是否经过匿名网络
    pub fn is_anonymized(&self) -> bool {
        self.mode() == AnonymityMode::Tor
    }
}
