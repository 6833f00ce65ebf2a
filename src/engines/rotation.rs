// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::models::identity::{AnonymityMode, Egress, Identity, IdentityHealth};
use crate::engines::identity_pool::{IdentityPool, IdentityProbe};
use crate::infrastructure::proxy_source::ProxySource;
use crate::infrastructure::tor_control::ControlChannel;
use crate::utils::errors::RotationError;

/// 轮换配置
#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// 两次轮换之间的最小间隔
    pub cooldown: Duration,
    /// 轮换成功后等待新身份生效的时间
    pub settle: Duration,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(5),
            settle: Duration::ZERO,
        }
    }
}

/// 代理池补充所需的来源和验证器
pub struct Replenisher {
    pub source: Arc<dyn ProxySource>,
    pub probe: Arc<dyn IdentityProbe>,
}

enum Backend {
    Direct,
    Tor { control: Arc<dyn ControlChannel> },
    Proxy {
        pool: Arc<IdentityPool>,
        replenisher: Option<Replenisher>,
    },
}

/// 轮换状态
#[derive(Debug, Clone)]
struct RotationState {
    current: Identity,
    generation: u64,
    last_rotation: Option<Instant>,
}

/// 身份轮换控制器
///
/// 读取当前身份只需一次快照，不会被进行中的轮换阻塞；同一时刻最多只有一次
/// 物理轮换，并发的请求者合并到这一次并拿到同一个新身份。已派发的请求保留
/// 派发时的身份，不受之后轮换的影响。
pub struct RotationController {
    state: RwLock<RotationState>,
    rotating: Mutex<()>,
    backend: Backend,
    config: RotationConfig,
}

impl RotationController {
    fn with_backend(current: Identity, backend: Backend, config: RotationConfig) -> Self {
        Self {
            state: RwLock::new(RotationState {
                generation: current.generation,
                current,
                last_rotation: None,
            }),
            rotating: Mutex::new(()),
            backend,
            config,
        }
    }

    /// Tor模式：出口地址不变，通过控制通道切换线路
    pub fn tor(
        socks_addr: impl Into<String>,
        control: Arc<dyn ControlChannel>,
        config: RotationConfig,
    ) -> Self {
        let mut identity = Identity::new(Egress::tor(socks_addr));
        identity.health = IdentityHealth::Healthy;
        Self::with_backend(identity, Backend::Tor { control }, config)
    }

    /// 代理模式：在代理池的健康身份之间切换
    pub fn proxy(
        pool: Arc<IdentityPool>,
        replenisher: Option<Replenisher>,
        config: RotationConfig,
    ) -> Result<Self, RotationError> {
        let current = pool
            .next_healthy(None)
            .ok_or(RotationError::NoHealthyIdentity)?;
        Ok(Self::with_backend(
            current,
            Backend::Proxy { pool, replenisher },
            config,
        ))
    }

    /// 直连模式：没有可轮换的身份
    pub fn direct() -> Self {
        Self::with_backend(Identity::direct(), Backend::Direct, RotationConfig::default())
    }

    pub fn mode(&self) -> AnonymityMode {
        self.state.read().current.mode()
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// 代理模式下的身份池
    pub fn pool(&self) -> Option<&Arc<IdentityPool>> {
        match &self.backend {
            Backend::Proxy { pool, .. } => Some(pool),
            _ => None,
        }
    }

    /// 获取当前身份的快照
    pub fn acquire_current_identity(&self) -> Identity {
        self.state.read().current.clone()
    }

    /// 检查控制通道是否可用（仅Tor模式）
    pub async fn verify_control(&self) -> Result<(), RotationError> {
        match &self.backend {
            Backend::Tor { control } => control.authenticate().await,
            _ => Ok(()),
        }
    }

    /// 请求轮换
    ///
    /// 等待期间已有其他调用者完成轮换时直接返回那次的结果；
    /// 距上次轮换不足冷却时间时返回 `RotationError::Cooldown`。
    pub async fn request_rotation(&self) -> Result<Identity, RotationError> {
        let observed = self.state.read().generation;
        let _guard = self.rotating.lock().await;

        let current = {
            let state = self.state.read();
            if state.generation != observed {
                debug!("Rotation coalesced into generation {}", state.generation);
                return Ok(state.current.clone());
            }
            if let Some(last) = state.last_rotation {
                let elapsed = last.elapsed();
                if elapsed < self.config.cooldown {
                    return Err(RotationError::Cooldown {
                        remaining: self.config.cooldown - elapsed,
                    });
                }
            }
            state.current.clone()
        };

        let next = match &self.backend {
            Backend::Direct => return Ok(current),
            Backend::Tor { control } => {
                control.signal_new_identity().await?;
                current.egress.clone()
            }
            Backend::Proxy { pool, replenisher } => {
                if pool.needs_replenish() {
                    if let Some(r) = replenisher {
                        pool.replenish(r.source.as_ref(), r.probe.as_ref()).await;
                    }
                }
                pool.next_healthy(Some(&current.egress))
                    .or_else(|| pool.next_healthy(None))
                    .ok_or(RotationError::NoHealthyIdentity)?
                    .egress
            }
        };

        if !self.config.settle.is_zero() {
            tokio::time::sleep(self.config.settle).await;
        }

        let mut state = self.state.write();
        state.generation += 1;
        state.current = Identity {
            egress: next,
            health: IdentityHealth::Healthy,
            generation: state.generation,
        };
        state.last_rotation = Some(Instant::now());
        metrics::counter!("identity_rotations_total").increment(1);
        info!(
            "Rotated identity to {} (generation {})",
            state.current.egress, state.generation
        );
        Ok(state.current.clone())
    }

    /// 记录某个身份的一次成功
    pub fn report_success(&self, identity: &Identity) {
        if let Backend::Proxy { pool, .. } = &self.backend {
            pool.record_success(&identity.egress);
        }
    }

    /// 记录某个身份的一次失败
    ///
    /// 失败只计在该身份上，与此后是否已经轮换无关
    pub fn report_failure(&self, identity: &Identity) {
        if let Backend::Proxy { pool, .. } = &self.backend {
            if pool.record_failure(&identity.egress) {
                warn!("Identity {} is no longer eligible", identity.egress);
            }
        }
    }
}
