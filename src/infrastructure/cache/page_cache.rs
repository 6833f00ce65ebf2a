// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::models::identity::AnonymityMode;
use crate::domain::models::page::PageResult;

/// 缓存键
///
/// 同一URL在不同匿名模式下视为不同的条目
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub url: String,
    pub mode: AnonymityMode,
}

impl CacheKey {
    pub fn new(url: impl Into<String>, mode: AnonymityMode) -> Self {
        Self {
            url: url.into(),
            mode,
        }
    }
}

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub stores: u64,
}

/// 缓存条目
struct CacheEntry {
    page: Arc<PageResult>,
    stored_at: Instant,
}

/// 页面缓存
///
/// 容量有界的LRU，条目超过TTL后视为不存在。只缓存成功的抓取结果。
pub struct PageCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    ttl: Duration,
    stats: Mutex<CacheStats>,
}

impl PageCache {
    /// 创建页面缓存，容量为0时按1处理
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// 查询缓存，过期条目会被移除
    pub fn get(&self, key: &CacheKey) -> Option<Arc<PageResult>> {
        let mut entries = self.entries.lock();
        let fresh = match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() <= self.ttl => Some(entry.page.clone()),
            Some(_) => {
                entries.pop(key);
                self.stats.lock().evictions += 1;
                None
            }
            None => None,
        };
        drop(entries);

        let mut stats = self.stats.lock();
        if fresh.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        fresh
    }

    /// 写入缓存
    pub fn insert(&self, key: CacheKey, page: Arc<PageResult>) {
        let entry = CacheEntry {
            page,
            stored_at: Instant::now(),
        };
        let evicted = self.entries.lock().push(key.clone(), entry);

        let mut stats = self.stats.lock();
        stats.stores += 1;
        // push 对已有键返回旧值，只有键不同才是真正的淘汰
        if matches!(evicted, Some((old_key, _)) if old_key != key) {
            stats.evictions += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }
}
