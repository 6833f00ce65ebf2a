// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::BTreeSet;
use url::Url;

use crate::domain::models::page::PageLink;
use crate::utils::url_utils::{is_http, normalize_parsed, normalize_url};

/// 默认的链接关键词
pub const DEFAULT_LINK_KEYWORDS: &[&str] = &[
    "about",
    "sustainability",
    "sustainable",
    "governance",
    "esg",
    "social",
    "environment",
    "responsibility",
    "blockchain",
    "crypto",
];

const DECENTRALIZED_SCHEMES: &[&str] = &["ipfs://", "ar://"];

/// 链接发现结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredLinks {
    /// 待抓取的候选页面，已规范化、去重并排序
    pub candidates: Vec<String>,
    /// 去中心化存储引用（只记录，不抓取）
    pub decentralized_refs: Vec<String>,
}

/// 链接发现器
///
/// 只跟随href或锚文本中带有关键词的链接
pub struct LinkDiscoverer {
    keywords: Vec<String>,
}

impl Default for LinkDiscoverer {
    fn default() -> Self {
        Self::new(DEFAULT_LINK_KEYWORDS.iter().map(|k| k.to_string()))
    }
}

impl LinkDiscoverer {
    pub fn new(keywords: impl IntoIterator<Item = String>) -> Self {
        Self {
            keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    fn matches(&self, link: &PageLink) -> bool {
        let href = link.href.to_lowercase();
        let text = link.text.to_lowercase();
        self.keywords
            .iter()
            .any(|k| href.contains(k.as_str()) || text.contains(k.as_str()))
    }

    /// 从页面链接中找出候选子页面
    ///
    /// # 参数
    ///
    /// * `base_url` - 页面地址，用于解析相对链接，自身不会出现在结果中
    /// * `links` - 页面中的链接
    pub fn discover(&self, base_url: &Url, links: &[PageLink]) -> DiscoveredLinks {
        let base_key = normalize_url(base_url.as_str()).ok();
        let mut candidates = BTreeSet::new();
        let mut decentralized = BTreeSet::new();

        for link in links {
            let href = link.href.trim();
            let lower = href.to_lowercase();

            // Ignore fragment identifiers, mailto, javascript and tel links
            if href.is_empty()
                || href.starts_with('#')
                || lower.starts_with("mailto:")
                || lower.starts_with("javascript:")
                || lower.starts_with("tel:")
            {
                continue;
            }

            if DECENTRALIZED_SCHEMES.iter().any(|s| lower.starts_with(s)) {
                decentralized.insert(href.to_string());
                continue;
            }

            if !self.matches(link) {
                continue;
            }

            let Ok(mut url) = base_url.join(href) else {
                continue;
            };
            if !is_http(&url) {
                continue;
            }
            let normalized = normalize_parsed(&mut url);
            if base_key.as_deref() == Some(normalized.as_str()) {
                continue;
            }
            candidates.insert(normalized);
        }

        DiscoveredLinks {
            candidates: candidates.into_iter().collect(),
            decentralized_refs: decentralized.into_iter().collect(),
        }
    }
}
