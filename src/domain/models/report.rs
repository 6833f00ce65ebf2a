// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::content::{FilteredContent, StructuredDocument};
use super::identity::AnonymityMode;
use super::score::ScoreResult;

/// 失败原因代码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    FetchFailed,
    NotRelevant,
    StructuringFailed,
    Cancelled,
}

/// 单个URL的失败标记
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageFailure {
    pub reason: FailureReason,
    pub message: String,
}

impl PageFailure {
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// 相关页面在报告中的条目
///
/// 结构化失败时保留原始文本，评分为空并附带失败标记。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlOutcome {
    pub url: String,
    pub title: String,
    pub filtered: FilteredContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<StructuredDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<PageFailure>,
}

/// 单页处理的终态
#[derive(Debug, Clone)]
pub enum PageOutcome {
    /// 相关页面，可能已评分
    Admitted(Box<UrlOutcome>),
    /// 被排除，附带原因
    Excluded(PageFailure),
}

/// 爬取统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    pub discovered: usize,
    pub relevant: usize,
    pub scored: usize,
    pub irrelevant: usize,
    pub structuring_failed: usize,
    pub fetch_failed: usize,
    pub cancelled: usize,
}

/// 爬取报告
///
/// `pages` 只包含相关页面，按URL索引；其余URL在 `excluded` 中给出原因代码。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
    pub run_id: Uuid,
    pub base_url: String,
    pub anonymity_mode: AnonymityMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub timed_out: bool,
    pub pages: BTreeMap<String, UrlOutcome>,
    pub excluded: BTreeMap<String, PageFailure>,
    /// 发现的 ipfs:// 与 ar:// 引用，不抓取
    pub decentralized_refs: Vec<String>,
    pub stats: CrawlStats,
}

impl CrawlReport {
    pub fn new(base_url: impl Into<String>, anonymity_mode: AnonymityMode) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            base_url: base_url.into(),
            anonymity_mode,
            started_at: Utc::now(),
            finished_at: None,
            timed_out: false,
            pages: BTreeMap::new(),
            excluded: BTreeMap::new(),
            decentralized_refs: Vec::new(),
            stats: CrawlStats::default(),
        }
    }

    /// 合并单页结果，与完成顺序无关
    pub fn record(&mut self, url: String, outcome: PageOutcome) {
        match outcome {
            PageOutcome::Admitted(entry) => {
                self.stats.relevant += 1;
                if entry.score.is_some() {
                    self.stats.scored += 1;
                } else {
                    self.stats.structuring_failed += 1;
                }
                self.pages.insert(url, *entry);
            }
            PageOutcome::Excluded(failure) => {
                match failure.reason {
                    FailureReason::NotRelevant => self.stats.irrelevant += 1,
                    FailureReason::FetchFailed => self.stats.fetch_failed += 1,
                    FailureReason::Cancelled => self.stats.cancelled += 1,
                    FailureReason::StructuringFailed => self.stats.structuring_failed += 1,
                }
                self.excluded.insert(url, failure);
            }
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admitted(url: &str) -> PageOutcome {
        PageOutcome::Admitted(Box::new(UrlOutcome {
            url: url.to_string(),
            title: String::new(),
            filtered: FilteredContent {
                source_url: url.to_string(),
                category: "governance".into(),
                confidence: 0.5,
                summary: String::new(),
            },
            document: None,
            score: None,
            raw_text: Some("raw".into()),
            failure: Some(PageFailure::new(FailureReason::StructuringFailed, "bad json")),
        }))
    }

    #[test]
    fn test_record_is_order_independent() {
        let mut a = CrawlReport::new("https://x.org", AnonymityMode::Direct);
        let mut b = CrawlReport::new("https://x.org", AnonymityMode::Direct);
        let not_relevant = || {
            PageOutcome::Excluded(PageFailure::new(FailureReason::NotRelevant, "0.10"))
        };

        a.record("https://x.org/a".into(), admitted("https://x.org/a"));
        a.record("https://x.org/b".into(), not_relevant());
        b.record("https://x.org/b".into(), not_relevant());
        b.record("https://x.org/a".into(), admitted("https://x.org/a"));

        assert_eq!(a.pages, b.pages);
        assert_eq!(a.excluded, b.excluded);
        assert_eq!(a.stats, b.stats);
        assert_eq!(a.stats.structuring_failed, 1);
        assert_eq!(a.stats.irrelevant, 1);
    }
}
