// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// ESG类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EsgCategory {
    Environmental,
    Social,
    Governance,
}

impl EsgCategory {
    pub const ALL: [EsgCategory; 3] = [
        EsgCategory::Environmental,
        EsgCategory::Social,
        EsgCategory::Governance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EsgCategory::Environmental => "environmental",
            EsgCategory::Social => "social",
            EsgCategory::Governance => "governance",
        }
    }
}

impl fmt::Display for EsgCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 相关性分类结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub is_relevant: bool,
    /// 仅在相关时给出
    pub category: Option<String>,
    /// 取值范围 [0, 1]
    pub confidence: f64,
    pub summary: String,
}

impl Classification {
    /// 预言机失败或空文本时的结果
    pub fn not_relevant() -> Self {
        Self {
            is_relevant: false,
            category: None,
            confidence: 0.0,
            summary: String::new(),
        }
    }
}

/// 通过相关性过滤的内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredContent {
    /// 对应 `PageResult` 的URL
    pub source_url: String,
    pub category: String,
    pub confidence: f64,
    pub summary: String,
}

/// 按ESG分类整理后的文档
///
/// 缺失或为null的类别字段按空数组处理，数组中的非字符串元素会被丢弃。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredDocument {
    pub clean_text: String,
    #[serde(default, deserialize_with = "lenient_sentences")]
    pub environmental: Vec<String>,
    #[serde(default, deserialize_with = "lenient_sentences")]
    pub social: Vec<String>,
    #[serde(default, deserialize_with = "lenient_sentences")]
    pub governance: Vec<String>,
}

impl StructuredDocument {
    pub fn sentences(&self, category: EsgCategory) -> &[String] {
        match category {
            EsgCategory::Environmental => &self.environmental,
            EsgCategory::Social => &self.social,
            EsgCategory::Governance => &self.governance,
        }
    }

    /// 某一类别的句子以空格连接
    pub fn joined(&self, category: EsgCategory) -> String {
        self.sentences(category).join(" ")
    }
}

fn lenient_sentences<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    // 缺失、null 和单个字符串可以容忍；数字、布尔或对象说明回复结构有误
    match Option::<Value>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s]),
        Some(other) => Err(serde::de::Error::custom(format!(
            "类别应为句子数组，实际为 {}",
            other
        ))),
    }
}
