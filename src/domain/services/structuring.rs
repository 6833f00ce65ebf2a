// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::models::content::StructuredDocument;
use crate::utils::errors::{OracleError, SchemaError};

/// 送入生成模型的最大字符数
const MAX_INPUT_CHARS: usize = 10_000;

/// 生成式预言机
#[async_trait]
pub trait GenerativeOracle: Send + Sync {
    /// 返回模型生成的文本，预期为JSON，可能带代码块包裹
    async fn generate(&self, prompt: &str) -> Result<String, OracleError>;
}

/// 结构化整理失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StructuringError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("没有可整理的文本")]
    EmptyInput,
}

/// 构造整理提示词
pub fn build_prompt(raw_text: &str) -> String {
    format!(
        "Clean the following web page text and sort its sentences into ESG categories. \
         Return ONLY a JSON object of the form \
         {{\"clean_text\": string, \"environmental\": [string], \"social\": [string], \"governance\": [string]}}. \
         Each array holds sentences from the text that belong to that category; use an empty array when none apply. \
         Text: {}",
        raw_text
    )
}

/// 剥离模型输出外层的代码块标记
///
/// 去掉 ```` ```json ```` 或 ```` ``` ```` 包裹后仍不是对象时，退而取第一个 `{` 到最后一个 `}` 之间的内容
pub fn unwrap_json_payload(raw: &str) -> &str {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```").trim())
        .unwrap_or(trimmed);

    if unfenced.starts_with('{') && unfenced.ends_with('}') {
        return unfenced;
    }
    match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => &unfenced[start..=end],
        _ => unfenced,
    }
}

/// 解析并校验模型输出
pub fn parse_structured(raw: &str) -> Result<StructuredDocument, SchemaError> {
    let payload = unwrap_json_payload(raw);
    let value: Value =
        serde_json::from_str(payload).map_err(|e| SchemaError::NotJson(e.to_string()))?;

    let Value::Object(map) = &value else {
        return Err(SchemaError::InvalidShape("顶层不是对象".to_string()));
    };
    match map.get("clean_text") {
        Some(Value::String(_)) => {}
        Some(_) => return Err(SchemaError::InvalidShape("clean_text 不是字符串".to_string())),
        None => return Err(SchemaError::InvalidShape("缺少 clean_text".to_string())),
    }

    serde_json::from_value(value).map_err(|e| SchemaError::InvalidShape(e.to_string()))
}

/// 结构化整理流程
pub struct StructuringPipeline {
    oracle: Arc<dyn GenerativeOracle>,
}

impl StructuringPipeline {
    pub fn new(oracle: Arc<dyn GenerativeOracle>) -> Self {
        Self { oracle }
    }

    /// 将原始文本整理为按类别划分的文档
    ///
    /// 空文本不调用模型；模型失败或输出无法解析时返回错误，调用方保留原文、不参与评分
    pub async fn structure(&self, raw_text: &str) -> Result<StructuredDocument, StructuringError> {
        let text = raw_text.trim();
        if text.is_empty() {
            return Err(StructuringError::EmptyInput);
        }
        let truncated: String = text.chars().take(MAX_INPUT_CHARS).collect();

        let response = self.oracle.generate(&build_prompt(&truncated)).await?;
        match parse_structured(&response) {
            Ok(doc) => {
                debug!(
                    "Structured document: {} env / {} social / {} gov sentences",
                    doc.environmental.len(),
                    doc.social.len(),
                    doc.governance.len()
                );
                Ok(doc)
            }
            Err(e) => {
                warn!("Discarding unparseable structuring output: {}", e);
                Err(e.into())
            }
        }
    }
}
