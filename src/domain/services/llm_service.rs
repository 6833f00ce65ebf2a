// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::settings::LlmSettings;
use crate::domain::services::relevance_filter::EmbeddingOracle;
use crate::domain::services::structuring::GenerativeOracle;
use crate::utils::errors::OracleError;

const SYSTEM_PROMPT: &str =
    "You are a helpful data extraction assistant. You output only valid JSON.";

/// LLM服务 - 处理与LLM提供商的交互
///
/// # 功能
///
/// 兼容OpenAI接口：`/chat/completions` 用于结构化整理，`/embeddings` 用于相关性判断
pub struct LLMService {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    embedding_model: String,
    api_base_url: String,
}

impl LLMService {
    pub fn new_with_config(
        api_key: Option<String>,
        model: String,
        embedding_model: String,
        api_base_url: String,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            model,
            embedding_model,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self::new_with_config(
            settings.api_key.clone(),
            settings.model.clone(),
            settings.embedding_model.clone(),
            settings.api_base_url.clone(),
        )
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow::Error::new(OracleError::NotConfigured("llm.api_key".to_string())))?;

        let url = format!("{}{}", self.api_base_url, path);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(body)
            .send()
            .await
            .context("Failed to send request to LLM API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::Error::new(OracleError::Http(format!(
                "{} - {}",
                status, error_text
            ))));
        }

        response
            .json()
            .await
            .context("Failed to parse LLM API response")
    }
}

/// 将内部错误还原为预言机错误
fn to_oracle_error(e: anyhow::Error) -> OracleError {
    if let Some(oracle) = e.downcast_ref::<OracleError>() {
        return oracle.clone();
    }
    if let Some(req) = e.downcast_ref::<reqwest::Error>() {
        if req.is_timeout() || req.is_connect() {
            return OracleError::Unavailable(format!("{:#}", e));
        }
        if req.is_decode() {
            return OracleError::InvalidResponse(format!("{:#}", e));
        }
    }
    OracleError::Http(format!("{:#}", e))
}

#[async_trait]
impl GenerativeOracle for LLMService {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        let request_body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.0
        });

        let body = self
            .post("/chat/completions", &request_body)
            .await
            .map_err(to_oracle_error)?;

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| OracleError::InvalidResponse("缺少 choices[0].message.content".to_string()))
    }
}

#[async_trait]
impl EmbeddingOracle for LLMService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, OracleError> {
        let request_body = json!({
            "model": self.embedding_model,
            "input": text,
        });

        let body = self
            .post("/embeddings", &request_body)
            .await
            .map_err(to_oracle_error)?;

        let values = body["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| OracleError::InvalidResponse("缺少 data[0].embedding".to_string()))?;

        values
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| OracleError::InvalidResponse("向量中包含非数值元素".to_string()))
            })
            .collect()
    }
}
