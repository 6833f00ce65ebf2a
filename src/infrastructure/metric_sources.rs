// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 外部指标数据源：以太坊JSON-RPC、Snapshot GraphQL与KlimaDAO子图

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::domain::services::ml_scorer::{
    CarbonMetrics, CarbonOffsetOracle, ChainGasOracle, DaoGovernanceOracle, DaoMetrics,
    EnergyMetrics, ProposalSample,
};
use crate::utils::errors::OracleError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const SNAPSHOT_QUERY: &str = "{ proposals(first: 100, orderBy: \"created\", orderDirection: desc) { id votes quorum state } }";

const KLIMA_QUERY: &str = "{ klimaStakings(first: 1, orderBy: timestamp, orderDirection: desc) { carbonLocked rebaseRate } }";

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// 发送JSON请求，非2xx状态视为错误
async fn post_json(client: &reqwest::Client, url: &str, body: &Value) -> Result<Value, OracleError> {
    let response = client.post(url).json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(OracleError::Http(format!("{} returned {}", url, status)));
    }
    Ok(response.json().await?)
}

/// 数值字段可能是数字或字符串
fn lenient_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_hex_u64(raw: &str) -> Option<u64> {
    let digits = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X"))?;
    u64::from_str_radix(digits, 16).ok()
}

/// 通过JSON-RPC读取L1与L2最新区块的gas用量
pub struct ChainGasSource {
    client: reqwest::Client,
    l1_url: String,
    l2_url: String,
}

impl ChainGasSource {
    pub fn new(l1_url: impl Into<String>, l2_url: impl Into<String>) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            l1_url: l1_url.into(),
            l2_url: l2_url.into(),
        }
    }

    /// 使用Infura的以太坊主网与Optimism主网节点
    pub fn from_infura_key(api_key: &str) -> Self {
        Self::new(
            format!("https://mainnet.infura.io/v3/{}", api_key),
            format!("https://optimism-mainnet.infura.io/v3/{}", api_key),
        )
    }

    async fn latest_gas_used(&self, url: &str) -> Result<u64, OracleError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "eth_getBlockByNumber",
            "params": ["latest", false],
            "id": 1
        });
        let response = post_json(&self.client, url, &body).await?;

        if let Some(error) = response.get("error") {
            return Err(OracleError::Http(format!("JSON-RPC error: {}", error)));
        }
        response["result"]["gasUsed"]
            .as_str()
            .and_then(parse_hex_u64)
            .ok_or_else(|| OracleError::InvalidResponse("缺少 result.gasUsed".to_string()))
    }
}

#[async_trait]
impl ChainGasOracle for ChainGasSource {
    async fn energy_metrics(&self) -> Result<EnergyMetrics, OracleError> {
        let (l1, l2) = tokio::try_join!(
            self.latest_gas_used(&self.l1_url),
            self.latest_gas_used(&self.l2_url)
        )?;
        debug!("Latest gas used: L1={} L2={}", l1, l2);
        Ok(EnergyMetrics::from_gas(l1, l2))
    }
}

/// Snapshot 提案数据
pub struct SnapshotDaoSource {
    client: reqwest::Client,
    url: String,
}

impl SnapshotDaoSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            url: url.into(),
        }
    }
}

fn parse_proposal(value: &Value) -> ProposalSample {
    let executed = value["executed"].as_bool().unwrap_or_else(|| {
        value["state"]
            .as_str()
            .is_some_and(|s| s.eq_ignore_ascii_case("executed"))
    });
    ProposalSample {
        votes: lenient_number(&value["votes"]).unwrap_or(0.0),
        quorum: lenient_number(&value["quorum"]).unwrap_or(0.0),
        executed,
    }
}

#[async_trait]
impl DaoGovernanceOracle for SnapshotDaoSource {
    async fn dao_metrics(&self) -> Result<DaoMetrics, OracleError> {
        let response = post_json(&self.client, &self.url, &json!({ "query": SNAPSHOT_QUERY })).await?;
        let proposals = response["data"]["proposals"]
            .as_array()
            .ok_or_else(|| OracleError::InvalidResponse("缺少 data.proposals".to_string()))?;

        let samples: Vec<ProposalSample> = proposals.iter().map(parse_proposal).collect();
        Ok(DaoMetrics::from_proposals(&samples))
    }
}

/// KlimaDAO 质押子图
pub struct KlimaCarbonSource {
    client: reqwest::Client,
    url: String,
}

impl KlimaCarbonSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            url: url.into(),
        }
    }
}

#[async_trait]
impl CarbonOffsetOracle for KlimaCarbonSource {
    async fn carbon_metrics(&self) -> Result<CarbonMetrics, OracleError> {
        let response = post_json(&self.client, &self.url, &json!({ "query": KLIMA_QUERY })).await?;
        let Some(latest) = response["data"]["klimaStakings"].as_array().and_then(|a| a.first()) else {
            return Err(OracleError::InvalidResponse("缺少 data.klimaStakings".to_string()));
        };

        Ok(CarbonMetrics {
            carbon_locked: lenient_number(&latest["carbonLocked"]).unwrap_or(0.0),
            offset_rate: lenient_number(&latest["rebaseRate"]).unwrap_or(0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_chain_gas_reads_both_layers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/l1"))
            .and(body_partial_json(json!({ "method": "eth_getBlockByNumber" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": { "gasUsed": "0x989680" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/l2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": { "gasUsed": "0x2625a0" }
            })))
            .mount(&server)
            .await;

        let source = ChainGasSource::new(
            format!("{}/l1", server.uri()),
            format!("{}/l2", server.uri()),
        );
        let energy = source.energy_metrics().await.unwrap();
        assert_eq!(energy, EnergyMetrics::from_gas(10_000_000, 2_500_000));
        assert!((energy.l2_efficiency - 0.75).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_chain_gas_rpc_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "error": { "code": -32000, "message": "rate limited" }
            })))
            .mount(&server)
            .await;

        let source = ChainGasSource::new(server.uri(), server.uri());
        assert!(matches!(
            source.energy_metrics().await,
            Err(OracleError::Http(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_proposals() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "proposals": [
                    { "id": "a", "votes": 30, "quorum": 100, "state": "closed", "executed": true },
                    { "id": "b", "votes": 50, "quorum": "100", "state": "closed" },
                ] }
            })))
            .mount(&server)
            .await;

        let metrics = SnapshotDaoSource::new(server.uri()).dao_metrics().await.unwrap();
        assert_eq!(metrics.proposal_count, 2);
        assert_eq!(metrics.execution_rate, 0.5);
        assert!((metrics.participation_rate - 0.4).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_klima_accepts_string_numbers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "klimaStakings": [ { "carbonLocked": "1234.5", "rebaseRate": 0.004 } ] }
            })))
            .mount(&server)
            .await;

        let metrics = KlimaCarbonSource::new(server.uri()).carbon_metrics().await.unwrap();
        assert_eq!(metrics.carbon_locked, 1234.5);
        assert_eq!(metrics.offset_rate, 0.004);
    }

    #[tokio::test]
    async fn test_error_status_and_empty_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/empty"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "klimaStakings": [] }
            })))
            .mount(&server)
            .await;

        let down = KlimaCarbonSource::new(format!("{}/down", server.uri()));
        assert!(matches!(down.carbon_metrics().await, Err(OracleError::Http(_))));

        let empty = KlimaCarbonSource::new(format!("{}/empty", server.uri()));
        assert!(matches!(
            empty.carbon_metrics().await,
            Err(OracleError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex_u64("0x10"), Some(16));
        assert_eq!(parse_hex_u64("10"), None);
        assert_eq!(parse_hex_u64("0xzz"), None);
    }
}
