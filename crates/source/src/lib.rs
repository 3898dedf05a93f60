//! # Crosslink Source
//!
//! The HTTP client for the source ledger: partition chain-entry queries,
//! directory anchor searches, key books, the BFT consensus layer's
//! status/commit endpoints, and the block-by-block intent feed.
//!
//! Transient failures (connect errors, timeouts, 429/5xx) are retried with
//! exponential backoff, honoring `Retry-After` when the ledger sends one.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

/// Wire DTOs for the ledger's query API.
pub mod wire;

use async_trait::async_trait;
use crosslink_api::intent::{DiscoveredIntent, IntentSource};
use crosslink_api::source::{
    AnchorCandidate, ChainEntry, ConsensusCommit, ConsensusStatus, KeyBook, SourceLedger,
};
use crosslink_types::config::SourceChainConfig;
use crosslink_types::error::SourceError;
use crosslink_types::Hash32;
use reqwest::header::{HeaderValue, RETRY_AFTER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

const HTTP_RETRIES: usize = 5;
const BASE_BACKOFF_MS: u64 = 200;

fn retry_delay(attempt: usize, retry_after: Option<&HeaderValue>) -> Duration {
    if let Some(secs) = retry_after
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
    {
        return Duration::from_secs(secs.min(5));
    }
    let ms = BASE_BACKOFF_MS.saturating_mul(1u64 << attempt.min(6)).min(5_000);
    Duration::from_millis(ms)
}

/// JSON-RPC-style envelope the consensus layer wraps results in.
#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct RecordsEnvelope {
    #[serde(default)]
    records: Vec<wire::RecordDto>,
}

/// HTTP client for every source-chain surface.
#[derive(Clone)]
pub struct SourceClient {
    http: reqwest::Client,
    directory_url: String,
    partitions: BTreeMap<String, String>,
    consensus_url: String,
    timeout_secs: u64,
}

impl SourceClient {
    pub fn new(config: &SourceChainConfig) -> Self {
        SourceClient {
            http: reqwest::Client::new(),
            directory_url: config.directory_url.trim_end_matches('/').to_string(),
            partitions: config
                .partitions
                .iter()
                .map(|(k, v)| (k.clone(), v.trim_end_matches('/').to_string()))
                .collect(),
            consensus_url: config.consensus_url.trim_end_matches('/').to_string(),
            timeout_secs: config.query_timeout_secs,
        }
    }

    fn partition_url(&self, partition: &str) -> &str {
        self.partitions
            .get(partition)
            .map(String::as_str)
            .unwrap_or(self.directory_url.as_str())
    }

    /// POSTs a query, retrying transient failures. `Ok(None)` maps a final
    /// 404 — the ledger's way of saying the record does not exist.
    async fn post_query<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<Option<T>, SourceError> {
        let deadline = Duration::from_secs(self.timeout_secs);
        let mut attempt = 0usize;
        loop {
            let send = self.http.post(url).json(body).send();
            let resp = match tokio::time::timeout(deadline, send).await {
                Err(_) => {
                    if attempt < HTTP_RETRIES {
                        sleep(retry_delay(attempt, None)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(SourceError::Timeout(self.timeout_secs));
                }
                Ok(Err(e)) => {
                    if attempt < HTTP_RETRIES {
                        debug!(target: "source", attempt, error = %e, "query send failed; retrying");
                        sleep(retry_delay(attempt, None)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(SourceError::Transport(e.to_string()));
                }
                Ok(Ok(resp)) => resp,
            };

            let status = resp.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if status.as_u16() == 429 || status.is_server_error() {
                if attempt < HTTP_RETRIES {
                    let delay = retry_delay(attempt, resp.headers().get(RETRY_AFTER));
                    debug!(
                        target: "source",
                        status = status.as_u16(),
                        ?delay,
                        "retriable source status"
                    );
                    sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                return Err(SourceError::Status {
                    status: status.as_u16(),
                });
            }
            if !status.is_success() {
                return Err(SourceError::Status {
                    status: status.as_u16(),
                });
            }
            let parsed = resp
                .json::<T>()
                .await
                .map_err(|e| SourceError::Decode(e.to_string()))?;
            return Ok(Some(parsed));
        }
    }

    async fn get_consensus<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let url = format!("{}/{}", self.consensus_url, path);
        let deadline = Duration::from_secs(self.timeout_secs);
        let mut attempt = 0usize;
        loop {
            let send = self.http.get(&url).query(query).send();
            let resp = match tokio::time::timeout(deadline, send).await {
                Err(_) => {
                    if attempt < HTTP_RETRIES {
                        sleep(retry_delay(attempt, None)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(SourceError::Timeout(self.timeout_secs));
                }
                Ok(Err(e)) => {
                    if attempt < HTTP_RETRIES {
                        sleep(retry_delay(attempt, None)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(SourceError::Transport(e.to_string()));
                }
                Ok(Ok(resp)) => resp,
            };

            let status = resp.status();
            if status.as_u16() == 429 || status.is_server_error() {
                if attempt < HTTP_RETRIES {
                    let delay = retry_delay(attempt, resp.headers().get(RETRY_AFTER));
                    sleep(delay).await;
                    attempt += 1;
                    continue;
                }
            }
            if !status.is_success() {
                return Err(SourceError::Status {
                    status: status.as_u16(),
                });
            }
            let envelope = resp
                .json::<RpcEnvelope<T>>()
                .await
                .map_err(|e| SourceError::Decode(e.to_string()))?;
            return Ok(envelope.result);
        }
    }
}

#[async_trait]
impl SourceLedger for SourceClient {
    async fn chain_entry(
        &self,
        partition: &str,
        account: &str,
        tx_hash: &Hash32,
        include_receipt: bool,
    ) -> Result<Option<ChainEntry>, SourceError> {
        let url = format!("{}/query", self.partition_url(partition));
        let body = json!({
            "scope": account,
            "query": {
                "queryType": "chainEntry",
                "entry": tx_hash.to_hex(),
                "includeReceipt": include_receipt,
            }
        });
        let Some(record) = self.post_query::<_, wire::RecordDto>(&url, &body).await? else {
            return Ok(None);
        };
        record.into_chain_entry().map(Some)
    }

    async fn anchor_search(
        &self,
        target_anchor: &Hash32,
        include_receipt: bool,
        for_any: bool,
    ) -> Result<Vec<AnchorCandidate>, SourceError> {
        let url = format!("{}/query", self.directory_url);
        let body = json!({
            "scope": "acc://dn.acme/anchors",
            "query": {
                "queryType": "anchorSearch",
                "anchor": target_anchor.to_hex(),
                "includeReceipt": include_receipt,
                "forAny": for_any,
            }
        });
        let envelope = self
            .post_query::<_, RecordsEnvelope>(&url, &body)
            .await?
            .unwrap_or(RecordsEnvelope { records: vec![] });
        envelope
            .records
            .into_iter()
            .map(|r| r.into_anchor_candidate())
            .collect()
    }

    async fn consensus_status(&self) -> Result<ConsensusStatus, SourceError> {
        let status: wire::StatusDto = self.get_consensus("status", &[]).await?;
        Ok(ConsensusStatus {
            latest_height: status.latest_height()?,
            latest_app_hash: status.latest_app_hash()?,
            catching_up: status.sync_info.catching_up,
        })
    }

    async fn consensus_commit(&self, height: u64) -> Result<ConsensusCommit, SourceError> {
        let commit: wire::CommitDto = self
            .get_consensus("commit", &[("height", height.to_string())])
            .await?;
        Ok(ConsensusCommit {
            height: commit.height()?,
            app_hash: commit.app_hash()?,
        })
    }

    async fn key_book(&self, account: &str) -> Result<Option<KeyBook>, SourceError> {
        let url = format!("{}/query", self.directory_url);
        let body = json!({
            "scope": account,
            "query": { "queryType": "keyBook" }
        });
        let Some(record) = self.post_query::<_, wire::RecordDto>(&url, &body).await? else {
            return Ok(None);
        };
        record.into_key_book().map(Some)
    }
}

fn parse_address(s: &str) -> Result<[u8; 20], SourceError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    if trimmed.len() != 40 {
        return Err(SourceError::Decode(format!(
            "target address must be 20 bytes of hex, got {} chars",
            trimmed.len()
        )));
    }
    let mut out = [0u8; 20];
    hex::decode_to_slice(trimmed, &mut out)
        .map_err(|e| SourceError::Decode(format!("target address: {}", e)))?;
    Ok(out)
}

fn intent_from_dto(dto: wire::IntentDto, height: u64) -> Result<DiscoveredIntent, SourceError> {
    Ok(DiscoveredIntent {
        intent_id: dto.intent_id,
        account: dto.account,
        tx_hash: Hash32::from_hex(&dto.tx_hash)
            .map_err(|e| SourceError::BadHash(format!("intent tx: {}", e)))?,
        bvn: dto.bvn,
        source_block_height: height,
        governance_class: dto.governance_class,
        target_address: parse_address(&dto.target_address)?,
        value: dto.value,
        calldata: hex::decode(dto.calldata.strip_prefix("0x").unwrap_or(&dto.calldata))
            .map_err(|e| SourceError::Decode(format!("intent calldata: {}", e)))?,
        urgent: dto.urgent,
    })
}

#[async_trait]
impl IntentSource for SourceClient {
    async fn latest_height(&self) -> Result<u64, SourceError> {
        self.consensus_status().await.map(|s| s.latest_height)
    }

    async fn intents_in_block(&self, height: u64) -> Result<Vec<DiscoveredIntent>, SourceError> {
        let url = format!("{}/block-intents", self.directory_url);
        let body = json!({ "height": height });
        let Some(block) = self
            .post_query::<_, wire::BlockIntentsDto>(&url, &body)
            .await?
        else {
            return Ok(Vec::new());
        };
        block
            .intents
            .into_iter()
            .map(|dto| intent_from_dto(dto, height))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parsing_is_strict() {
        assert!(parse_address("0x0000000000000000000000000000000000000001").is_ok());
        assert!(parse_address("0001").is_err());
        assert!(parse_address(&"zz".repeat(20)).is_err());
    }

    #[test]
    fn retry_delay_honors_retry_after() {
        let h = HeaderValue::from_static("3");
        assert_eq!(retry_delay(0, Some(&h)), Duration::from_secs(3));
        // Capped at five seconds.
        let h = HeaderValue::from_static("120");
        assert_eq!(retry_delay(0, Some(&h)), Duration::from_secs(5));
    }

    #[test]
    fn retry_delay_backs_off_exponentially() {
        assert_eq!(retry_delay(0, None), Duration::from_millis(200));
        assert_eq!(retry_delay(1, None), Duration::from_millis(400));
        assert_eq!(retry_delay(10, None), Duration::from_millis(5_000));
    }
}
