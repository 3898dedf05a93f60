//! HTTP attestation peers.
//!
//! Each peer validator exposes a single request endpoint; the client posts
//! the canonical request record and reads back the signature material.

use async_trait::async_trait;
use crosslink_api::peers::{AttestationPeer, AttestationRequest, AttestationResponse};
use crosslink_types::config::PeerConfig;
use crosslink_types::error::AttestationError;
use std::time::Duration;

const REQUEST_PATH: &str = "/api/attestations/bls/request";

/// A peer reached over HTTP.
pub struct HttpPeer {
    validator_id: String,
    endpoint: String,
    weight: u64,
    client: reqwest::Client,
}

impl HttpPeer {
    pub fn new(config: &PeerConfig, timeout: Duration) -> Self {
        HttpPeer {
            validator_id: config.validator_id.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            weight: config.weight,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl AttestationPeer for HttpPeer {
    fn validator_id(&self) -> &str {
        &self.validator_id
    }

    fn weight(&self) -> u64 {
        self.weight
    }

    async fn request_attestation(
        &self,
        request: &AttestationRequest,
    ) -> Result<AttestationResponse, AttestationError> {
        let url = format!("{}{}", self.endpoint, REQUEST_PATH);
        let resp = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| AttestationError::PeerUnreachable {
                validator_id: self.validator_id.clone(),
                reason: e.to_string(),
            })?;
        if !resp.status().is_success() {
            return Err(AttestationError::PeerUnreachable {
                validator_id: self.validator_id.clone(),
                reason: format!("HTTP {}", resp.status().as_u16()),
            });
        }
        resp.json::<AttestationResponse>()
            .await
            .map_err(|e| AttestationError::PeerUnreachable {
                validator_id: self.validator_id.clone(),
                reason: format!("decode: {}", e),
            })
    }
}
