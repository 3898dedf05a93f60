//! Peer-validator attestation exchange.
//!
//! These records double as the wire format of the gateway's
//! `/api/attestations/bls/request` endpoint.

use async_trait::async_trait;
use crosslink_types::error::AttestationError;
use crosslink_types::Hash32;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A request for a BLS attestation over a closed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationRequest {
    pub batch_id: Uuid,
    pub merkle_root: Hash32,
    pub tx_count: u64,
    pub block_height: u64,
    pub requester_id: String,
    /// Unix seconds; requests past this instant are refused.
    pub expires_at: u64,
}

/// The signature material a peer returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerAttestation {
    /// Compressed G1, 48 bytes.
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
    /// Compressed G2, 96 bytes.
    #[serde(with = "hex::serde")]
    pub public_key: Vec<u8>,
}

/// A peer's answer to an attestation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<PeerAttestation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One member of the attestation cohort.
#[async_trait]
pub trait AttestationPeer: Send + Sync {
    /// The peer's stable validator id.
    fn validator_id(&self) -> &str;

    /// The peer's voting weight.
    fn weight(&self) -> u64;

    /// Requests a signature over the canonical batch message.
    async fn request_attestation(
        &self,
        request: &AttestationRequest,
    ) -> Result<AttestationResponse, AttestationError>;
}
