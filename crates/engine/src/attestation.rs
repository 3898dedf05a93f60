//! Weighted-threshold BLS attestation collection.
//!
//! Requests signatures over the canonical batch message from the configured
//! cohort, tracks weighted voting power, and aggregates once at least
//! `⌈2N/3⌉` of total weight has signed. A round that times out below
//! threshold fails the batch.

use crate::commitments::attestation_message;
use crosslink_api::peers::{AttestationPeer, AttestationRequest};
use crosslink_crypto::bls::{
    aggregate_public_keys, aggregate_signatures, validate_public_key_subgroup,
    validate_signature_subgroup, PublicKey, Signature,
};
use crosslink_crypto::{DomainTag, KeyManager};
use crosslink_types::batch::{attestation_threshold, AttestationBundle, Batch};
use crosslink_types::error::AttestationError;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Collects attestations for closed batches.
pub struct AttestationCollector {
    key_manager: Arc<KeyManager>,
    validator_id: String,
    /// This validator's own voting weight.
    own_weight: u64,
    peers: Vec<Arc<dyn AttestationPeer>>,
    peer_timeout: Duration,
    round_timeout: Duration,
}

impl AttestationCollector {
    pub fn new(
        key_manager: Arc<KeyManager>,
        validator_id: String,
        own_weight: u64,
        peers: Vec<Arc<dyn AttestationPeer>>,
        peer_timeout: Duration,
        round_timeout: Duration,
    ) -> Self {
        AttestationCollector {
            key_manager,
            validator_id,
            own_weight,
            peers,
            peer_timeout,
            round_timeout,
        }
    }

    /// Total voting power across the cohort, this validator included.
    pub fn total_power(&self) -> u64 {
        self.own_weight + self.peers.iter().map(|p| p.weight()).sum::<u64>()
    }

    /// Runs one attestation round for a closed batch.
    pub async fn collect(
        &self,
        batch: &Batch,
        block_height: u64,
    ) -> Result<AttestationBundle, AttestationError> {
        let merkle_root = batch.merkle_root.ok_or_else(|| {
            AttestationError::InvalidAttestation {
                validator_id: self.validator_id.clone(),
                reason: "batch has no merkle root".into(),
            }
        })?;
        let tx_count = batch.txs.len() as u64;
        let message = attestation_message(&batch.batch_id, &merkle_root, tx_count, block_height);

        let total = self.total_power();
        let required = attestation_threshold(total);

        // Sign locally first; our own vote always counts.
        let own_sig = self
            .key_manager
            .sign_with_domain(DomainTag::Attestation, message.as_bytes())?;
        let own_pk = *self.key_manager.public_key();

        let mut signatures: Vec<Signature> = vec![own_sig];
        let mut keys: Vec<PublicKey> = vec![own_pk];
        let mut signers: Vec<String> = vec![self.validator_id.clone()];
        let mut signed_power = self.own_weight;

        let expires_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
            + self.round_timeout.as_secs();
        let request = AttestationRequest {
            batch_id: batch.batch_id,
            merkle_root,
            tx_count,
            block_height,
            requester_id: self.validator_id.clone(),
            expires_at,
        };

        let mut in_flight: FuturesUnordered<_> = self
            .peers
            .iter()
            .map(|peer| {
                let peer = Arc::clone(peer);
                let request = request.clone();
                let timeout = self.peer_timeout;
                async move {
                    let id = peer.validator_id().to_string();
                    let weight = peer.weight();
                    let result =
                        tokio::time::timeout(timeout, peer.request_attestation(&request)).await;
                    (id, weight, result)
                }
            })
            .collect();

        let round_deadline = tokio::time::sleep(self.round_timeout);
        tokio::pin!(round_deadline);

        while signed_power < required {
            let (peer_id, weight, result) = tokio::select! {
                _ = &mut round_deadline => break,
                next = in_flight.next() => match next {
                    Some(item) => item,
                    None => break,
                },
            };

            let response = match result {
                Err(_) => {
                    warn!(target: "attestation", peer = %peer_id, "peer request timed out");
                    continue;
                }
                Ok(Err(e)) => {
                    warn!(target: "attestation", peer = %peer_id, error = %e, "peer request failed");
                    continue;
                }
                Ok(Ok(r)) => r,
            };
            if !response.success {
                debug!(
                    target: "attestation",
                    peer = %peer_id,
                    error = response.error.as_deref().unwrap_or("unspecified"),
                    "peer declined"
                );
                continue;
            }
            let Some(material) = response.attestation else {
                warn!(target: "attestation", peer = %peer_id, "success response without material");
                continue;
            };

            // Subgroup-check before the point ever participates in an
            // aggregate.
            if let Err(e) = validate_public_key_subgroup(&material.public_key) {
                warn!(target: "attestation", peer = %peer_id, error = %e, "bad public key");
                continue;
            }
            if let Err(e) = validate_signature_subgroup(&material.signature) {
                warn!(target: "attestation", peer = %peer_id, error = %e, "bad signature");
                continue;
            }
            let (Ok(pk), Ok(sig)) = (
                PublicKey::from_bytes(&material.public_key),
                Signature::from_bytes(&material.signature),
            ) else {
                continue;
            };
            if !pk.verify_with_domain(DomainTag::Attestation, &sig, message.as_bytes()) {
                warn!(target: "attestation", peer = %peer_id, "signature does not verify");
                continue;
            }

            signatures.push(sig);
            keys.push(pk);
            signers.push(peer_id);
            signed_power += weight;
        }

        if signed_power < required {
            crosslink_telemetry::cycle_metrics().inc_attestation_rounds("below_threshold");
            info!(
                target: "attestation",
                batch = %batch.batch_id,
                signed_power,
                required,
                "round ended below threshold"
            );
            return Err(AttestationError::ThresholdNotMet {
                signed: signed_power,
                total,
                required,
            });
        }

        let aggregate_signature = aggregate_signatures(&signatures)?;
        let aggregate_public_key = aggregate_public_keys(&keys)?;
        crosslink_telemetry::cycle_metrics().inc_attestation_rounds("threshold_met");
        info!(
            target: "attestation",
            batch = %batch.batch_id,
            signed_power,
            required,
            signers = signers.len(),
            "threshold met"
        );
        Ok(AttestationBundle {
            batch_id: batch.batch_id,
            merkle_root,
            aggregate_signature: aggregate_signature.to_bytes().to_vec(),
            aggregate_public_key: aggregate_public_key.to_bytes().to_vec(),
            message_hash: message,
            total_voting_power: total,
            signed_voting_power: signed_power,
            threshold_met: true,
            signers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crosslink_api::peers::{AttestationResponse, PeerAttestation};
    use crosslink_crypto::bls::{keypair_from_seed, verify_aggregate_with_domain};
    use crosslink_types::batch::{Batch, BatchMode, BatchState, TxRef};
    use crosslink_types::Hash32;
    use uuid::Uuid;

    struct SigningPeer {
        id: String,
        weight: u64,
        seed: [u8; 32],
        respond: bool,
    }

    #[async_trait]
    impl AttestationPeer for SigningPeer {
        fn validator_id(&self) -> &str {
            &self.id
        }
        fn weight(&self) -> u64 {
            self.weight
        }
        async fn request_attestation(
            &self,
            request: &AttestationRequest,
        ) -> Result<AttestationResponse, AttestationError> {
            if !self.respond {
                return Ok(AttestationResponse {
                    success: false,
                    attestation: None,
                    error: Some("offline".into()),
                });
            }
            let (sk, pk) = keypair_from_seed(&self.seed).unwrap();
            let message = attestation_message(
                &request.batch_id,
                &request.merkle_root,
                request.tx_count,
                request.block_height,
            );
            let sig = sk
                .sign_with_domain(DomainTag::Attestation, message.as_bytes())
                .unwrap();
            Ok(AttestationResponse {
                success: true,
                attestation: Some(PeerAttestation {
                    signature: sig.to_bytes().to_vec(),
                    public_key: pk.to_bytes().to_vec(),
                }),
                error: None,
            })
        }
    }

    fn closed_batch() -> Batch {
        Batch {
            batch_id: Uuid::new_v4(),
            mode: BatchMode::OnCadence,
            txs: vec![TxRef {
                tx_hash: Hash32([1u8; 32]),
                account_url: "acc://a.acme".into(),
                leaf_index: 0,
                merkle_path: vec![],
                proof_class: BatchMode::OnCadence,
            }],
            started_at: 0,
            closed_at: Some(1),
            merkle_root: Some(Hash32([9u8; 32])),
            state: BatchState::Closed,
        }
    }

    fn collector(
        peers: Vec<Arc<dyn AttestationPeer>>,
        own_weight: u64,
    ) -> (AttestationCollector, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let km = Arc::new(KeyManager::load_or_generate(dir.path()).unwrap());
        let collector = AttestationCollector::new(
            km,
            "validator-1".into(),
            own_weight,
            peers,
            Duration::from_secs(5),
            Duration::from_secs(5),
        );
        (collector, dir)
    }

    fn seed(last: u8) -> [u8; 32] {
        let mut s = [0u8; 32];
        s[31] = last;
        s
    }

    // Weights 20,20,20,10,10,10,10 with self at 20: collecting the three
    // other 20s reaches 60 < 67; one more 10 crosses the threshold.
    #[tokio::test]
    async fn weighted_threshold_crossing() {
        let peers: Vec<Arc<dyn AttestationPeer>> = vec![
            Arc::new(SigningPeer { id: "v2".into(), weight: 20, seed: seed(2), respond: true }),
            Arc::new(SigningPeer { id: "v3".into(), weight: 20, seed: seed(3), respond: true }),
            Arc::new(SigningPeer { id: "v4".into(), weight: 10, seed: seed(4), respond: true }),
            Arc::new(SigningPeer { id: "v5".into(), weight: 10, seed: seed(5), respond: false }),
            Arc::new(SigningPeer { id: "v6".into(), weight: 10, seed: seed(6), respond: false }),
            Arc::new(SigningPeer { id: "v7".into(), weight: 10, seed: seed(7), respond: false }),
        ];
        let (c, _keys) = collector(peers, 20);
        assert_eq!(c.total_power(), 100);

        let bundle = c.collect(&closed_batch(), 77).await.unwrap();
        assert!(bundle.threshold_met);
        assert!(bundle.signed_voting_power >= 67);
        assert_eq!(bundle.total_voting_power, 100);
    }

    #[tokio::test]
    async fn below_threshold_fails() {
        // Only self (20) and one 20 respond: 40 < 67.
        let peers: Vec<Arc<dyn AttestationPeer>> = vec![
            Arc::new(SigningPeer { id: "v2".into(), weight: 20, seed: seed(2), respond: true }),
            Arc::new(SigningPeer { id: "v3".into(), weight: 20, seed: seed(3), respond: false }),
            Arc::new(SigningPeer { id: "v4".into(), weight: 10, seed: seed(4), respond: false }),
            Arc::new(SigningPeer { id: "v5".into(), weight: 10, seed: seed(5), respond: false }),
            Arc::new(SigningPeer { id: "v6".into(), weight: 10, seed: seed(6), respond: false }),
            Arc::new(SigningPeer { id: "v7".into(), weight: 10, seed: seed(7), respond: false }),
        ];
        let (c, _keys) = collector(peers, 20);
        let err = c.collect(&closed_batch(), 77).await.unwrap_err();
        assert!(matches!(
            err,
            AttestationError::ThresholdNotMet { signed: 40, total: 100, required: 67 }
        ));
    }

    #[tokio::test]
    async fn aggregate_verifies_against_aggregated_keys() {
        let peers: Vec<Arc<dyn AttestationPeer>> = vec![
            Arc::new(SigningPeer { id: "v2".into(), weight: 40, seed: seed(2), respond: true }),
            Arc::new(SigningPeer { id: "v3".into(), weight: 40, seed: seed(3), respond: true }),
        ];
        let (c, _keys) = collector(peers, 20);
        let batch = closed_batch();
        let bundle = c.collect(&batch, 5).await.unwrap();

        // Rebuild the signer key set and check the aggregate signature.
        let own_pk = *c.key_manager.public_key();
        let (_, pk2) = keypair_from_seed(&seed(2)).unwrap();
        let (_, pk3) = keypair_from_seed(&seed(3)).unwrap();
        let sig = Signature::from_bytes(&bundle.aggregate_signature).unwrap();
        assert!(verify_aggregate_with_domain(
            &sig,
            &[own_pk, pk2, pk3],
            DomainTag::Attestation,
            bundle.message_hash.as_bytes(),
        ));
    }
}
