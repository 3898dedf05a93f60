//! Anchor-registry contract bindings and record conversions.

use alloy::primitives::{Address, Bytes, B256};
use alloy::sol;
use crosslink_api::target::ComprehensiveProof;
use crosslink_types::Hash32;

sol! {
    #[sol(rpc)]
    contract AnchorRegistry {
        struct GovernanceProofData {
            string keyBookUrl;
            bytes32 keyBookRoot;
            bytes32[] keyPageProofs;
            address authorityAddress;
            uint8 authorityLevel;
            uint64 requiredSigs;
            uint64 providedSigs;
            bool thresholdMet;
            uint64 nonce;
        }

        struct BlsProofData {
            bytes aggregateSignature;
            uint64 totalVotingPower;
            uint64 signedVotingPower;
            bool thresholdMet;
            bytes32 messageHash;
        }

        struct CommitmentData {
            bytes32 operationCommitment;
            bytes32 crossChainCommitment;
            bytes32 governanceRoot;
            string sourceChain;
            uint64 sourceBlockHeight;
            string targetChain;
            bytes32 sourceTxHash;
        }

        struct ComprehensiveProofData {
            bytes32 transactionHash;
            bytes32 merkleRoot;
            bytes32[] proofHashes;
            bytes32 leafHash;
            GovernanceProofData governanceProof;
            BlsProofData blsProof;
            CommitmentData commitments;
            uint64 expirationTime;
            bytes metadata;
        }

        function createAnchor(
            bytes32 bundleId,
            bytes32 operationCommitment,
            bytes32 crossChainCommitment,
            bytes32 governanceRoot,
            uint64 sourceBlockHeight
        ) external;

        function executeComprehensiveProof(
            bytes32 bundleId,
            ComprehensiveProofData proof
        ) external;

        function executeWithGovernance(
            bytes32 bundleId,
            address target,
            uint256 value,
            bytes calldata data
        ) external;

        function anchorExists(bytes32 bundleId) external view returns (bool);
        function proofExecuted(bytes32 bundleId) external view returns (bool);
        function governanceExecuted(bytes32 bundleId) external view returns (bool);

        event AnchorCreated(bytes32 indexed bundleId, bytes32 merkleRoot, uint64 sourceBlockHeight);
        event ProofExecuted(bytes32 indexed bundleId, bytes32 merkleRoot);
        event ProofVerificationFailed(bytes32 indexed bundleId, string reason);
    }
}

pub(crate) fn b256(h: &Hash32) -> B256 {
    B256::from(h.0)
}

pub(crate) fn hash32(b: &B256) -> Hash32 {
    Hash32(b.0)
}

pub(crate) fn b256_vec(hashes: &[Hash32]) -> Vec<B256> {
    hashes.iter().map(b256).collect()
}

/// Converts the wire record into its ABI shape.
pub(crate) fn proof_to_sol(proof: &ComprehensiveProof) -> AnchorRegistry::ComprehensiveProofData {
    AnchorRegistry::ComprehensiveProofData {
        transactionHash: b256(&proof.transaction_hash),
        merkleRoot: b256(&proof.merkle_root),
        proofHashes: b256_vec(&proof.proof_hashes),
        leafHash: b256(&proof.leaf_hash),
        governanceProof: AnchorRegistry::GovernanceProofData {
            keyBookUrl: proof.governance_proof.key_book_url.clone(),
            keyBookRoot: b256(&proof.governance_proof.key_book_root),
            keyPageProofs: b256_vec(&proof.governance_proof.key_page_proofs),
            authorityAddress: Address::from(proof.governance_proof.authority_address),
            authorityLevel: proof.governance_proof.authority_level.as_u8(),
            requiredSigs: proof.governance_proof.required_sigs,
            providedSigs: proof.governance_proof.provided_sigs,
            thresholdMet: proof.governance_proof.threshold_met,
            nonce: proof.governance_proof.nonce,
        },
        blsProof: AnchorRegistry::BlsProofData {
            aggregateSignature: Bytes::from(proof.bls_proof.aggregate_signature.clone()),
            totalVotingPower: proof.bls_proof.total_voting_power,
            signedVotingPower: proof.bls_proof.signed_voting_power,
            thresholdMet: proof.bls_proof.threshold_met,
            messageHash: b256(&proof.bls_proof.message_hash),
        },
        commitments: AnchorRegistry::CommitmentData {
            operationCommitment: b256(&proof.commitments.operation_commitment),
            crossChainCommitment: b256(&proof.commitments.cross_chain_commitment),
            governanceRoot: b256(&proof.commitments.governance_root),
            sourceChain: proof.commitments.source_chain.clone(),
            sourceBlockHeight: proof.commitments.source_block_height,
            targetChain: proof.commitments.target_chain.clone(),
            sourceTxHash: b256(&proof.commitments.source_tx_hash),
        },
        expirationTime: proof.expiration_time,
        metadata: Bytes::from(proof.metadata.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosslink_api::target::{BlsProofData, Commitments};
    use crosslink_types::proof::{AuthorityLevel, GovernanceProof};

    #[test]
    fn conversion_preserves_every_field() {
        let proof = ComprehensiveProof {
            transaction_hash: Hash32([1u8; 32]),
            merkle_root: Hash32([2u8; 32]),
            proof_hashes: vec![Hash32([3u8; 32])],
            leaf_hash: Hash32([2u8; 32]),
            governance_proof: GovernanceProof {
                key_book_url: "acc://alice.acme/book".into(),
                key_book_root: Hash32([4u8; 32]),
                key_page_proofs: vec![Hash32([5u8; 32]), Hash32([6u8; 32])],
                authority_address: [7u8; 20],
                authority_level: AuthorityLevel::Direct,
                required_sigs: 2,
                provided_sigs: 3,
                threshold_met: true,
                nonce: 11,
            },
            bls_proof: BlsProofData {
                aggregate_signature: vec![9u8; 48],
                total_voting_power: 100,
                signed_voting_power: 70,
                threshold_met: true,
                message_hash: Hash32([8u8; 32]),
            },
            commitments: Commitments {
                operation_commitment: Hash32([0x11; 32]),
                cross_chain_commitment: Hash32([0x22; 32]),
                governance_root: Hash32([0x33; 32]),
                source_chain: "acme".into(),
                source_block_height: 42,
                target_chain: "eip155:1".into(),
                source_tx_hash: Hash32([1u8; 32]),
            },
            expiration_time: 1_800_000_000,
            metadata: vec![0xaa, 0xbb],
        };

        let sol = proof_to_sol(&proof);
        assert_eq!(sol.transactionHash, b256(&proof.transaction_hash));
        assert_eq!(sol.proofHashes.len(), 1);
        assert_eq!(sol.governanceProof.authorityLevel, 2);
        assert_eq!(sol.governanceProof.keyPageProofs.len(), 2);
        assert_eq!(sol.blsProof.signedVotingPower, 70);
        assert_eq!(sol.commitments.sourceBlockHeight, 42);
        assert_eq!(sol.metadata.as_ref(), &[0xaa, 0xbb]);
    }

    #[test]
    fn b256_round_trip() {
        let h = Hash32([0xcd; 32]);
        assert_eq!(hash32(&b256(&h)), h);
    }
}
