//! Governance witness assembly.
//!
//! Reads the account's key book from the source ledger and condenses it into
//! a `GovernanceProof`: one state hash per key page, a Merkle root over the
//! pages, and the threshold accounting the target chain re-checks. Accounts
//! without a governance class degrade to level `None` with a zero root.

use crate::merkle::MerkleTree;
use crosslink_api::source::{KeyPage, SourceLedger};
use crosslink_crypto::hash::sha256;
use crosslink_types::error::ProofError;
use crosslink_types::proof::{AuthorityLevel, GovernanceProof};
use crosslink_types::{codec, Hash32};
use parity_scale_codec::Encode;
use std::sync::Arc;
use tracing::debug;

/// Derives the 20-byte authority identifier from a public key.
///
/// This is `SHA256(pk_bytes)[..20]` for wire compatibility with existing
/// anchors. It is not an EVM address derivation and must never be used where
/// an EVM account semantic is expected.
pub fn authority_address(public_key: &[u8]) -> [u8; 20] {
    let digest = sha256(public_key);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest.as_bytes()[..20]);
    out
}

/// The canonical hash of a key page's state.
fn key_page_hash(page: &KeyPage) -> Hash32 {
    let encoded = (
        page.index,
        page.accept_threshold,
        &page.key_hashes,
        page.version,
    )
        .encode();
    sha256(&encoded)
}

/// The canonical governance root: hash of the serialized witness.
pub fn governance_root(proof: &GovernanceProof) -> Hash32 {
    match codec::to_bytes_canonical(proof) {
        Ok(bytes) => sha256(&bytes),
        // SCALE encoding of an in-memory record cannot fail; keep the zero
        // root as the impossible-path sentinel rather than panicking.
        Err(_) => Hash32::ZERO,
    }
}

/// The witness for an account with no governance class.
pub fn none_witness() -> GovernanceProof {
    GovernanceProof {
        key_book_url: String::new(),
        key_book_root: Hash32::ZERO,
        key_page_proofs: Vec::new(),
        authority_address: [0u8; 20],
        authority_level: AuthorityLevel::None,
        required_sigs: 0,
        provided_sigs: 0,
        threshold_met: false,
        nonce: 0,
    }
}

/// Builds governance witnesses from the source ledger's key books.
pub struct GovernanceProofGenerator<S: SourceLedger + ?Sized> {
    source: Arc<S>,
}

impl<S: SourceLedger + ?Sized> GovernanceProofGenerator<S> {
    pub fn new(source: Arc<S>) -> Self {
        GovernanceProofGenerator { source }
    }

    /// Assembles the witness for `account`, counting `provided_sigs`
    /// signatures observed on the transaction and attributing authority to
    /// `signer_key`.
    ///
    /// Returns the `None`-level witness when the account has no key book;
    /// the caller decides whether that degradation is acceptable.
    pub async fn build(
        &self,
        account: &str,
        signer_key: &[u8],
        provided_sigs: u64,
    ) -> Result<GovernanceProof, ProofError> {
        let Some(book) = self.source.key_book(account).await? else {
            debug!(target: "proof-cycle", account, "no key book; governance degrades to none");
            return Ok(none_witness());
        };

        let page_hashes: Vec<Hash32> = book.pages.iter().map(key_page_hash).collect();
        let key_book_root = MerkleTree::build(&page_hashes)
            .map(|t| t.root())
            .unwrap_or(Hash32::ZERO);

        // The first page is the account's operating page; its threshold is
        // what the target chain enforces.
        let (required_sigs, nonce) = book
            .pages
            .first()
            .map(|p| (p.accept_threshold, p.version))
            .unwrap_or((0, 0));

        let signer_hash = sha256(signer_key);
        let direct = book
            .pages
            .iter()
            .any(|p| p.key_hashes.contains(&signer_hash));
        let authority_level = if direct {
            AuthorityLevel::Direct
        } else {
            AuthorityLevel::Delegated
        };

        Ok(GovernanceProof {
            key_book_url: book.url,
            key_book_root,
            key_page_proofs: page_hashes,
            authority_address: authority_address(signer_key),
            authority_level,
            required_sigs,
            provided_sigs,
            threshold_met: required_sigs > 0 && provided_sigs >= required_sigs,
            nonce,
        })
    }
}
