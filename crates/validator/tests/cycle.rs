//! Proof-cycle orchestration against mock source and target chains:
//! idempotent replay, the LOCAL_VERIFIED terminal, step-3 reverts, and
//! cancellation markers.

use async_trait::async_trait;
use crosslink_api::intent::DiscoveredIntent;
use crosslink_api::source::{
    AnchorCandidate, ChainEntry, ConsensusCommit, ConsensusStatus, KeyBook, SourceLedger,
};
use crosslink_api::target::{AnchorStatus, ComprehensiveProof, TargetChain};
use crosslink_crypto::hash::sha256;
use crosslink_crypto::KeyManager;
use crosslink_engine::{AttestationCollector, BatchEngine};
use crosslink_proof::receipt;
use crosslink_storage::{LedgerStore, MemoryKv};
use crosslink_types::batch::Anchor;
use crosslink_types::config::BatchingConfig;
use crosslink_types::error::{CycleError, SourceError, TargetError};
use crosslink_types::ledger::CycleState;
use crosslink_types::proof::{Receipt, ReceiptStep};
use crosslink_types::Hash32;
use crosslink_validator::orchestration::{run_cycle, CycleContext, Orchestrator, ProofIndex};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

const ACCOUNT: &str = "acc://alice.acme/tokens";
const SCOPE: &str = "acc://dn.acme/anchors";

fn receipt_through(start: Hash32, sibling: Hash32, local_block: u64) -> Receipt {
    let mut r = Receipt {
        start,
        anchor: Hash32::ZERO,
        local_block,
        entries: vec![ReceiptStep {
            hash: sibling,
            right: true,
        }],
    };
    r.anchor = receipt::fold(&r);
    r
}

struct MockSource {
    entry: ChainEntry,
    anchors: HashMap<Hash32, Vec<AnchorCandidate>>,
    commits: HashMap<u64, Hash32>,
}

impl MockSource {
    /// A consistent three-layer world for `tx`.
    fn happy(tx: Hash32) -> Self {
        let l1 = receipt_through(tx, sha256(b"s1"), 40);
        let x = l1.anchor;
        let entry = ChainEntry {
            account: ACCOUNT.into(),
            tx_chain_index: 1,
            minor_block_index: 40,
            receipt: Some(l1),
        };

        let l2 = receipt_through(x, sha256(b"d1"), 100);
        let y = l2.anchor;
        let l2_candidate = AnchorCandidate {
            name: "anchor(0)-bpt".into(),
            scope: SCOPE.into(),
            chain_index: 3,
            minor_block_index: 100,
            receipt: l2,
            state_tree_anchor: Some(sha256(b"bvn-bpt")),
        };

        let l3 = receipt_through(y, sha256(b"e1"), 101);
        let l3_candidate = AnchorCandidate {
            name: "anchor(1)-bpt".into(),
            scope: SCOPE.into(),
            chain_index: 9,
            minor_block_index: 101,
            receipt: l3,
            state_tree_anchor: Some(sha256(b"dn-bpt")),
        };

        let mut anchors = HashMap::new();
        anchors.insert(x, vec![l2_candidate]);
        anchors.insert(y, vec![l3_candidate]);
        let mut commits = HashMap::new();
        commits.insert(100, y);
        commits.insert(101, y);
        MockSource {
            entry,
            anchors,
            commits,
        }
    }
}

#[async_trait]
impl SourceLedger for MockSource {
    async fn chain_entry(
        &self,
        _: &str,
        _: &str,
        _: &Hash32,
        _: bool,
    ) -> Result<Option<ChainEntry>, SourceError> {
        Ok(Some(self.entry.clone()))
    }
    async fn anchor_search(
        &self,
        target_anchor: &Hash32,
        _: bool,
        _: bool,
    ) -> Result<Vec<AnchorCandidate>, SourceError> {
        Ok(self.anchors.get(target_anchor).cloned().unwrap_or_default())
    }
    async fn consensus_status(&self) -> Result<ConsensusStatus, SourceError> {
        Ok(ConsensusStatus {
            latest_height: 101,
            latest_app_hash: Hash32::ZERO,
            catching_up: false,
        })
    }
    async fn consensus_commit(&self, height: u64) -> Result<ConsensusCommit, SourceError> {
        self.commits
            .get(&height)
            .map(|h| ConsensusCommit {
                height,
                app_hash: *h,
            })
            .ok_or(SourceError::Status { status: 404 })
    }
    async fn key_book(&self, _: &str) -> Result<Option<KeyBook>, SourceError> {
        Ok(None)
    }
}

#[derive(Default)]
struct TargetState {
    anchors: HashMap<Hash32, AnchorStatus>,
    create_calls: usize,
    proof_calls: usize,
    gov_calls: usize,
}

struct MockTarget {
    state: Mutex<TargetState>,
    fail_proof: bool,
    fail_gov: bool,
}

impl MockTarget {
    fn new() -> Self {
        MockTarget {
            state: Mutex::new(TargetState::default()),
            fail_proof: false,
            fail_gov: false,
        }
    }
}

#[async_trait]
impl TargetChain for MockTarget {
    async fn create_anchor(&self, anchor: &Anchor) -> Result<Hash32, TargetError> {
        let mut s = self.state.lock().unwrap();
        s.create_calls += 1;
        s.anchors.insert(
            anchor.bundle_id,
            AnchorStatus {
                exists: true,
                proof_executed: false,
                governance_executed: false,
            },
        );
        Ok(sha256(b"create-tx"))
    }
    async fn execute_comprehensive_proof(
        &self,
        bundle_id: &Hash32,
        _: &ComprehensiveProof,
    ) -> Result<Hash32, TargetError> {
        let mut s = self.state.lock().unwrap();
        s.proof_calls += 1;
        if self.fail_proof {
            return Err(TargetError::Reverted("proof verification failed".into()));
        }
        if let Some(status) = s.anchors.get_mut(bundle_id) {
            status.proof_executed = true;
        }
        Ok(sha256(b"proof-tx"))
    }
    async fn execute_with_governance(
        &self,
        bundle_id: &Hash32,
        _: &[u8; 20],
        _: u128,
        _: &[u8],
    ) -> Result<Hash32, TargetError> {
        let mut s = self.state.lock().unwrap();
        s.gov_calls += 1;
        if self.fail_gov {
            return Err(TargetError::Reverted("governance step reverted".into()));
        }
        if let Some(status) = s.anchors.get_mut(bundle_id) {
            status.governance_executed = true;
        }
        Ok(sha256(b"gov-tx"))
    }
    async fn anchor_status(&self, bundle_id: &Hash32) -> Result<AnchorStatus, TargetError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .anchors
            .get(bundle_id)
            .copied()
            .unwrap_or_default())
    }
    async fn confirmations(&self, _: &Hash32) -> Result<u64, TargetError> {
        Ok(12)
    }
    fn chain_label(&self) -> &str {
        "eip155:31337"
    }
}

struct World {
    ctx: Arc<CycleContext>,
    target: Arc<MockTarget>,
    store: LedgerStore,
    _keys: tempfile::TempDir,
}

fn world(target: MockTarget, tx: Hash32) -> World {
    let keys = tempfile::tempdir().unwrap();
    let km = Arc::new(KeyManager::load_or_generate(keys.path()).unwrap());
    let store = LedgerStore::new(Arc::new(MemoryKv::new()));
    let target = Arc::new(target);
    // Solo cohort: own weight 1, threshold 1, met by the local signature.
    let collector = Arc::new(AttestationCollector::new(
        Arc::clone(&km),
        "validator-1".into(),
        1,
        Vec::new(),
        Duration::from_secs(1),
        Duration::from_secs(1),
    ));
    let batcher = Arc::new(BatchEngine::new(BatchingConfig {
        on_demand_cap: 1,
        ..BatchingConfig::default()
    }));
    let ctx = Arc::new(CycleContext {
        source: Arc::new(MockSource::happy(tx)),
        target: target.clone(),
        store: store.clone(),
        batcher,
        collector,
        attn_tx: CycleContext::attestation_channel(),
        source_chain_label: "acme".into(),
        validator_public_key: km.public_key().to_bytes().to_vec(),
        proofs: Arc::new(ProofIndex::new()),
        confirmations_required: 12,
        writeback_enabled: true,
    });
    World {
        ctx,
        target,
        store,
        _keys: keys,
    }
}

fn intent(tx: Hash32) -> DiscoveredIntent {
    DiscoveredIntent {
        intent_id: "intent-1".into(),
        account: ACCOUNT.into(),
        tx_hash: tx,
        bvn: "BVN1".into(),
        source_block_height: 42,
        governance_class: true,
        target_address: [5u8; 20],
        value: 0,
        calldata: vec![0xde, 0xad],
        urgent: true,
    }
}

async fn run_once(w: &World, shutdown: watch::Receiver<bool>) -> Result<CycleState, CycleError> {
    let orchestrator = Orchestrator::new(Arc::clone(&w.ctx));
    let (_driver_tx, driver_shutdown) = watch::channel(false);
    let driver = orchestrator.spawn_batch_driver(driver_shutdown);
    let result = run_cycle(Arc::clone(&w.ctx), intent(Hash32([1u8; 32])), shutdown).await;
    driver.abort();
    result
}

#[tokio::test]
async fn full_cycle_reaches_writeback_done() {
    let tx = Hash32([1u8; 32]);
    let w = world(MockTarget::new(), tx);
    let (_stop, shutdown) = watch::channel(false);

    let state = run_once(&w, shutdown).await.unwrap();
    assert_eq!(state, CycleState::WritebackDone);

    let marker = w.store.cycle_marker(&tx).unwrap().unwrap();
    assert_eq!(marker.state, CycleState::WritebackDone);
    assert!(marker.bundle_id.is_some());

    let s = w.target.state.lock().unwrap();
    assert_eq!(s.create_calls, 1);
    assert_eq!(s.proof_calls, 1);
    assert_eq!(s.gov_calls, 1);

    // Write-back landed in the anchor ledger.
    let anchor_state = w.store.anchor_target("eip155:31337").unwrap();
    assert_eq!(anchor_state.delivered, 1);
}

#[tokio::test]
async fn replay_is_idempotent() {
    let tx = Hash32([1u8; 32]);
    let w = world(MockTarget::new(), tx);
    let (_stop, shutdown) = watch::channel(false);

    let first = run_once(&w, shutdown.clone()).await.unwrap();
    assert_eq!(first, CycleState::WritebackDone);
    let bundle_first = w.store.cycle_marker(&tx).unwrap().unwrap().bundle_id;

    let second = run_once(&w, shutdown).await.unwrap();
    assert_eq!(second, CycleState::WritebackDone);
    let bundle_second = w.store.cycle_marker(&tx).unwrap().unwrap().bundle_id;

    // Same bundle id, single anchor, single governance execution.
    assert_eq!(bundle_first, bundle_second);
    let s = w.target.state.lock().unwrap();
    assert_eq!(s.create_calls, 1);
    assert_eq!(s.proof_calls, 1);
    assert_eq!(s.gov_calls, 1);
}

#[tokio::test]
async fn step2_failure_with_local_verify_is_local_verified() {
    let tx = Hash32([1u8; 32]);
    let w = world(
        MockTarget {
            state: Mutex::new(TargetState::default()),
            fail_proof: true,
            fail_gov: false,
        },
        tx,
    );
    let (_stop, shutdown) = watch::channel(false);

    let state = run_once(&w, shutdown).await.unwrap();
    assert_eq!(state, CycleState::LocalVerified);

    let marker = w.store.cycle_marker(&tx).unwrap().unwrap();
    assert_eq!(marker.state, CycleState::LocalVerified);
    // Terminal but not failed; the governance step never ran.
    assert_eq!(w.target.state.lock().unwrap().gov_calls, 0);
}

#[tokio::test]
async fn step3_revert_fails_with_bundle_preserved() {
    let tx = Hash32([1u8; 32]);
    let w = world(
        MockTarget {
            state: Mutex::new(TargetState::default()),
            fail_proof: false,
            fail_gov: true,
        },
        tx,
    );
    let (_stop, shutdown) = watch::channel(false);

    let err = run_once(&w, shutdown).await.unwrap_err();
    assert!(matches!(err, CycleError::Target(TargetError::Reverted(_))));

    let marker = w.store.cycle_marker(&tx).unwrap().unwrap();
    assert_eq!(marker.state, CycleState::Failed);
    assert!(marker.bundle_id.is_some(), "bundle id kept for recovery");
}

#[tokio::test]
async fn resume_after_gov_executed_does_not_double_execute() {
    let tx = Hash32([1u8; 32]);
    let w = world(MockTarget::new(), tx);
    let (_stop, shutdown) = watch::channel(false);

    // Simulate a prior run that got through step 3 and was then suspended:
    // the target chain already holds the fully executed bundle.
    let bundle = crosslink_engine::commitments::bundle_id("intent-1", 42, &tx);
    w.target.state.lock().unwrap().anchors.insert(
        bundle,
        AnchorStatus {
            exists: true,
            proof_executed: true,
            governance_executed: true,
        },
    );
    w.store
        .save_cycle_marker(
            &tx,
            &crosslink_types::ledger::CycleMarker {
                state: CycleState::Suspended,
                reason: None,
                bundle_id: Some(bundle),
                updated_at: 0,
            },
        )
        .unwrap();

    let state = run_once(&w, shutdown).await.unwrap();
    assert_eq!(state, CycleState::WritebackDone);

    let s = w.target.state.lock().unwrap();
    assert_eq!(s.create_calls, 0, "anchor existed; step 1 skipped");
    assert_eq!(s.proof_calls, 0, "proof executed; step 2 skipped");
    assert_eq!(s.gov_calls, 0, "governance never re-executed");
}

#[tokio::test]
async fn cancellation_writes_suspended_marker() {
    let tx = Hash32([1u8; 32]);
    let w = world(MockTarget::new(), tx);
    let (stop, shutdown) = watch::channel(false);
    stop.send(true).unwrap();

    let state = run_once(&w, shutdown).await.unwrap();
    assert_eq!(state, CycleState::Suspended);
    let marker = w.store.cycle_marker(&tx).unwrap().unwrap();
    assert_eq!(marker.state, CycleState::Suspended);
    // No target-chain side effects after cancel.
    assert_eq!(w.target.state.lock().unwrap().create_calls, 0);
}
