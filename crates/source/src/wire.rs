//! Wire shapes of the source ledger's query API.
//!
//! The DTO set is closed: a response that does not match one of these shapes
//! is a [`SourceError::UnknownRecordShape`], never a best-effort fallback.
//! Every hash crosses the boundary through [`Hash32::from_hex`], so a
//! malformed digest is rejected at ingest.

use crosslink_api::source::{AnchorCandidate, ChainEntry, KeyBook, KeyPage};
use crosslink_types::error::SourceError;
use crosslink_types::proof::{Receipt, ReceiptStep};
use crosslink_types::Hash32;
use serde::Deserialize;

fn hash(field: &str, value: &str) -> Result<Hash32, SourceError> {
    Hash32::from_hex(value).map_err(|e| SourceError::BadHash(format!("{}: {}", field, e)))
}

#[derive(Debug, Deserialize)]
pub struct ReceiptStepDto {
    pub hash: String,
    pub right: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReceiptDto {
    pub start: String,
    pub anchor: String,
    #[serde(rename = "localBlock")]
    pub local_block: u64,
    #[serde(default)]
    pub entries: Vec<ReceiptStepDto>,
}

impl ReceiptDto {
    pub fn into_receipt(self) -> Result<Receipt, SourceError> {
        let entries = self
            .entries
            .into_iter()
            .map(|s| {
                Ok(ReceiptStep {
                    hash: hash("receipt.entry", &s.hash)?,
                    right: s.right,
                })
            })
            .collect::<Result<Vec<_>, SourceError>>()?;
        Ok(Receipt {
            start: hash("receipt.start", &self.start)?,
            anchor: hash("receipt.anchor", &self.anchor)?,
            local_block: self.local_block,
            entries,
        })
    }
}

/// `recordType` discriminates the closed record set.
#[derive(Debug, Deserialize)]
#[serde(tag = "recordType")]
pub enum RecordDto {
    #[serde(rename = "chainEntry")]
    ChainEntry {
        account: String,
        #[serde(rename = "chainIndex")]
        chain_index: u64,
        #[serde(rename = "minorBlockIndex")]
        minor_block_index: u64,
        receipt: Option<ReceiptDto>,
    },
    #[serde(rename = "anchorSearch")]
    AnchorSearch {
        name: String,
        scope: String,
        #[serde(rename = "chainIndex")]
        chain_index: u64,
        #[serde(rename = "minorBlockIndex")]
        minor_block_index: u64,
        receipt: ReceiptDto,
        #[serde(rename = "stateTreeAnchor")]
        state_tree_anchor: Option<String>,
    },
    #[serde(rename = "keyBook")]
    KeyBook {
        url: String,
        pages: Vec<KeyPageDto>,
    },
}

#[derive(Debug, Deserialize)]
pub struct KeyPageDto {
    pub index: u64,
    #[serde(rename = "acceptThreshold")]
    pub accept_threshold: u64,
    #[serde(rename = "keyHashes")]
    pub key_hashes: Vec<String>,
    pub version: u64,
}

impl RecordDto {
    pub fn into_chain_entry(self) -> Result<ChainEntry, SourceError> {
        match self {
            RecordDto::ChainEntry {
                account,
                chain_index,
                minor_block_index,
                receipt,
            } => Ok(ChainEntry {
                account,
                tx_chain_index: chain_index,
                minor_block_index,
                receipt: receipt.map(|r| r.into_receipt()).transpose()?,
            }),
            other => Err(SourceError::UnknownRecordShape(format!(
                "expected chainEntry, got {:?}",
                record_kind(&other)
            ))),
        }
    }

    pub fn into_anchor_candidate(self) -> Result<AnchorCandidate, SourceError> {
        match self {
            RecordDto::AnchorSearch {
                name,
                scope,
                chain_index,
                minor_block_index,
                receipt,
                state_tree_anchor,
            } => Ok(AnchorCandidate {
                name,
                scope,
                chain_index,
                minor_block_index,
                receipt: receipt.into_receipt()?,
                state_tree_anchor: state_tree_anchor
                    .map(|s| hash("stateTreeAnchor", &s))
                    .transpose()?,
            }),
            other => Err(SourceError::UnknownRecordShape(format!(
                "expected anchorSearch, got {:?}",
                record_kind(&other)
            ))),
        }
    }

    pub fn into_key_book(self) -> Result<KeyBook, SourceError> {
        match self {
            RecordDto::KeyBook { url, pages } => Ok(KeyBook {
                url,
                pages: pages
                    .into_iter()
                    .map(|p| {
                        Ok(KeyPage {
                            index: p.index,
                            accept_threshold: p.accept_threshold,
                            key_hashes: p
                                .key_hashes
                                .iter()
                                .map(|h| hash("keyHash", h))
                                .collect::<Result<Vec<_>, _>>()?,
                            version: p.version,
                        })
                    })
                    .collect::<Result<Vec<_>, SourceError>>()?,
            }),
            other => Err(SourceError::UnknownRecordShape(format!(
                "expected keyBook, got {:?}",
                record_kind(&other)
            ))),
        }
    }
}

fn record_kind(r: &RecordDto) -> &'static str {
    match r {
        RecordDto::ChainEntry { .. } => "chainEntry",
        RecordDto::AnchorSearch { .. } => "anchorSearch",
        RecordDto::KeyBook { .. } => "keyBook",
    }
}

/// CometBFT-style `/status` envelope, narrowed to the fields we read.
#[derive(Debug, Deserialize)]
pub struct StatusDto {
    pub sync_info: SyncInfoDto,
}

#[derive(Debug, Deserialize)]
pub struct SyncInfoDto {
    pub latest_block_height: String,
    pub latest_app_hash: String,
    pub catching_up: bool,
}

/// CometBFT-style `/commit` envelope, narrowed to the fields we read.
#[derive(Debug, Deserialize)]
pub struct CommitDto {
    pub signed_header: SignedHeaderDto,
}

#[derive(Debug, Deserialize)]
pub struct SignedHeaderDto {
    pub header: HeaderDto,
}

#[derive(Debug, Deserialize)]
pub struct HeaderDto {
    pub height: String,
    pub app_hash: String,
}

impl StatusDto {
    pub fn latest_height(&self) -> Result<u64, SourceError> {
        self.sync_info
            .latest_block_height
            .parse()
            .map_err(|_| SourceError::Decode("latest_block_height is not a number".into()))
    }

    pub fn latest_app_hash(&self) -> Result<Hash32, SourceError> {
        // The consensus layer reports app hashes in lowercase hex already;
        // normalize defensively since some gateways uppercase them.
        hash("latest_app_hash", &self.sync_info.latest_app_hash.to_lowercase())
    }
}

impl CommitDto {
    pub fn height(&self) -> Result<u64, SourceError> {
        self.signed_header
            .header
            .height
            .parse()
            .map_err(|_| SourceError::Decode("commit height is not a number".into()))
    }

    pub fn app_hash(&self) -> Result<Hash32, SourceError> {
        hash("app_hash", &self.signed_header.header.app_hash.to_lowercase())
    }
}

/// An intent record inside a block listing.
#[derive(Debug, Deserialize)]
pub struct IntentDto {
    #[serde(rename = "intentId")]
    pub intent_id: String,
    pub account: String,
    #[serde(rename = "txHash")]
    pub tx_hash: String,
    pub bvn: String,
    #[serde(rename = "governanceClass", default = "default_true")]
    pub governance_class: bool,
    #[serde(rename = "targetAddress")]
    pub target_address: String,
    #[serde(default)]
    pub value: u128,
    #[serde(default)]
    pub calldata: String,
    #[serde(default)]
    pub urgent: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct BlockIntentsDto {
    pub height: u64,
    #[serde(default)]
    pub intents: Vec<IntentDto>,
}
