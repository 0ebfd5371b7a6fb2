/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for pluggable Block Tree persistence.
//!
//! The consensus core requires a key-value store with atomic, batched writes. Implement [`KVStore`],
//! [`KVGet`] and [`WriteBatch`] on top of whatever storage engine you want and pass it in to
//! [`ReplicaSpec`](crate::replica::ReplicaSpec).
//!
//! A [`KVStore::write`] that returns an error is treated as fatal by the replica: it stops making
//! progress instead of risking acting on state that was not durably recorded.

use std::fmt::Display;

use borsh::BorshDeserialize;

use crate::{
    hotstuff::types::QuorumCertificate,
    types::{
        block::Block,
        data_types::{BlockHeight, ChildrenList, CryptoHash, ViewNumber},
    },
};

use super::{
    replica_state::ReplicaState,
    variables::{self, concat},
};

pub trait KVStore: KVGet + Clone + Send + 'static {
    type WriteBatch: WriteBatch;
    type Snapshot<'a>: 'a + KVGet;

    /// Atomically and durably apply every change in `wb`.
    fn write(&mut self, wb: Self::WriteBatch) -> std::io::Result<()>;
    fn clear(&mut self);
    fn snapshot<'b>(&'b self) -> Self::Snapshot<'_>;
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Get and deserialize the value at `key_bytes`, which is described by `key` in errors.
    fn get_value<T: BorshDeserialize>(
        &self,
        key_bytes: &[u8],
        key: Key,
    ) -> Result<Option<T>, KVGetError> {
        match self.get(key_bytes) {
            Some(bytes) => T::try_from_slice(&bytes)
                .map(Some)
                .map_err(|err| KVGetError::DeserializeValueError { key, source: err }),
            None => Ok(None),
        }
    }

    /// Like [`get_value`](Self::get_value), but a missing value is an error.
    fn get_expected_value<T: BorshDeserialize>(
        &self,
        key_bytes: &[u8],
        key: Key,
    ) -> Result<T, KVGetError> {
        match self.get(key_bytes) {
            Some(bytes) => T::try_from_slice(&bytes)
                .map_err(|err| KVGetError::DeserializeValueError { key, source: err }),
            None => Err(KVGetError::ValueExpectedButNotFound { key }),
        }
    }

    /* ↓↓↓ Block ↓↓↓  */

    fn block(&self, block: &CryptoHash) -> Result<Option<Block>, KVGetError> {
        self.get_value(
            &concat(&variables::BLOCKS, &block.bytes()),
            Key::Block { block: *block },
        )
    }

    /* ↓↓↓ Block at Height ↓↓↓ */

    fn block_at_height(&self, height: BlockHeight) -> Result<Option<CryptoHash>, KVGetError> {
        self.get_value(
            &concat(&variables::BLOCK_AT_HEIGHT, &height.int().to_le_bytes()),
            Key::BlockAtHeight { height },
        )
    }

    /* ↓↓↓ Block to Children ↓↓↓ */

    fn children(&self, block: &CryptoHash) -> Result<ChildrenList, KVGetError> {
        Ok(self
            .get_value(
                &concat(&variables::BLOCK_TO_CHILDREN, &block.bytes()),
                Key::BlockChildren { block: *block },
            )?
            .unwrap_or_default())
    }

    /* ↓↓↓ Current View ↓↓↓ */

    fn current_view(&self) -> Result<ViewNumber, KVGetError> {
        self.get_expected_value(&variables::CURRENT_VIEW, Key::CurrentView)
    }

    /* ↓↓↓ Locked QC ↓↓↓ */

    fn locked_qc(&self) -> Result<QuorumCertificate, KVGetError> {
        self.get_expected_value(&variables::LOCKED_QC, Key::LockedQC)
    }

    /* ↓↓↓ Highest QC ↓↓↓ */

    fn highest_qc(&self) -> Result<QuorumCertificate, KVGetError> {
        self.get_expected_value(&variables::HIGHEST_QC, Key::HighestQC)
    }

    /* ↓↓↓ Last Voted Height ↓↓↓ */

    fn last_voted_height(&self) -> Result<BlockHeight, KVGetError> {
        self.get_expected_value(&variables::LAST_VOTED_HEIGHT, Key::LastVotedHeight)
    }

    /* ↓↓↓ Leaf Block ↓↓↓ */

    fn leaf_block(&self) -> Result<CryptoHash, KVGetError> {
        self.get_expected_value(&variables::LEAF_BLOCK, Key::LeafBlock)
    }

    /* ↓↓↓ Highest Committed Block ↓↓↓ */

    fn highest_committed_block(&self) -> Result<Option<CryptoHash>, KVGetError> {
        self.get_value(
            &variables::HIGHEST_COMMITTED_BLOCK,
            Key::HighestCommittedBlock,
        )
    }

    /* ↓↓↓ Replica State ↓↓↓ */

    fn replica_state(&self) -> Result<ReplicaState, KVGetError> {
        Ok(ReplicaState {
            current_view: self.current_view()?,
            locked_qc: self.locked_qc()?,
            high_qc: self.highest_qc()?,
            last_voted_height: self.last_voted_height()?,
            leaf: self.leaf_block()?,
        })
    }
}

pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

/// Error when trying to read a value corresponding to a given key from the [key value store][KVStore].
/// The error may arise in the following circumstances:
/// 1. The value corresponding to a given key cannot be deserialized into its expected type,
/// 2. The value corresponding to a given key cannot be found.
#[derive(Debug, thiserror::Error)]
pub enum KVGetError {
    #[error("failed to deserialize the value of {key}")]
    DeserializeValueError { key: Key, source: std::io::Error },

    #[error("expected a value for {key}, but found none")]
    ValueExpectedButNotFound { key: Key },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Block { block: CryptoHash },
    BlockAtHeight { height: BlockHeight },
    BlockChildren { block: CryptoHash },
    CurrentView,
    LockedQC,
    HighestQC,
    LastVotedHeight,
    LeafBlock,
    HighestCommittedBlock,
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Block { block } => write!(f, "Block {}", block),
            Key::BlockAtHeight { height } => write!(f, "Block at height {}", height),
            Key::BlockChildren { block } => write!(f, "Block children for block {}", block),
            Key::CurrentView => write!(f, "Current View"),
            Key::LockedQC => write!(f, "Locked QC"),
            Key::HighestQC => write!(f, "Highest QC"),
            Key::LastVotedHeight => write!(f, "Last Voted Height"),
            Key::LeafBlock => write!(f, "Leaf Block"),
            Key::HighestCommittedBlock => write!(f, "Highest Committed Block"),
        }
    }
}
