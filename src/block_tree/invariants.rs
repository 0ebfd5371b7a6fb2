/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Rules and predicates that keep the Block Tree consistent across honest replicas.
//!
//! # Methods
//!
//! The methods in this module fall into two categories:
//! 1. **"Whether"**: [`safe_block`] checks whether the replica may vote for a block. It is the single
//!    gate for casting a vote.
//! 2. **"What"**: [`qc_to_lock`] and [`block_to_commit`] determine which state updates
//!    [`update`](super::accessors::internal::BlockTreeSingleton::update) should perform upon seeing a
//!    new `QuorumCertificate`.
//!
//! # Blockchain Consistency
//!
//! The global invariant guaranteed by these rules is that no two honest replicas ever commit
//! conflicting blocks: below the lower of their two highest committed blocks, the committed parts of
//! their block trees are identical.
//!
//! ## Chains
//!
//! Consider a QC `justify` received by a replica, and let:
//! - `b''` be `justify.block`,
//! - `b'` be `b''.justify.block`,
//! - `b` be `b'.justify.block`.
//!
//! `justify` forms a *one-chain* over `b''`, a *two-chain* over `b'` and a *three-chain* over `b`. The
//! links of the chain are QC links; fillers may sit between them.
//!
//! ## Locking
//!
//! When a two-chain forms over `b'` and `b'` is higher than the block of the current locked QC, the
//! replica locks on `b''.justify` (the QC for `b'`). A locked replica only votes for blocks that extend
//! the locked block, unless the block carries a QC from a view newer than the lock, which proves
//! that a quorum has moved on.
//!
//! ## Committing
//!
//! A block `b` is committed when a three-chain over it is formed **and** the chain is direct:
//! `b''.parent == b'` and `b'.parent == b`. This means that a quorum voted for `b`, `b'` and `b''` in
//! three consecutive views, and so a quorum is locked on `b'`. No conflicting block can then gather a
//! QC, because a quorum of honest replicas would refuse to vote for it.
//!
//! Committing `b` also commits every uncommitted ancestor of `b` (including fillers), from the oldest
//! to the newest.

use crate::{
    hotstuff::types::QuorumCertificate,
    types::{
        block::Block,
        data_types::{BlockHeight, CryptoHash},
    },
};

use super::{
    accessors::internal::{BlockTreeError, BlockTreeSingleton},
    pluggables::KVStore,
};

/// Returns whether the replica may vote for `block`.
///
/// This is the case if either:
/// 1. (Safety) `block` extends the block of the locked QC, or
/// 2. (Liveness) `block.justify.view` is greater than the view of the locked QC.
///
/// ## Preconditions
///
/// The ancestors of `block` (including fillers) are in the block tree. `block` itself need not be.
pub fn safe_block<K: KVStore>(
    block: &Block,
    block_tree: &BlockTreeSingleton<K>,
) -> Result<bool, BlockTreeError> {
    let locked_qc = block_tree.locked_qc()?;
    if block.justify.view > locked_qc.view {
        return Ok(true);
    }
    extends(block_tree, block, &locked_qc.block, locked_qc.view)
}

/// Returns whether `block` is `ancestor`, or a descendant of `ancestor`, which sits at
/// `ancestor_height`.
///
/// Returns `false` if the walk reaches a block missing from the block tree.
pub fn extends<K: KVStore>(
    block_tree: &BlockTreeSingleton<K>,
    block: &Block,
    ancestor: &CryptoHash,
    ancestor_height: BlockHeight,
) -> Result<bool, BlockTreeError> {
    if ancestor.is_zero() {
        return Ok(true);
    }
    if block.hash == *ancestor {
        return Ok(true);
    }

    let mut cursor = block.parent;
    let mut cursor_height = block.height;
    loop {
        if cursor == *ancestor {
            return Ok(true);
        }
        if cursor.is_zero() || cursor_height <= ancestor_height {
            return Ok(false);
        }
        match block_tree.block(&cursor)? {
            Some(parent) => {
                cursor = parent.parent;
                cursor_height = parent.height;
            }
            None => return Ok(false),
        }
    }
}

/// Get the QC to lock on upon seeing `justify`, if any.
///
/// Returns `b''.justify` if `b''` (the block `justify` certifies) is in the block tree and its justify
/// is from a higher view than the locked QC.
pub fn qc_to_lock<K: KVStore>(
    justify: &QuorumCertificate,
    block_tree: &BlockTreeSingleton<K>,
) -> Result<Option<QuorumCertificate>, BlockTreeError> {
    if justify.is_genesis_qc() {
        return Ok(None);
    }
    let Some(b2) = block_tree.block(&justify.block)? else {
        return Ok(None);
    };
    let locked_qc = block_tree.locked_qc()?;
    if b2.justify.view > locked_qc.view {
        Ok(Some(b2.justify))
    } else {
        Ok(None)
    }
}

/// Get the block to commit upon seeing `justify`, if any.
///
/// Returns `b` if `justify` forms a direct three-chain over `b` and `b` is higher than the highest
/// committed block.
pub fn block_to_commit<K: KVStore>(
    justify: &QuorumCertificate,
    block_tree: &BlockTreeSingleton<K>,
) -> Result<Option<CryptoHash>, BlockTreeError> {
    if justify.is_genesis_qc() {
        return Ok(None);
    }
    let Some(b2) = block_tree.block(&justify.block)? else {
        return Ok(None);
    };
    if b2.justify.is_genesis_qc() || !b2.directly_extends_justify() {
        return Ok(None);
    }
    let Some(b1) = block_tree.block(&b2.justify.block)? else {
        return Ok(None);
    };
    if b1.justify.is_genesis_qc() || !b1.directly_extends_justify() {
        return Ok(None);
    }

    let b = b1.justify.block;
    match block_tree.highest_committed_block_height()? {
        Some(committed_height) if b1.justify.view <= committed_height => Ok(None),
        _ => Ok(Some(b)),
    }
}
