/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the 'block' type and its associated methods.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::hotstuff::types::QuorumCertificate;

use super::{
    crypto_primitives::{CryptoHasher, Digest, ThresholdScheme},
    data_types::{BlockHeight, ChainID, Command, CryptoHash, ViewNumber},
};

/// A block in the block tree.
///
/// ## Parent and justify
///
/// `parent` is the block this block extends in the tree. `justify` certifies some ancestor of the
/// block; the block *directly* extends its justify's block when `justify.block == parent`. When one or
/// more views are skipped between `justify.view` and `height`, the gap is filled by
/// [filler blocks](Self::fillers) so that `height` always equals the block's depth in the tree.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub hash: CryptoHash,
    pub parent: CryptoHash,
    pub height: BlockHeight,
    pub command: Command,
    pub justify: QuorumCertificate,
}

impl Block {
    pub fn new(
        parent: CryptoHash,
        height: BlockHeight,
        command: Command,
        justify: QuorumCertificate,
    ) -> Block {
        Block {
            hash: Block::hash(&parent, height, &command, &justify),
            parent,
            height,
            command,
            justify,
        }
    }

    /// SHA256 over the Borsh serialization of every field except `hash` itself.
    pub fn hash(
        parent: &CryptoHash,
        height: BlockHeight,
        command: &Command,
        justify: &QuorumCertificate,
    ) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        // Writes into a hasher cannot fail.
        let _ = parent.serialize(&mut hasher);
        let _ = height.serialize(&mut hasher);
        let _ = command.serialize(&mut hasher);
        let _ = justify.serialize(&mut hasher);
        CryptoHash::new(hasher.finalize().into())
    }

    /// Checks if hash and justify are cryptographically correct, and that the block sits above the
    /// block its justify certifies.
    pub fn is_correct<C: ThresholdScheme>(&self, chain_id: ChainID, scheme: &C) -> bool {
        self.hash == Block::hash(&self.parent, self.height, &self.command, &self.justify)
            && self.height > self.justify.view
            && self.justify.is_correct(chain_id, scheme)
    }

    /// The most filler blocks a single block may imply. A block whose justify lags its height by more
    /// views than this is rejected.
    pub const MAX_FILLERS: u64 = 1 << 16;

    /// The number of filler blocks between `justify` and a block proposed in `view` carrying it.
    pub fn filler_count(justify: &QuorumCertificate, view: ViewNumber) -> u64 {
        view.int().saturating_sub(justify.view.int()).saturating_sub(1)
    }

    /// The empty blocks that fill the views skipped between `justify.view` and a block proposed in
    /// `view` carrying `justify`, in ascending order of height. `None` if there would be more than
    /// [`MAX_FILLERS`](Self::MAX_FILLERS) of them.
    ///
    /// The first filler extends `justify.block` and each subsequent filler extends the previous one.
    /// All fillers carry `justify` and an empty command. Fillers are a deterministic function of
    /// `justify` and `view`, so every replica derives exactly the same blocks.
    pub fn fillers(justify: &QuorumCertificate, view: ViewNumber) -> Option<Vec<Block>> {
        if Block::filler_count(justify, view) > Block::MAX_FILLERS {
            return None;
        }

        let mut fillers = Vec::new();
        let mut parent = justify.block;
        let mut height = justify.view + 1;
        while height < view {
            let filler = Block::new(parent, height, Command::empty(), justify.clone());
            parent = filler.hash;
            fillers.push(filler);
            height += 1;
        }
        Some(fillers)
    }

    /// The parent that a block proposed in `view` carrying `justify` must have: the last of its
    /// [`fillers`](Self::fillers), or `justify.block` if there are none.
    pub fn expected_parent(justify: &QuorumCertificate, view: ViewNumber) -> Option<CryptoHash> {
        Block::fillers(justify, view)
            .map(|fillers| fillers.last().map_or(justify.block, |filler| filler.hash))
    }

    /// Check whether this block has the parent its justify implies, given the block before it in a
    /// chain, if known.
    ///
    /// When `previous` is this block's parent, it is checked to be the filler right below this block
    /// rather than deriving every filler again. `previous` must itself have been checked this way.
    pub fn has_expected_parent(&self, previous: Option<&Block>) -> bool {
        if Block::filler_count(&self.justify, self.height) == 0 {
            return self.parent == self.justify.block;
        }
        match previous {
            Some(previous) if previous.hash == self.parent => {
                previous.height + 1 == self.height
                    && previous.command.is_empty()
                    && previous.justify == self.justify
            }
            _ => Block::expected_parent(&self.justify, self.height) == Some(self.parent),
        }
    }

    /// Check whether this block directly extends the block its justify certifies.
    pub fn directly_extends_justify(&self) -> bool {
        self.parent == self.justify.block
    }
}
