/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The persistent state of a replica.
//!
//! # The Block Tree
//!
//! A block tree is an append-only, content-addressed tree of [Blocks](crate::types::block::Block)
//! rooted at a virtual genesis block. Blocks are addressed by their hash, and every block points to
//! its `parent` by hash, so ancestor walks are plain key lookups and survive process restarts.
//!
//! Block trees are very "narrow": below the highest committed block there is exactly one chain, and
//! only the speculative part of the tree above it may branch. Blocks are never pruned.
//!
//! # Beyond the Block Tree
//!
//! The `block_tree` module also stores the [`ReplicaState`](replica_state::ReplicaState): the current
//! view, the locked and highest QCs, the last voted height, and the leaf block. The rules that keep
//! updates to this state safe are implemented in [`invariants`]. The documentation for the
//! [`variables`] submodule lists everything stored by the `block_tree` module.
//!
//! # Pluggable persistence
//!
//! - The block tree is kept in persistent storage, most probably in the host's filesystem.
//! - Library users get to choose how exactly this is done by implementing the traits in
//!   [`pluggables`] on top of a key-value store with atomic, batched writes.
//!
//! # Accessing the Block Tree
//!
//! Implementations of the pluggable persistence traits get wrapped inside block tree [`accessors`],
//! which put the variables in the right places in the key-value store.

pub mod accessors;

pub mod invariants;

pub mod pluggables;

pub mod replica_state;

pub mod variables;
