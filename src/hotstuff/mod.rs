/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Subprotocol for committing `Block`s: chained HotStuff.
//!
//! ## Pipelining
//!
//! Every view has a single leader, which proposes one block. The block carries a QC (its *justify*) for
//! the block of an earlier view, so every QC does triple duty: it certifies one block, locks the block's
//! parent chain, and may commit a block further back. A replica that votes for a block effectively votes
//! for its ancestors too.
//!
//! A view in the steady state proceeds as follows:
//! 1. The leader of view `v` proposes a block with its highest QC as the justify of the block.
//! 2. Replicas check the [`Proposal`](messages::Proposal), insert the block, and apply the state updates
//!    implied by the block's justify: updating the highest QC, updating the locked QC, and committing a
//!    great-grandparent block. If the block is safe to vote for, they send a [`Vote`](messages::Vote) to
//!    the leader of view `v + 1` and move to view `v + 1`.
//! 3. The leader of view `v + 1` [aggregates](aggregator) the votes into a QC, and proposes a block that
//!    extends it.
//!
//! ## Locking and committing
//!
//! Say a replica sees a QC `qc` for block `b''`, whose justify certifies `b'`, whose justify in turn
//! certifies `b`. Then:
//! - The replica locks on `b''.justify`, if it is from a higher view than its current lock.
//! - If `b''` directly extends `b'` and `b'` directly extends `b`, the replica commits `b` and every
//!   uncommitted ancestor of `b`, and executes them from the lowest to the highest.
//!
//! A replica only votes for a block that either extends the block of its locked QC, or whose justify is
//! from a higher view than its locked QC.
//!
//! ## Skipped views
//!
//! When a view ends without a QC, the next leader extends a QC from an older view. So that a block's
//! height always equals the view it was proposed in, the skipped heights are filled with
//! [filler blocks](crate::types::block::Block::fillers), which every replica derives deterministically
//! from the justify. Fillers carry no command.

pub mod aggregator;

pub mod implementation;

pub mod messages;

pub(crate) mod roles;

pub mod types;
