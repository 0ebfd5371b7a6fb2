/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Subprotocol for view synchronization and leader selection.
//!
//! # View synchronization
//!
//! Chained HotStuff can only make progress if a quorum of replicas spend long enough in the same view for
//! the leader of that view to gather their votes. The Pacemaker gets replicas into the same view using
//! two mechanisms:
//! 1. **Progress**: a replica that votes in view `v`, or sees a QC for view `v`, moves to `v + 1` right
//!    away. In the steady state, views move exactly as fast as the network delivers proposals and votes.
//! 2. **Timeouts**: every view has a timer. When it fires before the view made progress, the replica
//!    moves to the next view and sends a [`NewView`](crate::hotstuff::messages::NewView) carrying its
//!    highest QC to the leader of that view.
//!
//! ## Exponential backoff
//!
//! Every timeout doubles the timeout interval used for the following views. Message delays are bounded
//! only after an unknown stabilization point, by an unknown bound; doubling means that some interval
//! eventually exceeds the bound, and from then on correct replicas stay in the same view long enough
//! for a correct leader to drive a decision. The interval is capped at a configured maximum, and goes
//! back to its initial value when the replica commits a block.
//!
//! Entering a new view always restarts the timer, which cancels the timer of the view being left. A
//! late timer never fires for a view the replica has already left.
//!
//! ## New-view hand-off
//!
//! The leader of view `v` can propose as soon as it holds a QC for view `v - 1`. In the steady state it
//! has one, because the votes for the proposal of `v - 1` are sent to it. Otherwise it waits until it
//! has received `NewView` messages for `v` from a quorum of validators, picks the highest QC among
//! them, and extends it. A quorum of `NewView`s for a view above the leader's current view also pulls
//! the leader into that view.
//!
//! # Leader Selection
//!
//! Leaders are selected round-robin in validator set order: the leader of view `v` is the validator at
//! position `v mod n`. Every replica computes the same schedule without exchanging messages.

pub mod implementation;

pub(crate) mod types;
