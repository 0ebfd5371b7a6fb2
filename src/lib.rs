/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A pipelined, chained HotStuff consensus core.
//!
//! A set of `n = 3f + 1` replicas, at most `f` of them Byzantine, agree on a single growing chain of
//! blocks. Each block carries an opaque [command](types::data_types::Command), and every correct replica
//! hands the committed commands to its [`App`](app::App) in the same order. Safety holds under
//! asynchrony; progress is made once message delays become bounded.
//!
//! ## Components
//!
//! - [`block_tree`]: the persistent tree of blocks together with the replica state (current view, locked
//!   QC, highest QC, last voted height), and the safety rules that decide when to vote, lock and commit.
//! - [`hotstuff`]: the message handlers of the chained HotStuff protocol, and the aggregator that turns
//!   votes into quorum certificates.
//! - [`pacemaker`]: view timers with exponential backoff, the new-view hand-off, and leader selection.
//! - [`block_sync`]: fetching of missing ancestors from peers.
//! - [`networking`] and [`app`]: the traits library users implement to plug in their network and state
//!   machine. Storage is plugged in through [`KVStore`](block_tree::pluggables::KVStore), and the
//!   signature scheme through [`ThresholdScheme`](types::crypto_primitives::ThresholdScheme).
//! - [`replica`]: builds and runs a replica on background threads.
//! - [`events`]: notifications that library users can subscribe to.

pub mod app;

pub mod block_sync;

pub mod block_tree;

pub mod events;

pub mod hotstuff;

pub mod networking;

pub mod pacemaker;

pub mod replica;

pub mod types;

pub(crate) mod algorithm;

pub(crate) mod event_bus;

pub(crate) mod logging;
