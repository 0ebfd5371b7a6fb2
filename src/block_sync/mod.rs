/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Subprotocol that fetches the missing ancestors of a block the replica has to process.
//!
//! A replica can receive a proposal (or a QC) whose justify certifies a block it has never seen, for
//! example after a network partition heals or after it restarts. Instead of dropping such a message, the
//! replica asks the sender for the chain of blocks ending at the missing block.
//!
//! ## Fetching
//!
//! The [client](client) sends a [`BlockSyncRequest`](messages::BlockSyncRequest) naming the missing
//! block. The [server](server) of the peer responds with at most `limit` blocks of the chain that ends at
//! that block, oldest first. If the oldest returned block's parent is still unknown, the client requests
//! that parent in turn, until the fetched chain connects to the local block tree. Then the whole chain is
//! inserted and every justify in it is applied, in ascending order of height.
//!
//! ## Bounds
//!
//! A sync started in a view may run for at most one view timeout interval. A sync that overruns its
//! deadline is replaced by the next sync that is needed, and a sync in progress is abandoned when the
//! view times out. Responses that do not chain up to the requested block are rejected.

pub mod messages;

pub(crate) mod client;

pub mod server;
