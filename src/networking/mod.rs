/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable peer-to-peer (P2P) networking.
//!
//! The consensus core only needs a non-blocking point-to-point `send` and a `broadcast` from the network
//! provider, together with a way to receive messages tagged with the verifying key of their sender. Library
//! users provide these by implementing the [`Network`](network::Network) trait.

pub mod network;

pub mod messages;

pub(crate) mod receiving;

pub(crate) mod sending;
