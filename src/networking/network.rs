/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`Network`] trait.

use crate::types::validator_set::{ValidatorSet, VerifyingKey};

use super::messages::Message;

/// A handle to the network provider.
///
/// Both sending methods are fire-and-forget: they must return without waiting for the message to be
/// delivered, so that a slow or Byzantine peer can never stall the replica. Delivery is best-effort;
/// the protocol tolerates lost messages through view timeouts and block sync.
///
/// The origin returned by [`recv`](Network::recv) must be authenticated by the network provider. A
/// replica trusts it when deciding who sent a `Proposal` or a `NewView`.
pub trait Network: Clone + Send {
    /// Inform the network provider of the validator set on wake-up.
    fn init_validator_set(&mut self, validator_set: ValidatorSet);

    /// Send a message to all peers other than the local replica without blocking.
    fn broadcast(&mut self, message: Message);

    /// Send a message to the specified peer without blocking.
    fn send(&mut self, peer: VerifyingKey, message: Message);

    /// Receive a message from any peer. Returns immediately with a None if no message is available now.
    fn recv(&mut self) -> Option<(VerifyingKey, Message)>;
}
