/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Exhaustive enumeration of every message variant exchanged by replicas.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    block_sync::messages::{BlockSyncMessage, BlockSyncRequest, BlockSyncResponse},
    hotstuff::messages::{HotStuffMessage, NewView, Proposal, Vote},
};

/// All message variants exchanged by replicas.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Message {
    /// See: [`HotStuffMessage`]. Processed by the [`algorithm`](crate::algorithm) thread.
    HotStuffMessage(HotStuffMessage),

    /// See: [`BlockSyncMessage`]. Requests are processed by the
    /// [block sync server](crate::block_sync::server), responses by the algorithm thread.
    BlockSyncMessage(BlockSyncMessage),
}

impl From<HotStuffMessage> for Message {
    fn from(value: HotStuffMessage) -> Self {
        Message::HotStuffMessage(value)
    }
}

impl From<Proposal> for Message {
    fn from(value: Proposal) -> Self {
        Message::HotStuffMessage(HotStuffMessage::Proposal(value))
    }
}

impl From<Vote> for Message {
    fn from(value: Vote) -> Self {
        Message::HotStuffMessage(HotStuffMessage::Vote(value))
    }
}

impl From<NewView> for Message {
    fn from(value: NewView) -> Self {
        Message::HotStuffMessage(HotStuffMessage::NewView(value))
    }
}

impl From<BlockSyncRequest> for Message {
    fn from(value: BlockSyncRequest) -> Self {
        Message::BlockSyncMessage(BlockSyncMessage::BlockSyncRequest(value))
    }
}

impl From<BlockSyncResponse> for Message {
    fn from(value: BlockSyncResponse) -> Self {
        Message::BlockSyncMessage(BlockSyncMessage::BlockSyncResponse(value))
    }
}
