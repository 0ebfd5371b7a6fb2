/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for structured messages that are sent between replicas as part of the block sync
//! protocol.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    block::Block,
    data_types::{ChainID, CryptoHash},
};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum BlockSyncMessage {
    BlockSyncRequest(BlockSyncRequest),
    BlockSyncResponse(BlockSyncResponse),
}

impl BlockSyncMessage {
    pub fn block_sync_request(chain_id: ChainID, block: CryptoHash, limit: u32) -> BlockSyncMessage {
        BlockSyncMessage::BlockSyncRequest(BlockSyncRequest {
            chain_id,
            block,
            limit,
        })
    }

    pub fn block_sync_response(chain_id: ChainID, blocks: Vec<Block>) -> BlockSyncMessage {
        BlockSyncMessage::BlockSyncResponse(BlockSyncResponse { chain_id, blocks })
    }
}

/// Asks for at most `limit` blocks of the chain ending at `block`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BlockSyncRequest {
    pub chain_id: ChainID,
    pub block: CryptoHash,
    pub limit: u32,
}

/// The chain requested by a [`BlockSyncRequest`], from the lowest block to the requested block.
/// Empty if the server does not know the requested block.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BlockSyncResponse {
    pub chain_id: ChainID,
    pub blocks: Vec<Block>,
}
