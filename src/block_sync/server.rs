/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Implements the [`BlockSyncServer`], which answers the block sync requests of other replicas.
//!
//! The server runs on its own thread and reads the block tree through a
//! [`BlockTreeCamera`](crate::block_tree::accessors::public::BlockTreeCamera), so serving requests
//! never blocks the algorithm thread. The number of blocks sent back in a response is the smaller of
//! the limit in the request and the limit configured on the server.

use std::{
    sync::mpsc::{Receiver, Sender, TryRecvError},
    thread::{self, JoinHandle},
    time::{Duration, SystemTime},
};

use crate::{
    block_tree::{
        accessors::{
            internal::BlockTreeError,
            public::{BlockTreeCamera, BlockTreeSnapshot},
        },
        pluggables::{KVGet, KVStore},
    },
    events::{Event, ReceiveSyncRequestEvent, SendSyncResponseEvent},
    networking::{
        network::Network,
        receiving::{BlockSyncRequestReceiveError, BlockSyncServerStub},
        sending::SenderHandle,
    },
    types::{data_types::ChainID, validator_set::VerifyingKey},
};

use super::messages::{BlockSyncRequest, BlockSyncResponse};

pub(crate) struct BlockSyncServer<N: Network + 'static, K: KVStore> {
    config: BlockSyncServerConfiguration,
    block_tree_camera: BlockTreeCamera<K>,
    receiver: BlockSyncServerStub,
    sender: SenderHandle<N>,
    shutdown_signal: Receiver<()>,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network + 'static, K: KVStore> BlockSyncServer<N, K> {
    pub(crate) fn new(
        config: BlockSyncServerConfiguration,
        block_tree_camera: BlockTreeCamera<K>,
        requests: Receiver<(VerifyingKey, BlockSyncRequest)>,
        network: N,
        shutdown_signal: Receiver<()>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            config,
            block_tree_camera,
            receiver: BlockSyncServerStub::new(requests),
            sender: SenderHandle::new(network),
            shutdown_signal,
            event_publisher,
        }
    }

    pub(crate) fn start(mut self) -> JoinHandle<()> {
        thread::spawn(move || loop {
            match self.shutdown_signal.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => (),
            }

            let (origin, request) = match self.receiver.recv_request(Duration::from_millis(50)) {
                Ok(received) => received,
                Err(BlockSyncRequestReceiveError::Timeout) => continue,
                Err(BlockSyncRequestReceiveError::Disconnected) => return,
            };
            self.on_receive_request(origin, request);
        })
    }

    fn on_receive_request(&mut self, origin: VerifyingKey, request: BlockSyncRequest) {
        if request.chain_id != self.config.chain_id {
            return;
        }

        Event::ReceiveSyncRequest(ReceiveSyncRequestEvent {
            timestamp: SystemTime::now(),
            peer: origin,
            block: request.block,
            limit: request.limit,
        })
        .publish(&self.event_publisher);

        let snapshot = self.block_tree_camera.snapshot();
        match respond(&snapshot, &request, self.config.request_limit) {
            Ok(response) => {
                let blocks = response.blocks.clone();
                self.sender.send(origin, response);
                Event::SendSyncResponse(SendSyncResponseEvent {
                    timestamp: SystemTime::now(),
                    peer: origin,
                    blocks,
                })
                .publish(&self.event_publisher)
            }
            Err(err) => log::error!("Block sync server failed to read the block tree: {}", err),
        }
    }
}

/// Compute the response to `request` from the blocks in `snapshot`, sending back at most
/// `server_limit` blocks.
pub fn respond<S: KVGet>(
    snapshot: &BlockTreeSnapshot<S>,
    request: &BlockSyncRequest,
    server_limit: u32,
) -> Result<BlockSyncResponse, BlockTreeError> {
    let blocks = snapshot.chain_ending_at(&request.block, request.limit.min(server_limit))?;
    Ok(BlockSyncResponse {
        chain_id: request.chain_id,
        blocks,
    })
}

/// Immutable parameters that define the behaviour of the [`BlockSyncServer`].
pub(crate) struct BlockSyncServerConfiguration {
    pub(crate) chain_id: ChainID,
    pub(crate) request_limit: u32,
}
