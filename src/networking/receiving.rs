/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions and types for receiving messages from the P2P network.

use std::{
    collections::{BTreeMap, VecDeque},
    mem,
    sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{
    block_sync::messages::{BlockSyncMessage, BlockSyncRequest, BlockSyncResponse},
    hotstuff::messages::HotStuffMessage,
    types::{
        data_types::{BufferSize, ViewNumber},
        validator_set::VerifyingKey,
    },
};

use super::{messages::Message, network::Network};

/// Spawn the poller thread, which polls the [`Network`] for messages and distributes them into receiver
/// handles.
///
/// The kinds of messages that the poller distributes are:
/// 1. HotStuff messages (processed by the [`algorithm`](crate::algorithm) thread),
/// 2. Block sync requests (processed by the [block sync server](crate::block_sync::server)), and
/// 3. Block sync responses (processed by the algorithm thread on behalf of the block sync client).
pub(crate) fn start_polling<N: Network + 'static>(
    mut network: N,
    shutdown_signal: Receiver<()>,
) -> (
    JoinHandle<()>,
    Receiver<(VerifyingKey, HotStuffMessage)>,
    Receiver<(VerifyingKey, BlockSyncRequest)>,
    Receiver<(VerifyingKey, BlockSyncResponse)>,
) {
    let (to_hotstuff_msg_receiver, hotstuff_msg_receiver) = mpsc::channel();
    let (to_sync_request_receiver, sync_request_receiver) = mpsc::channel();
    let (to_sync_response_receiver, sync_response_receiver) = mpsc::channel();

    let poller_thread = thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return,
            Err(TryRecvError::Empty) => (),
        }

        if let Some((origin, msg)) = network.recv() {
            match msg {
                Message::HotStuffMessage(h_msg) => {
                    let _ = to_hotstuff_msg_receiver.send((origin, h_msg));
                }
                Message::BlockSyncMessage(s_msg) => match s_msg {
                    BlockSyncMessage::BlockSyncRequest(s_req) => {
                        let _ = to_sync_request_receiver.send((origin, s_req));
                    }
                    BlockSyncMessage::BlockSyncResponse(s_res) => {
                        let _ = to_sync_response_receiver.send((origin, s_res));
                    }
                },
            }
        } else {
            thread::yield_now()
        }
    });
    (
        poller_thread,
        hotstuff_msg_receiver,
        sync_request_receiver,
        sync_response_receiver,
    )
}

/// A receiving end for [`HotStuffMessage`]s.
///
/// Messages are handed over in arrival order. View-aware filtering and buffering happens in the
/// [`HotStuff`](crate::hotstuff::implementation::HotStuff) state machine, which knows the current view.
pub(crate) struct ProgressMessageStub {
    receiver: Receiver<(VerifyingKey, HotStuffMessage)>,
}

impl ProgressMessageStub {
    pub(crate) fn new(receiver: Receiver<(VerifyingKey, HotStuffMessage)>) -> ProgressMessageStub {
        Self { receiver }
    }

    /// Receive the next message, waiting at most until `deadline`.
    pub(crate) fn recv(
        &self,
        deadline: Instant,
    ) -> Result<(VerifyingKey, HotStuffMessage), ProgressMessageReceiveError> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        match self.receiver.recv_timeout(timeout) {
            Ok(received) => Ok(received),
            Err(RecvTimeoutError::Timeout) => Err(ProgressMessageReceiveError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(ProgressMessageReceiveError::Disconnected),
        }
    }
}

#[derive(Debug)]
pub(crate) enum ProgressMessageReceiveError {
    Timeout,
    Disconnected,
}

/// Message buffer intended for storing received messages for future views.
///
/// Its size is bounded by its capacity, and when the capacity is reached messages for highest views may
/// be removed.
pub(crate) struct ProgressMessageBuffer<M: Cacheable> {
    buffer_capacity: BufferSize,
    buffer: BTreeMap<ViewNumber, VecDeque<(VerifyingKey, M)>>,
    buffer_size: BufferSize,
}

impl<M: Cacheable> ProgressMessageBuffer<M> {
    /// Create an empty message buffer.
    pub(crate) fn new(buffer_capacity: BufferSize) -> Self {
        Self {
            buffer_capacity,
            buffer: BTreeMap::new(),
            buffer_size: BufferSize::new(0),
        }
    }

    /// Try inserting the message into the buffer.
    /// In case caching the message makes the buffer grow beyond its capacity, this function either:
    /// 1. If the message's view is not lower than the highest view among the messages currently in the
    ///    buffer, drops the message, or
    /// 2. Otherwise, removes just enough highest-viewed messages from the buffer to make space for the new
    ///    message.
    ///
    /// Returns whether the message was inserted into the buffer.
    pub(crate) fn insert(&mut self, origin: VerifyingKey, msg: M) -> bool {
        let bytes_requested = mem::size_of::<VerifyingKey>() as u64 + msg.size();
        let buffer_will_be_overloaded = self
            .buffer_size
            .int()
            .checked_add(bytes_requested)
            .map_or(true, |new_size| new_size > self.buffer_capacity.int());

        if buffer_will_be_overloaded {
            let lower_than_max_view = self
                .buffer
                .keys()
                .next_back()
                .is_some_and(|max_view| msg.view() < *max_view);
            if !lower_than_max_view {
                return false;
            }
            self.remove_highest_viewed_msgs(bytes_requested);
        }

        self.buffer_size += bytes_requested;
        self.buffer
            .entry(msg.view())
            .or_default()
            .push_back((origin, msg));
        true
    }

    /// If there are messages for this view in the buffer, remove and return the message at the front
    /// of the queue.
    pub(crate) fn get_msg(&mut self, view: &ViewNumber) -> Option<(VerifyingKey, M)> {
        let msg_queue = self.buffer.get_mut(view)?;
        let (origin, msg) = msg_queue.pop_front()?;
        if msg_queue.is_empty() {
            self.buffer.remove(view);
        }
        self.buffer_size -= mem::size_of::<VerifyingKey>() as u64 + msg.size();
        Some((origin, msg))
    }

    /// Given the number of bytes that need to be removed, removes just enough highest-viewed messages
    /// to free up (at least) the required number of bytes in the buffer.
    fn remove_highest_viewed_msgs(&mut self, bytes_to_remove: u64) {
        let verifying_key_size = mem::size_of::<VerifyingKey>() as u64;

        let mut bytes_removed = 0;
        while bytes_removed < bytes_to_remove {
            let Some(mut last) = self.buffer.last_entry() else {
                break;
            };
            let msg_queue = last.get_mut();
            while bytes_removed < bytes_to_remove {
                match msg_queue.pop_back() {
                    Some((_, msg)) => bytes_removed += msg.size() + verifying_key_size,
                    None => break,
                }
            }
            if msg_queue.is_empty() {
                last.remove();
            }
        }

        self.buffer_size -= bytes_removed.min(self.buffer_size.int());
    }

    /// Remove all messages for views less than `cur_view`.
    pub(crate) fn remove_expired_msgs(&mut self, cur_view: ViewNumber) {
        let retained = self.buffer.split_off(&cur_view);
        let verifying_key_size = mem::size_of::<VerifyingKey>() as u64;
        let bytes_removed: u64 = self
            .buffer
            .values()
            .flatten()
            .map(|(_, msg)| msg.size() + verifying_key_size)
            .sum();
        self.buffer_size -= bytes_removed.min(self.buffer_size.int());
        self.buffer = retained;
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.buffer.values().map(VecDeque::len).sum()
    }
}

/// A cacheable message can be inserted into a [`ProgressMessageBuffer`].
///
/// For this, we require that:
/// 1. The message is associated with a view, and
/// 2. The approximate size of the message in memory can be computed.
pub(crate) trait Cacheable {
    fn view(&self) -> ViewNumber;
    fn size(&self) -> u64;
}

impl Cacheable for HotStuffMessage {
    fn view(&self) -> ViewNumber {
        HotStuffMessage::view(self)
    }

    fn size(&self) -> u64 {
        HotStuffMessage::size(self)
    }
}

/// A receiving end for sync responses, drained by the algorithm thread.
pub(crate) struct BlockSyncClientStub {
    responses: Receiver<(VerifyingKey, BlockSyncResponse)>,
}

impl BlockSyncClientStub {
    pub(crate) fn new(
        responses: Receiver<(VerifyingKey, BlockSyncResponse)>,
    ) -> BlockSyncClientStub {
        BlockSyncClientStub { responses }
    }

    /// Return a response that has already arrived, if any.
    pub(crate) fn try_recv_response(
        &self,
    ) -> Result<Option<(VerifyingKey, BlockSyncResponse)>, BlockSyncResponseReceiveError> {
        match self.responses.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(BlockSyncResponseReceiveError::Disconnected),
        }
    }
}

#[derive(Debug)]
pub(crate) enum BlockSyncResponseReceiveError {
    Disconnected,
}

/// A receiving end for sync requests, used by the [block sync server](crate::block_sync::server).
pub(crate) struct BlockSyncServerStub {
    requests: Receiver<(VerifyingKey, BlockSyncRequest)>,
}

impl BlockSyncServerStub {
    pub(crate) fn new(requests: Receiver<(VerifyingKey, BlockSyncRequest)>) -> Self {
        BlockSyncServerStub { requests }
    }

    /// Receive a request, waiting at most `timeout`.
    pub(crate) fn recv_request(
        &self,
        timeout: Duration,
    ) -> Result<(VerifyingKey, BlockSyncRequest), BlockSyncRequestReceiveError> {
        match self.requests.recv_timeout(timeout) {
            Ok(request) => Ok(request),
            Err(RecvTimeoutError::Timeout) => Err(BlockSyncRequestReceiveError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(BlockSyncRequestReceiveError::Disconnected),
        }
    }
}

#[derive(Debug)]
pub(crate) enum BlockSyncRequestReceiveError {
    Timeout,
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hotstuff::{messages::NewView, types::QuorumCertificate},
        types::{crypto_primitives::SigningKey, data_types::ChainID},
    };

    fn new_view_msg(view: u64) -> HotStuffMessage {
        HotStuffMessage::NewView(NewView {
            chain_id: ChainID::new(0),
            view: ViewNumber::new(view),
            high_qc: QuorumCertificate::genesis_qc(),
        })
    }

    fn origin() -> VerifyingKey {
        SigningKey::from_bytes(&[9; 32]).verifying_key()
    }

    fn entry_size() -> u64 {
        new_view_msg(0).size() + mem::size_of::<VerifyingKey>() as u64
    }

    #[test]
    fn returns_messages_per_view_in_arrival_order() {
        let mut buffer = ProgressMessageBuffer::new(BufferSize::new(10 * entry_size()));
        assert!(buffer.insert(origin(), new_view_msg(5)));
        assert!(buffer.insert(origin(), new_view_msg(4)));
        assert!(buffer.insert(origin(), new_view_msg(5)));
        assert_eq!(buffer.len(), 3);

        assert!(buffer.get_msg(&ViewNumber::new(6)).is_none());
        assert_eq!(
            buffer.get_msg(&ViewNumber::new(5)).unwrap().1.view(),
            ViewNumber::new(5)
        );

        buffer.remove_expired_msgs(ViewNumber::new(5));
        assert_eq!(buffer.len(), 1);
        assert!(buffer.get_msg(&ViewNumber::new(4)).is_none());
    }

    #[test]
    fn evicts_highest_views_first_when_full() {
        let mut buffer = ProgressMessageBuffer::new(BufferSize::new(2 * entry_size()));
        assert!(buffer.insert(origin(), new_view_msg(7)));
        assert!(buffer.insert(origin(), new_view_msg(9)));

        // Full, and not lower than the highest buffered view.
        assert!(!buffer.insert(origin(), new_view_msg(9)));

        // Full, but lower: makes space by evicting view 9.
        assert!(buffer.insert(origin(), new_view_msg(8)));
        assert!(buffer.get_msg(&ViewNumber::new(9)).is_none());
        assert!(buffer.get_msg(&ViewNumber::new(7)).is_some());
        assert!(buffer.get_msg(&ViewNumber::new(8)).is_some());
        assert_eq!(buffer.len(), 0);
    }
}
