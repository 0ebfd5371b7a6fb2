/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The algorithm thread, the driving force of a replica.
//!
//! The thread owns the [`HotStuff`] state machine and is the only writer of the block tree. Its loop
//! checks the view timer, applies block sync responses, and waits for the next HotStuff message until
//! either one arrives or the view deadline comes.
//!
//! A storage failure is fatal: the thread logs it and exits, and the replica stops taking part in
//! consensus until it is restarted.

use std::{
    sync::mpsc::{Receiver, TryRecvError},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{
    app::App,
    block_tree::pluggables::KVStore,
    hotstuff::implementation::{HotStuff, HotStuffError},
    networking::{
        network::Network,
        receiving::{BlockSyncClientStub, ProgressMessageReceiveError, ProgressMessageStub},
    },
    types::crypto_primitives::ThresholdScheme,
};

/// Upper bound on how long the thread waits for a message before it checks for sync responses and the
/// shutdown signal again.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub(crate) struct Algorithm<K: KVStore, N: Network, A: App, C: ThresholdScheme> {
    hotstuff: HotStuff<K, N, A, C>,
    progress_msg_stub: ProgressMessageStub,
    block_sync_client_stub: BlockSyncClientStub,
    shutdown_signal: Receiver<()>,
}

impl<K: KVStore, N: Network + 'static, A: App + 'static, C: ThresholdScheme> Algorithm<K, N, A, C> {
    pub(crate) fn new(
        hotstuff: HotStuff<K, N, A, C>,
        progress_msg_stub: ProgressMessageStub,
        block_sync_client_stub: BlockSyncClientStub,
        shutdown_signal: Receiver<()>,
    ) -> Self {
        Self {
            hotstuff,
            progress_msg_stub,
            block_sync_client_stub,
            shutdown_signal,
        }
    }

    pub(crate) fn start(mut self) -> JoinHandle<()> {
        thread::spawn(move || {
            if let Err(err) = self.execute() {
                log::error!("Replica halted: {}", err);
            }
        })
    }

    fn execute(&mut self) -> Result<(), HotStuffError> {
        self.hotstuff.start(Instant::now())?;

        loop {
            match self.shutdown_signal.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => return Ok(()),
                Err(TryRecvError::Empty) => (),
            }

            // 1. Check whether the view timer has fired.
            self.hotstuff.tick(Instant::now())?;

            // 2. Apply block sync responses.
            while let Ok(Some((origin, response))) = self.block_sync_client_stub.try_recv_response()
            {
                self.hotstuff
                    .on_receive_block_sync_response(origin, response, Instant::now())?;
            }

            // 3. Wait for the next message, but not beyond the view deadline.
            let deadline = self
                .hotstuff
                .view_deadline()
                .min(Instant::now() + POLL_INTERVAL);
            match self.progress_msg_stub.recv(deadline) {
                Ok((origin, msg)) => self.hotstuff.on_receive_msg(origin, msg, Instant::now())?,
                Err(ProgressMessageReceiveError::Timeout) => (),
                Err(ProgressMessageReceiveError::Disconnected) => return Ok(()),
            }
        }
    }
}
