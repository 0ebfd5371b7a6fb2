/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build, run, and initialize the storage of a replica.
//!
//! Each replica is uniquely identified by an [Ed25519 verifying key](ed25519_dalek::VerifyingKey), and
//! every replica in the validator set takes part in consensus.
//!
//! The key components of this module are:
//! - The builder-pattern interface to construct a [specification of the replica](ReplicaSpec) with:
//!   1. `ReplicaSpec::builder` to construct a `ReplicaSpecBuilder`,
//!   2. The setters of the `ReplicaSpecBuilder`, and
//!   3. The `ReplicaSpecBuilder::build` method to construct a [`ReplicaSpec`],
//! - The function to [start](ReplicaSpec::start) a [`Replica`] given its specification,
//! - The function to [initialize](Replica::initialize) the replica's block tree,
//! - [The type](Replica) which keeps the replica alive.
//!
//! ## Starting a replica
//!
//! ```ignore
//! let replica =
//!     ReplicaSpec::builder()
//!     .app(app)
//!     .network(network)
//!     .kv_store(kv_store)
//!     .configuration(configuration)
//!     .on_commit_block(commit_handler)
//!     .build()
//!     .start()?;
//! ```
//!
//! ### Required setters
//!
//! - `.app(...)`
//! - `.network(...)`
//! - `.kv_store(...)`
//! - `.configuration(...)`
//!
//! ### Optional setters
//!
//! The optional setters register user-defined handlers for the events in [`crate::events`], for
//! example `.on_insert_block(...)`, `.on_commit_block(...)`, `.on_view_timeout(...)` or
//! `.on_equivocation(...)`. There is one for every event type.
//!
//! The replica's [configuration](Configuration) can also be defined using the builder pattern:
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .me(signing_key)
//!     .chain_id(ChainID::new(0))
//!     .validator_set(validator_set)
//!     .initial_view_timeout(Duration::from_millis(500))
//!     .max_view_timeout(Duration::from_secs(30))
//!     .block_sync_request_limit(64)
//!     .progress_msg_buffer_capacity(BufferSize::new(1 << 20))
//!     .log_events(true)
//!     .build()
//! ```

use std::{
    sync::mpsc::{self, Sender},
    thread::JoinHandle,
    time::{Duration, Instant},
};

use typed_builder::TypedBuilder;

use crate::{
    algorithm::Algorithm,
    app::App,
    block_sync::server::{BlockSyncServer, BlockSyncServerConfiguration},
    block_tree::{
        accessors::{
            internal::{BlockTreeError, BlockTreeSingleton},
            public::BlockTreeCamera,
        },
        pluggables::KVStore,
    },
    event_bus::*,
    events::*,
    hotstuff::implementation::{HotStuff, HotStuffConfiguration, HotStuffError},
    networking::{
        network::Network,
        receiving::{start_polling, BlockSyncClientStub, ProgressMessageStub},
    },
    pacemaker::implementation::PacemakerConfiguration,
    types::{
        crypto_primitives::{SignatureSetScheme, SigningKey},
        data_types::{BufferSize, ChainID},
        validator_set::ValidatorSet,
    },
};

/// Stores the user-defined parameters required to start the replica.
///
/// ## Chain ID
///
/// Each replicated log should be identified by a [chain ID](crate::types::data_types::ChainID). It is
/// included in every signed vote and every message, so that messages and certificates for one chain are
/// never mistaken for those of another chain run by the same validators.
///
/// ## View timeouts
///
/// The timer of each view starts at `initial_view_timeout`. Each view timeout doubles it, up to
/// `max_view_timeout`, and each commit brings it back to `initial_view_timeout`.
///
/// ## Log Events
///
/// This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.me(...)`
    - `.chain_id(...)`
    - `.validator_set(...)`
    - `.initial_view_timeout(...)`
    - `.max_view_timeout(...)`
    - `.block_sync_request_limit(...)`
    - `.progress_msg_buffer_capacity(...)`
    - `.log_events(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the replica's signing key, used to sign votes. Required."))]
    pub me: SigningKey,
    #[builder(setter(doc = "Set the chain ID of the replicated log. Required."))]
    pub chain_id: ChainID,
    #[builder(setter(doc = "Set the validator set, identical on every replica. Required."))]
    pub validator_set: ValidatorSet,
    #[builder(setter(doc = "Set the timeout interval of the first view. Required."))]
    pub initial_view_timeout: Duration,
    #[builder(setter(doc = "Set the maximum timeout interval of a view. Required."))]
    pub max_view_timeout: Duration,
    #[builder(setter(
        doc = "Set the limit for the number of blocks exchanged in a single block sync request or response. Required."
    ))]
    pub block_sync_request_limit: u32,
    #[builder(setter(
        doc = "Set the maximum number of bytes of future-view proposals that can be buffered at any given moment. Required."
    ))]
    pub progress_msg_buffer_capacity: BufferSize,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
}

impl From<&Configuration> for HotStuffConfiguration {
    fn from(configuration: &Configuration) -> Self {
        HotStuffConfiguration {
            chain_id: configuration.chain_id,
            validator_set: configuration.validator_set.clone(),
            pacemaker: PacemakerConfiguration {
                initial_view_timeout: configuration.initial_view_timeout,
                max_view_timeout: configuration.max_view_timeout,
            },
            block_sync_request_limit: configuration.block_sync_request_limit,
            progress_msg_buffer_capacity: configuration.progress_msg_buffer_capacity,
        }
    }
}

/// Stores all necessary parameters and trait implementations required to run the [`Replica`].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ReplicaSpec]. On the builder call the following methods to construct a valid [ReplicaSpec].

    Required:
    - `.app(...)`
    - `.network(...)`
    - `.kv_store(...)`
    - `.configuration(...)`

    Optional: one `.on_*(...)` setter for every event type in [crate::events].
"))]
pub struct ReplicaSpec<K: KVStore, A: App + 'static, N: Network + 'static> {
    // Required parameters
    #[builder(setter(doc = "Set the state machine that executes committed commands. The argument must implement the [App](crate::app::App) trait. Required."))]
    app: A,
    #[builder(setter(doc = "Set the implementation of peer-to-peer networking. The argument must implement the [Network](crate::networking::network::Network) trait. Required."))]
    network: N,
    #[builder(setter(doc = "Set the implementation of the replica's Key-Value store. The argument must implement the [KVStore](crate::block_tree::pluggables::KVStore) trait. Required."))]
    kv_store: K,
    #[builder(setter(doc = "Set the [configuration](Configuration), which contains the necessary parameters to run a replica. Required."))]
    configuration: Configuration,
    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&InsertBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<InsertBlockEvent>),
    doc = "Register a handler closure to be invoked after a block is inserted into the block tree. Optional."))]
    on_insert_block: Option<HandlerPtr<InsertBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CommitBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitBlockEvent>),
    doc = "Register a handler closure to be invoked after a block is committed. Optional."))]
    on_commit_block: Option<HandlerPtr<CommitBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateHighestQCEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateHighestQCEvent>),
    doc = "Register a handler closure to be invoked after the replica updates its highest QC. Optional."))]
    on_update_highest_qc: Option<HandlerPtr<UpdateHighestQCEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateLockedQCEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateLockedQCEvent>),
    doc = "Register a handler closure to be invoked after the replica updates its locked QC. Optional."))]
    on_update_locked_qc: Option<HandlerPtr<UpdateLockedQCEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ProposeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ProposeEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a proposal. Optional."))]
    on_propose: Option<HandlerPtr<ProposeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&VoteEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<VoteEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a vote. Optional."))]
    on_vote: Option<HandlerPtr<VoteEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&NewViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<NewViewEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a new view message to the next leader. Optional."))]
    on_new_view: Option<HandlerPtr<NewViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveProposalEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveProposalEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a proposal. Optional."))]
    on_receive_proposal: Option<HandlerPtr<ReceiveProposalEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveVoteEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveVoteEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a vote. Optional."))]
    on_receive_vote: Option<HandlerPtr<ReceiveVoteEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveNewViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveNewViewEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a new view message. Optional."))]
    on_receive_new_view: Option<HandlerPtr<ReceiveNewViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartViewEvent>),
    doc = "Register a handler closure to be invoked after the replica enters a new view. Optional."))]
    on_start_view: Option<HandlerPtr<StartViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ViewTimeoutEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ViewTimeoutEvent>),
    doc = "Register a handler closure to be invoked after the replica's view times out. Optional."))]
    on_view_timeout: Option<HandlerPtr<ViewTimeoutEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CollectQCEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CollectQCEvent>),
    doc = "Register a handler closure to be invoked after the replica collects a new quorum certificate. Optional."))]
    on_collect_qc: Option<HandlerPtr<CollectQCEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&EquivocationEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EquivocationEvent>),
    doc = "Register a handler closure to be invoked after the replica detects a leader or a voter equivocating. Optional."))]
    on_equivocation: Option<HandlerPtr<EquivocationEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&InvalidMessageEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<InvalidMessageEvent>),
    doc = "Register a handler closure to be invoked after the replica drops an invalid message. Optional."))]
    on_invalid_message: Option<HandlerPtr<InvalidMessageEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartSyncEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartSyncEvent>),
    doc = "Register a handler closure to be invoked after the replica starts fetching missing blocks. Optional."))]
    on_start_sync: Option<HandlerPtr<StartSyncEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&EndSyncEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EndSyncEvent>),
    doc = "Register a handler closure to be invoked after the replica inserts the blocks it fetched. Optional."))]
    on_end_sync: Option<HandlerPtr<EndSyncEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveSyncRequestEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveSyncRequestEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a sync request from a peer. Optional."))]
    on_receive_sync_request: Option<HandlerPtr<ReceiveSyncRequestEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SendSyncResponseEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SendSyncResponseEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a sync response to a peer. Optional."))]
    on_send_sync_response: Option<HandlerPtr<SendSyncResponseEvent>>,
}

impl<K: KVStore, A: App + 'static, N: Network + 'static> ReplicaSpec<K, A, N> {
    /// Starts all threads and channels associated with running a replica, and returns the handles to them
    /// in a [`Replica`] struct.
    ///
    /// # Errors
    ///
    /// Returns an error if the block tree cannot be read from or initialized in `kv_store`.
    pub fn start(mut self) -> Result<Replica<K>, HotStuffError> {
        self.network
            .init_validator_set(self.configuration.validator_set.clone());

        let hotstuff_config = HotStuffConfiguration::from(&self.configuration);
        let block_sync_server_config = BlockSyncServerConfiguration {
            chain_id: self.configuration.chain_id,
            request_limit: self.configuration.block_sync_request_limit,
        };
        let scheme = SignatureSetScheme::new(
            self.configuration.me.clone(),
            self.configuration.validator_set.clone(),
        );

        let event_handlers = self.event_handlers();
        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            let (publisher, subscriber) = mpsc::channel();
            (Some(publisher), Some(subscriber))
        } else {
            (None, None)
        };

        let hotstuff = HotStuff::new(
            hotstuff_config,
            self.kv_store.clone(),
            self.network.clone(),
            self.app,
            scheme,
            event_publisher.clone(),
            Instant::now(),
        )?;

        let (poller_shutdown, poller_shutdown_receiver) = mpsc::channel();
        let (poller, hotstuff_msgs, block_sync_requests, block_sync_responses) =
            start_polling(self.network.clone(), poller_shutdown_receiver);

        let (block_sync_server_shutdown, block_sync_server_shutdown_receiver) = mpsc::channel();
        let block_sync_server = BlockSyncServer::new(
            block_sync_server_config,
            BlockTreeCamera::new(self.kv_store.clone()),
            block_sync_requests,
            self.network,
            block_sync_server_shutdown_receiver,
            event_publisher,
        )
        .start();

        let (algorithm_shutdown, algorithm_shutdown_receiver) = mpsc::channel();
        let algorithm = Algorithm::new(
            hotstuff,
            ProgressMessageStub::new(hotstuff_msgs),
            BlockSyncClientStub::new(block_sync_responses),
            algorithm_shutdown_receiver,
        )
        .start();

        let (event_bus, event_bus_shutdown) = match event_subscriber {
            Some(event_subscriber) => {
                let (shutdown, shutdown_receiver) = mpsc::channel();
                (
                    Some(start_event_bus(
                        event_handlers,
                        event_subscriber,
                        shutdown_receiver,
                    )),
                    Some(shutdown),
                )
            }
            None => (None, None),
        };

        Ok(Replica {
            block_tree_camera: BlockTreeCamera::new(self.kv_store),
            poller: Some(poller),
            poller_shutdown,
            algorithm: Some(algorithm),
            algorithm_shutdown,
            block_sync_server: Some(block_sync_server),
            block_sync_server_shutdown,
            event_bus,
            event_bus_shutdown,
        })
    }

    /// Move the registered handlers into an [`EventHandlers`], with the default loggers in front of them
    /// if `log_events` is set.
    fn event_handlers(&mut self) -> EventHandlers {
        let mut handlers = EventHandlers::default();
        handlers.insert_block_handlers.extend(self.on_insert_block.take());
        handlers.commit_block_handlers.extend(self.on_commit_block.take());
        handlers.update_highest_qc_handlers.extend(self.on_update_highest_qc.take());
        handlers.update_locked_qc_handlers.extend(self.on_update_locked_qc.take());
        handlers.propose_handlers.extend(self.on_propose.take());
        handlers.vote_handlers.extend(self.on_vote.take());
        handlers.new_view_handlers.extend(self.on_new_view.take());
        handlers.receive_proposal_handlers.extend(self.on_receive_proposal.take());
        handlers.receive_vote_handlers.extend(self.on_receive_vote.take());
        handlers.receive_new_view_handlers.extend(self.on_receive_new_view.take());
        handlers.start_view_handlers.extend(self.on_start_view.take());
        handlers.view_timeout_handlers.extend(self.on_view_timeout.take());
        handlers.collect_qc_handlers.extend(self.on_collect_qc.take());
        handlers.equivocation_handlers.extend(self.on_equivocation.take());
        handlers.invalid_message_handlers.extend(self.on_invalid_message.take());
        handlers.start_sync_handlers.extend(self.on_start_sync.take());
        handlers.end_sync_handlers.extend(self.on_end_sync.take());
        handlers.receive_sync_request_handlers.extend(self.on_receive_sync_request.take());
        handlers.send_sync_response_handlers.extend(self.on_send_sync_response.take());

        if self.configuration.log_events {
            handlers.add_loggers();
        }
        handlers
    }
}

/// A handle to the background threads of a replica. When this value is dropped, all background threads
/// are gracefully shut down.
pub struct Replica<K: KVStore> {
    block_tree_camera: BlockTreeCamera<K>,
    poller: Option<JoinHandle<()>>,
    poller_shutdown: Sender<()>,
    algorithm: Option<JoinHandle<()>>,
    algorithm_shutdown: Sender<()>,
    block_sync_server: Option<JoinHandle<()>>,
    block_sync_server_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl<K: KVStore> Replica<K> {
    /// Write the genesis replica state into `kv_store`, unless it has been written before.
    pub fn initialize(kv_store: K) -> Result<(), BlockTreeError> {
        let mut block_tree = BlockTreeSingleton::new(kv_store);
        block_tree.initialize()
    }

    /// Returns a [`BlockTreeCamera`] which can be used to peek into the block tree.
    pub fn block_tree_camera(&self) -> &BlockTreeCamera<K> {
        &self.block_tree_camera
    }
}

impl<K: KVStore> Drop for Replica<K> {
    fn drop(&mut self) {
        // The order of thread shutdown in this function is important, as the threads make assumptions about
        // the validity of their channels based on this. The algorithm and sync server threads receive messages
        // from the poller, and assume that the poller will live longer than them.
        //
        // A thread that has already exited (e.g., the algorithm thread after a storage failure) has dropped
        // its shutdown receiver, so send errors are ignored.

        if let Some(shutdown) = &self.event_bus_shutdown {
            let _ = shutdown.send(());
        }
        if let Some(event_bus) = self.event_bus.take() {
            let _ = event_bus.join();
        }

        let _ = self.algorithm_shutdown.send(());
        if let Some(algorithm) = self.algorithm.take() {
            let _ = algorithm.join();
        }

        let _ = self.block_sync_server_shutdown.send(());
        if let Some(block_sync_server) = self.block_sync_server.take() {
            let _ = block_sync_server.join();
        }

        let _ = self.poller_shutdown.send(());
        if let Some(poller) = self.poller.take() {
            let _ = poller.join();
        }
    }
}
