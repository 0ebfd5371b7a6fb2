//! [`Node`], a replica running on its own threads behind a [`ChannelNetwork`].

use std::time::Duration;

use chained_hotstuff::{
    events::{CommitBlockEvent, StartViewEvent, ViewTimeoutEvent},
    replica::{Configuration, Replica, ReplicaSpec},
    types::{
        block::Block,
        crypto_primitives::SigningKey,
        data_types::{BlockHeight, BufferSize, ChainID},
        validator_set::ValidatorSet,
    },
};

use crate::common::{mem_db::MemDB, network::ChannelNetwork, recording_app::RecordingApp};

use super::logging::log_replica;

/// Things the Nodes will have in common:
/// - Validator Set.
/// - Configuration.
///
/// Things that they will differ in:
/// - App instance.
/// - Network instance.
/// - KVStore.
/// - Keypair.
pub(crate) struct Node {
    app: RecordingApp,
    replica: Replica<MemDB>,
}

impl Node {
    pub(crate) fn new(
        index: usize,
        keypair: SigningKey,
        network: ChannelNetwork,
        validator_set: ValidatorSet,
    ) -> Node {
        let kv_store = MemDB::new();
        Replica::initialize(kv_store.clone()).unwrap();

        let verifying_key = keypair.verifying_key().to_bytes();
        let app = RecordingApp::new(index);

        let configuration = Configuration::builder()
            .me(keypair)
            .chain_id(ChainID::new(0))
            .validator_set(validator_set)
            .initial_view_timeout(Duration::from_millis(500))
            .max_view_timeout(Duration::from_secs(8))
            .block_sync_request_limit(10)
            .progress_msg_buffer_capacity(BufferSize::new(1024 * 1024))
            .log_events(false)
            .build();

        let replica = ReplicaSpec::builder()
            .app(app.clone())
            .network(network)
            .kv_store(kv_store)
            .configuration(configuration)
            .on_commit_block(commit_block_handler(verifying_key))
            .on_start_view(start_view_handler(verifying_key))
            .on_view_timeout(view_timeout_handler(verifying_key))
            .build()
            .start()
            .unwrap();

        Node { app, replica }
    }

    pub(crate) fn highest_committed_height(&self) -> Option<BlockHeight> {
        self.replica
            .block_tree_camera()
            .snapshot()
            .highest_committed_block_height()
            .unwrap()
    }

    pub(crate) fn committed_chain(&self) -> Vec<Block> {
        self.replica
            .block_tree_camera()
            .snapshot()
            .committed_chain()
            .unwrap()
    }

    pub(crate) fn app(&self) -> &RecordingApp {
        &self.app
    }
}

fn commit_block_handler(verifying_key: [u8; 32]) -> impl Fn(&CommitBlockEvent) + Send + 'static {
    move |commit_block_event| {
        log_replica(
            Some(&verifying_key),
            &format!("Committed block at height {}", commit_block_event.height),
        )
    }
}

fn start_view_handler(verifying_key: [u8; 32]) -> impl Fn(&StartViewEvent) + Send + 'static {
    move |start_view_event| {
        log_replica(
            Some(&verifying_key),
            &format!("Started view {}", start_view_event.view),
        )
    }
}

fn view_timeout_handler(verifying_key: [u8; 32]) -> impl Fn(&ViewTimeoutEvent) + Send + 'static {
    move |view_timeout_event| {
        log_replica(
            Some(&verifying_key),
            &format!(
                "View {} timed out after {:?}",
                view_timeout_event.view, view_timeout_event.timeout
            ),
        )
    }
}
