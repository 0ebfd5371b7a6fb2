//! A deterministic, single-threaded simulation of a set of replicas.
//!
//! Every replica is a [`HotStuff`] state machine driven directly by the simulation, in virtual time:
//! nothing sleeps, and two simulations created with the same seed and driven in the same way make
//! exactly the same moves. Messages are delivered after a random latency, may be dropped, and never
//! cross partition boundaries. Block sync requests are answered by the simulation on behalf of the
//! requested replica, from that replica's store.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
    sync::{
        mpsc::{self, Receiver},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use chained_hotstuff::{
    block_sync::{messages::BlockSyncMessage, server::respond},
    block_tree::accessors::public::BlockTreeCamera,
    events::{Event, InvalidMessageReason},
    hotstuff::{
        implementation::{HotStuff, HotStuffConfiguration, HotStuffError},
        messages::{HotStuffMessage, Proposal},
    },
    networking::{messages::Message, network::Network},
    pacemaker::implementation::PacemakerConfiguration,
    types::{
        block::Block,
        crypto_primitives::SigningKey,
        data_types::{BlockHeight, BufferSize, ChainID, Command, ViewNumber},
        validator_set::{ValidatorSet, VerifyingKey},
    },
};
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{mem_db::MemDB, recording_app::RecordingApp, scheme::HashScheme};

pub(crate) type SimReplica = HotStuff<MemDB, SimNetwork, RecordingApp, HashScheme>;

pub(crate) const CHAIN_ID: ChainID = ChainID::new(0);

/// Parameters of a [`Simulation`].
#[derive(Clone, Copy, Debug)]
pub(crate) struct SimConfig {
    pub(crate) replicas: usize,
    pub(crate) seed: u64,
    pub(crate) initial_view_timeout: Duration,
    pub(crate) max_view_timeout: Duration,
    pub(crate) min_latency: Duration,
    pub(crate) max_latency: Duration,
    /// Probability that any single message is lost.
    pub(crate) drop_rate: f64,
    pub(crate) block_sync_request_limit: u32,
}

impl SimConfig {
    pub(crate) fn new(replicas: usize, seed: u64) -> SimConfig {
        SimConfig {
            replicas,
            seed,
            initial_view_timeout: Duration::from_millis(200),
            max_view_timeout: Duration::from_secs(10),
            min_latency: Duration::from_millis(1),
            max_latency: Duration::from_millis(20),
            drop_rate: 0.0,
            block_sync_request_limit: 8,
        }
    }
}

enum Destination {
    One(VerifyingKey),
    All,
}

struct Outgoing {
    from: VerifyingKey,
    to: Destination,
    message: Message,
}

/// The [`Network`] given to each simulated replica. Sending only records the message; the simulation
/// picks it up after the replica returns control.
#[derive(Clone)]
pub(crate) struct SimNetwork {
    me: VerifyingKey,
    outbox: Arc<Mutex<Vec<Outgoing>>>,
}

impl Network for SimNetwork {
    fn init_validator_set(&mut self, _: ValidatorSet) {}

    fn broadcast(&mut self, message: Message) {
        self.outbox.lock().unwrap().push(Outgoing {
            from: self.me,
            to: Destination::All,
            message,
        })
    }

    fn send(&mut self, peer: VerifyingKey, message: Message) {
        self.outbox.lock().unwrap().push(Outgoing {
            from: self.me,
            to: Destination::One(peer),
            message,
        })
    }

    fn recv(&mut self) -> Option<(VerifyingKey, Message)> {
        None
    }
}

pub(crate) struct Simulation {
    config: SimConfig,
    hotstuff_config: HotStuffConfiguration,
    keys: Vec<VerifyingKey>,
    indices: HashMap<VerifyingKey, usize>,
    replicas: Vec<Option<SimReplica>>,
    stores: Vec<MemDB>,
    apps: Vec<RecordingApp>,
    event_receivers: Vec<Receiver<Event>>,
    event_logs: Vec<Vec<Event>>,
    halted: Vec<Option<HotStuffError>>,
    outbox: Arc<Mutex<Vec<Outgoing>>>,
    in_flight: BinaryHeap<Reverse<(Instant, u64)>>,
    payloads: HashMap<u64, (usize, usize, Message)>,
    next_seq: u64,
    groups: Vec<usize>,
    equivocating_views: Vec<ViewNumber>,
    rng: StdRng,
    start: Instant,
    now: Instant,
}

impl Simulation {
    pub(crate) fn new(config: SimConfig) -> Simulation {
        let keys: Vec<VerifyingKey> = (0..config.replicas)
            .map(|i| SigningKey::from_bytes(&[i as u8 + 1; 32]).verifying_key())
            .collect();
        let validator_set = ValidatorSet::new(keys.clone());
        let hotstuff_config = HotStuffConfiguration {
            chain_id: CHAIN_ID,
            validator_set,
            pacemaker: PacemakerConfiguration {
                initial_view_timeout: config.initial_view_timeout,
                max_view_timeout: config.max_view_timeout,
            },
            block_sync_request_limit: config.block_sync_request_limit,
            progress_msg_buffer_capacity: BufferSize::new(1024 * 1024),
        };

        let start = Instant::now();
        let outbox = Arc::new(Mutex::new(Vec::new()));
        let mut replicas = Vec::new();
        let mut stores = Vec::new();
        let mut apps = Vec::new();
        let mut event_receivers = Vec::new();
        for (index, key) in keys.iter().enumerate() {
            let store = MemDB::new();
            let app = RecordingApp::new(index);
            let (replica, receiver) = boot(
                &hotstuff_config,
                *key,
                store.clone(),
                app.clone(),
                outbox.clone(),
                start,
            );

            replicas.push(Some(replica));
            stores.push(store);
            apps.push(app);
            event_receivers.push(receiver);
        }

        Simulation {
            hotstuff_config,
            indices: keys.iter().enumerate().map(|(i, k)| (*k, i)).collect(),
            halted: (0..config.replicas).map(|_| None).collect(),
            event_logs: (0..config.replicas).map(|_| Vec::new()).collect(),
            groups: vec![0; config.replicas],
            rng: StdRng::seed_from_u64(config.seed),
            config,
            keys,
            replicas,
            stores,
            apps,
            event_receivers,
            outbox,
            in_flight: BinaryHeap::new(),
            payloads: HashMap::new(),
            next_seq: 0,
            equivocating_views: Vec::new(),
            start,
            now: start,
        }
    }

    /// Start every replica at the current virtual time.
    pub(crate) fn start(&mut self) {
        for index in 0..self.keys.len() {
            self.call(index, |replica, now| replica.start(now));
        }
    }

    /// Process the next message delivery or timer expiry. Returns `false` if every replica has halted.
    pub(crate) fn step(&mut self) -> bool {
        let next_timer = self
            .replicas
            .iter()
            .flatten()
            .map(|replica| replica.view_deadline())
            .min();
        let Some(next_timer) = next_timer else {
            return false;
        };

        let next_delivery = self.in_flight.peek().map(|Reverse((deliver_at, _))| *deliver_at);
        match next_delivery {
            Some(deliver_at) if deliver_at <= next_timer => {
                if let Some(Reverse((_, seq))) = self.in_flight.pop() {
                    self.now = self.now.max(deliver_at);
                    if let Some((from, to, message)) = self.payloads.remove(&seq) {
                        self.deliver(from, to, message);
                    }
                }
            }
            _ => {
                self.now = self.now.max(next_timer);
                for index in 0..self.keys.len() {
                    let expired = self.replicas[index]
                        .as_ref()
                        .is_some_and(|replica| replica.view_deadline() <= self.now);
                    if expired {
                        self.call(index, |replica, now| replica.tick(now));
                    }
                }
            }
        }
        true
    }

    /// Step until `predicate` holds, or until `limit` of virtual time has passed since the simulation
    /// started. Returns whether `predicate` holds.
    pub(crate) fn run_until(
        &mut self,
        limit: Duration,
        predicate: impl Fn(&Simulation) -> bool,
    ) -> bool {
        while !predicate(self) {
            if self.elapsed() >= limit || !self.step() {
                return predicate(self);
            }
        }
        true
    }

    /// Step for `duration` of virtual time.
    pub(crate) fn run_for(&mut self, duration: Duration) {
        let until = self.now + duration;
        while self.now < until && self.step() {}
    }

    /// Split the replicas into `groups`. Messages between replicas in different groups are lost,
    /// including those already in flight. Replicas not named in any group are isolated.
    pub(crate) fn partition(&mut self, groups: &[&[usize]]) {
        for (index, group) in self.groups.iter_mut().enumerate() {
            *group = groups.len() + index;
        }
        for (group_id, members) in groups.iter().enumerate() {
            for member in members.iter() {
                self.groups[*member] = group_id;
            }
        }
    }

    pub(crate) fn isolate_all(&mut self) {
        self.partition(&[]);
    }

    pub(crate) fn heal(&mut self) {
        self.groups = vec![0; self.keys.len()];
    }

    /// Make the leader of `view` send one block to half of its peers and a conflicting block to the
    /// others, with one peer receiving both.
    pub(crate) fn equivocate_at(&mut self, view: ViewNumber) {
        self.equivocating_views.push(view);
    }

    pub(crate) fn fail_storage(&mut self, index: usize) {
        self.stores[index].fail_writes();
    }

    /// Crash replica `index` and boot a fresh instance on top of the same store. Nothing but the store
    /// survives the crash; messages already in flight to the replica are delivered to the new instance.
    pub(crate) fn restart(&mut self, index: usize) {
        self.replicas[index] = None;
        self.event_logs[index].extend(self.event_receivers[index].try_iter());

        let (replica, receiver) = boot(
            &self.hotstuff_config,
            self.keys[index],
            self.stores[index].clone(),
            self.apps[index].clone(),
            self.outbox.clone(),
            self.now,
        );
        self.replicas[index] = Some(replica);
        self.event_receivers[index] = receiver;
        self.call(index, |replica, now| replica.start(now));
    }

    /// Hand `msg` to replica `index` as if `origin` had sent it, bypassing the network.
    pub(crate) fn inject(&mut self, index: usize, origin: VerifyingKey, msg: HotStuffMessage) {
        self.call(index, |replica, now| replica.on_receive_msg(origin, msg, now));
    }

    /// The signing scheme replica `index` uses.
    pub(crate) fn scheme(&self, index: usize) -> HashScheme {
        HashScheme::new(self.keys[index], self.hotstuff_config.validator_set.clone())
    }

    pub(crate) fn store(&self, index: usize) -> MemDB {
        self.stores[index].clone()
    }

    pub(crate) fn replica(&self, index: usize) -> Option<&SimReplica> {
        self.replicas[index].as_ref()
    }

    pub(crate) fn current_view(&self, index: usize) -> Option<ViewNumber> {
        self.replica(index).map(|replica| replica.current_view())
    }

    pub(crate) fn app(&self, index: usize) -> &RecordingApp {
        &self.apps[index]
    }

    pub(crate) fn events(&self, index: usize) -> &[Event] {
        &self.event_logs[index]
    }

    pub(crate) fn halted(&self, index: usize) -> Option<&HotStuffError> {
        self.halted[index].as_ref()
    }

    pub(crate) fn key(&self, index: usize) -> VerifyingKey {
        self.keys[index]
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn now(&self) -> Instant {
        self.now
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.now - self.start
    }

    /// The committed chain of replica `index`, read from its store. Available after the replica halts.
    pub(crate) fn committed_chain(&self, index: usize) -> Vec<Block> {
        BlockTreeCamera::new(self.stores[index].clone())
            .snapshot()
            .committed_chain()
            .unwrap()
    }

    pub(crate) fn highest_committed_height(&self, index: usize) -> Option<BlockHeight> {
        BlockTreeCamera::new(self.stores[index].clone())
            .snapshot()
            .highest_committed_block_height()
            .unwrap()
    }

    /// Heights of the `CommitBlock` events of replica `index`, in the order they were published.
    pub(crate) fn commit_heights(&self, index: usize) -> Vec<BlockHeight> {
        self.event_logs[index]
            .iter()
            .filter_map(|event| match event {
                Event::CommitBlock(commit) => Some(commit.height),
                _ => None,
            })
            .collect()
    }

    /// Why each message replica `index` dropped at ingestion was dropped, in order.
    pub(crate) fn invalid_messages(&self, index: usize) -> Vec<InvalidMessageReason> {
        self.event_logs[index]
            .iter()
            .filter_map(|event| match event {
                Event::InvalidMessage(invalid) => Some(invalid.reason),
                _ => None,
            })
            .collect()
    }

    /// Views of the votes sent by replica `index`, in the order they were sent.
    pub(crate) fn vote_views(&self, index: usize) -> Vec<ViewNumber> {
        self.event_logs[index]
            .iter()
            .filter_map(|event| match event {
                Event::Vote(vote) => Some(vote.vote.view),
                _ => None,
            })
            .collect()
    }

    /// Find two replicas that committed different blocks at the same height.
    pub(crate) fn conflicting_commits(&self) -> Option<(usize, usize, BlockHeight)> {
        let chains: Vec<Vec<Block>> = (0..self.len()).map(|i| self.committed_chain(i)).collect();
        for i in 0..chains.len() {
            for j in (i + 1)..chains.len() {
                let conflict = chains[i]
                    .iter()
                    .zip(chains[j].iter())
                    .find(|(a, b)| a.hash != b.hash);
                if let Some((a, _)) = conflict {
                    return Some((i, j, a.height));
                }
            }
        }
        None
    }
}

/// Message plumbing.
impl Simulation {
    /// Run `f` on replica `index` if it is live, then collect its events and everything it sent. A
    /// replica that returns an error is halted for the rest of the simulation.
    fn call(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut SimReplica, Instant) -> Result<(), HotStuffError>,
    ) {
        let now = self.now;
        if let Some(replica) = self.replicas[index].as_mut() {
            if let Err(err) = f(replica, now) {
                self.replicas[index] = None;
                self.halted[index] = Some(err);
            }
        }
        self.event_logs[index].extend(self.event_receivers[index].try_iter());
        self.flush_outbox();
    }

    fn flush_outbox(&mut self) {
        let outgoing: Vec<Outgoing> = self.outbox.lock().unwrap().drain(..).collect();
        for Outgoing { from, to, message } in outgoing {
            let from = self.indices[&from];
            match to {
                Destination::One(peer) => {
                    if let Some(to) = self.indices.get(&peer).copied() {
                        self.schedule(from, to, message);
                    }
                }
                Destination::All => match self.equivocation(&message) {
                    Some((first, second)) => self.send_equivocating(from, first, second),
                    None => {
                        for to in (0..self.len()).filter(|to| *to != from) {
                            self.schedule(from, to, message.clone());
                        }
                    }
                },
            }
        }
    }

    fn equivocation(&self, message: &Message) -> Option<(Proposal, Proposal)> {
        match message {
            Message::HotStuffMessage(HotStuffMessage::Proposal(proposal))
                if self.equivocating_views.contains(&proposal.view) =>
            {
                let block = &proposal.block;
                let conflicting = Block::new(
                    block.parent,
                    block.height,
                    Command::new(b"conflicting command".to_vec()),
                    block.justify.clone(),
                );
                Some((
                    proposal.clone(),
                    Proposal {
                        chain_id: proposal.chain_id,
                        view: proposal.view,
                        block: conflicting,
                    },
                ))
            }
            _ => None,
        }
    }

    /// The replica after the leader receives both proposals. The other replicas are split so that
    /// neither proposal can gather a quorum of votes, counting the leader's own vote for `first`.
    fn send_equivocating(&mut self, from: usize, first: Proposal, second: Proposal) {
        let n = self.len();
        let witness = (from + 1) % n;
        let others: Vec<usize> = (0..n).filter(|to| *to != from && *to != witness).collect();
        let (first_group, second_group) = others.split_at(others.len() / 2);

        self.schedule(from, witness, first.clone().into());
        self.schedule(from, witness, second.clone().into());
        for to in first_group {
            self.schedule(from, *to, first.clone().into());
        }
        for to in second_group {
            self.schedule(from, *to, second.clone().into());
        }
    }

    fn schedule(&mut self, from: usize, to: usize, message: Message) {
        if self.config.drop_rate > 0.0 && self.rng.gen_bool(self.config.drop_rate) {
            return;
        }
        let min = self.config.min_latency.as_micros() as u64;
        let max = self.config.max_latency.as_micros() as u64;
        let latency = Duration::from_micros(self.rng.gen_range(min..=max.max(min)));

        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight.push(Reverse((self.now + latency, seq)));
        self.payloads.insert(seq, (from, to, message));
    }

    fn deliver(&mut self, from: usize, to: usize, message: Message) {
        if self.groups[from] != self.groups[to] || self.replicas[to].is_none() {
            return;
        }

        let origin = self.keys[from];
        match message {
            Message::HotStuffMessage(msg) => {
                self.call(to, |replica, now| replica.on_receive_msg(origin, msg, now))
            }
            Message::BlockSyncMessage(BlockSyncMessage::BlockSyncRequest(request)) => {
                let response = {
                    let camera = BlockTreeCamera::new(self.stores[to].clone());
                    let snapshot = camera.snapshot();
                    respond(&snapshot, &request, self.config.block_sync_request_limit)
                };
                if let Ok(response) = response {
                    self.schedule(to, from, response.into());
                }
            }
            Message::BlockSyncMessage(BlockSyncMessage::BlockSyncResponse(response)) => self
                .call(to, |replica, now| {
                    replica.on_receive_block_sync_response(origin, response, now)
                }),
        }
    }
}

/// Create the replica owning `key` on top of `store`, publishing its events to the returned receiver.
fn boot(
    config: &HotStuffConfiguration,
    key: VerifyingKey,
    store: MemDB,
    app: RecordingApp,
    outbox: Arc<Mutex<Vec<Outgoing>>>,
    now: Instant,
) -> (SimReplica, Receiver<Event>) {
    let (publisher, receiver) = mpsc::channel();
    let replica = HotStuff::new(
        config.clone(),
        store,
        SimNetwork { me: key, outbox },
        app,
        HashScheme::new(key, config.validator_set.clone()),
        Some(publisher),
        now,
    )
    .unwrap();
    (replica, receiver)
}
