/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Event-driven implementation of the chained HotStuff protocol.
//!
//! Main type: [`HotStuff`].

use std::{
    collections::{BTreeMap, VecDeque},
    sync::mpsc::Sender,
    time::{Duration, Instant, SystemTime},
};

use crate::{
    app::App,
    block_sync::{
        client::{BlockSyncClient, SyncProgress},
        messages::BlockSyncResponse,
    },
    block_tree::{
        accessors::internal::{BlockTreeError, BlockTreeSingleton},
        invariants::safe_block,
        pluggables::KVStore,
    },
    events::*,
    networking::{network::Network, receiving::ProgressMessageBuffer, sending::SenderHandle},
    pacemaker::{
        implementation::{
            select_leader, Pacemaker, PacemakerConfiguration, PacemakerState, UpdateViewError,
            ViewInfo,
        },
        types::NewViewCollector,
    },
    types::{
        block::Block,
        crypto_primitives::ThresholdScheme,
        data_types::{BufferSize, ChainID, CryptoHash, ViewNumber},
        validator_set::{ValidatorSet, VerifyingKey},
    },
};

use super::{
    aggregator::VoteAggregator,
    messages::{HotStuffMessage, NewView, Proposal, Vote},
    roles::{
        forwarded_vote_recipient, is_proposer, is_validator, new_view_recipient, vote_recipient,
    },
    types::QuorumCertificate,
};

/// How many views ahead of the current view a message may be. A message further ahead is dropped after
/// the QC it carries, if any, has been applied.
const MAX_VIEW_LEAD: u64 = 1 << 10;

/// A single replica of the chained HotStuff protocol.
///
/// `HotStuff` owns every piece of mutable replica state: the block tree, the pacemaker, the vote
/// aggregator, the new-view collector, and the block sync client. It is a single-writer state machine
/// that never blocks and never reads the clock: every method that depends on time takes `now`.
///
/// # Usage
///
/// After creating an instance with [`new`](Self::new) and calling [`start`](Self::start) once, the
/// caller should:
/// 1. Call [`on_receive_msg`](Self::on_receive_msg) for every [`HotStuffMessage`] received.
/// 2. Call [`on_receive_block_sync_response`](Self::on_receive_block_sync_response) for every block sync
///    response received.
/// 3. Call [`tick`](Self::tick) *as often as is practical*, and at the latest by
///    [`view_deadline`](Self::view_deadline).
///
/// # Errors
///
/// Every error returned by these methods comes from the block tree's key value store. The replica cannot
/// continue safely after one, and should halt.
pub struct HotStuff<K: KVStore, N: Network, A: App, C: ThresholdScheme> {
    config: HotStuffConfiguration,
    me: VerifyingKey,
    block_tree: BlockTreeSingleton<K>,
    pacemaker: Pacemaker,
    votes: VoteAggregator,
    new_views: NewViewCollector,
    new_view_quorum: Option<ViewNumber>,
    block_sync_client: BlockSyncClient,
    future_msgs: ProgressMessageBuffer<HotStuffMessage>,
    proposals_seen: BTreeMap<ViewNumber, CryptoHash>,
    last_vote: Option<Vote>,
    inputs: VecDeque<Input>,
    app: A,
    scheme: C,
    sender: SenderHandle<N>,
    event_publisher: Option<Sender<Event>>,
}

/// Work queued for the state machine. Messages the replica sends to itself and buffered proposals whose
/// view has come are handled in the same loop as messages from the network.
enum Input {
    Received(VerifyingKey, HotStuffMessage),
    Replayed(VerifyingKey, Proposal),
}

impl<K: KVStore, N: Network, A: App, C: ThresholdScheme> HotStuff<K, N, A, C> {
    /// Create a replica on top of `kv_store`, initializing the block tree in it if this has not been
    /// done before. A replica that restarts on an initialized store resumes in the view it persisted.
    pub fn new(
        config: HotStuffConfiguration,
        kv_store: K,
        network: N,
        app: A,
        scheme: C,
        event_publisher: Option<Sender<Event>>,
        now: Instant,
    ) -> Result<Self, HotStuffError> {
        let mut block_tree = BlockTreeSingleton::new(kv_store);
        block_tree.initialize()?;

        let me = scheme.me();
        let init_view = block_tree.current_view()?;
        let pacemaker = Pacemaker::new(
            config.pacemaker,
            init_view,
            is_proposer(&me, init_view, &config.validator_set),
            now,
        );

        Ok(Self {
            me,
            block_tree,
            pacemaker,
            votes: VoteAggregator::new(config.chain_id),
            new_views: NewViewCollector::new(
                config.chain_id,
                config.validator_set.clone(),
                init_view,
            ),
            new_view_quorum: None,
            block_sync_client: BlockSyncClient::new(
                config.chain_id,
                config.block_sync_request_limit,
            ),
            future_msgs: ProgressMessageBuffer::new(config.progress_msg_buffer_capacity),
            proposals_seen: BTreeMap::new(),
            last_vote: None,
            inputs: VecDeque::new(),
            app,
            scheme,
            sender: SenderHandle::new(network),
            event_publisher,
            config,
        })
    }

    /// Enter the first view if the replica has never entered one, and propose if the replica leads the
    /// current view and can extend its highest QC.
    pub fn start(&mut self, now: Instant) -> Result<(), HotStuffError> {
        if self.current_view() == ViewNumber::init() {
            self.advance_view(ViewNumber::new(1), now)?;
        }
        self.try_propose(now)?;
        self.drain(now)
    }

    /// Process a message received from `origin`.
    pub fn on_receive_msg(
        &mut self,
        origin: VerifyingKey,
        msg: HotStuffMessage,
        now: Instant,
    ) -> Result<(), HotStuffError> {
        self.inputs.push_back(Input::Received(origin, msg));
        self.drain(now)
    }

    /// Process a block sync response received from `origin`.
    pub fn on_receive_block_sync_response(
        &mut self,
        origin: VerifyingKey,
        response: BlockSyncResponse,
        now: Instant,
    ) -> Result<(), HotStuffError> {
        let progress = self.block_sync_client.on_receive_response(
            origin,
            response,
            &self.block_tree,
            &self.scheme,
        )?;

        match progress {
            SyncProgress::Ignored => (),
            SyncProgress::Rejected { peer } => {
                self.reject(peer, InvalidMessageReason::IncorrectSyncResponse)
            }
            SyncProgress::Continue { peer, request } => self.sender.send(peer, request),
            SyncProgress::Complete {
                peer,
                blocks,
                pending_proposal,
            } => {
                self.insert_blocks(&blocks)?;
                for block in &blocks {
                    self.update(&block.justify)?;
                }
                // Effects of the QC that made the replica sync could not be applied without its block.
                let highest_qc = self.block_tree.highest_qc()?;
                self.update(&highest_qc)?;

                Event::EndSync(EndSyncEvent {
                    timestamp: SystemTime::now(),
                    peer,
                    blocks_synced: blocks.len() as u64,
                })
                .publish(&self.event_publisher);

                if let Some((origin, proposal)) = pending_proposal {
                    self.inputs.push_back(Input::Replayed(origin, proposal));
                }
                self.try_propose(now)?;
            }
        }

        self.drain(now)
    }

    /// Check the view timer. If it has fired, move to the next view with a doubled timeout interval and
    /// send a `NewView` carrying the highest QC to the leader of that view.
    ///
    /// A vote cast in the view before the one that timed out is sent again, to the leader of the next
    /// view. Its first recipient led the view that timed out and may never have formed the QC.
    pub fn tick(&mut self, now: Instant) -> Result<(), HotStuffError> {
        if !self.pacemaker.has_timed_out(now) {
            return Ok(());
        }

        Event::ViewTimeout(ViewTimeoutEvent {
            timestamp: SystemTime::now(),
            view: self.current_view(),
            timeout: self.pacemaker.timeout_interval(),
        })
        .publish(&self.event_publisher);

        let next_view = self.pacemaker.on_timeout();
        self.block_sync_client.clear();
        self.advance_view(next_view, now)?;

        if is_validator(&self.me, &self.config.validator_set) {
            if let Some(vote) = self
                .last_vote
                .clone()
                .filter(|vote| vote.view + 2 == next_view)
            {
                let recipient = forwarded_vote_recipient(&vote, &self.config.validator_set);
                self.send_or_loopback(recipient, vote.into());
            }

            let new_view = NewView {
                chain_id: self.config.chain_id,
                view: next_view,
                high_qc: self.block_tree.highest_qc()?,
            };
            Event::NewView(NewViewEvent {
                timestamp: SystemTime::now(),
                new_view: new_view.clone(),
            })
            .publish(&self.event_publisher);

            let recipient = new_view_recipient(&new_view, &self.config.validator_set);
            self.send_or_loopback(recipient, new_view.into());
        }

        self.drain(now)
    }

    pub fn current_view(&self) -> ViewNumber {
        self.pacemaker.query().view
    }

    pub fn pacemaker_state(&self) -> PacemakerState {
        self.pacemaker.state()
    }

    pub fn timeout_interval(&self) -> Duration {
        self.pacemaker.timeout_interval()
    }

    pub fn view_info(&self) -> &ViewInfo {
        self.pacemaker.query()
    }

    /// The instant at which the timer of the current view fires.
    pub fn view_deadline(&self) -> Instant {
        self.pacemaker.query().deadline
    }

    pub fn block_tree(&self) -> &BlockTreeSingleton<K> {
        &self.block_tree
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn is_syncing(&self, now: Instant) -> bool {
        self.block_sync_client.is_syncing(now)
    }
}

/// Message handlers.
impl<K: KVStore, N: Network, A: App, C: ThresholdScheme> HotStuff<K, N, A, C> {
    fn drain(&mut self, now: Instant) -> Result<(), HotStuffError> {
        while let Some(input) = self.inputs.pop_front() {
            match input {
                Input::Received(origin, msg) => self.on_msg(origin, msg, now)?,
                Input::Replayed(origin, proposal) => {
                    self.process_proposal(origin, proposal, now)?
                }
            }
        }
        Ok(())
    }

    fn on_msg(
        &mut self,
        origin: VerifyingKey,
        msg: HotStuffMessage,
        now: Instant,
    ) -> Result<(), HotStuffError> {
        if msg.chain_id() != self.config.chain_id {
            self.reject(origin, InvalidMessageReason::WrongChain);
            return Ok(());
        }

        // The QC may bring the replica close enough to the message's view.
        if msg.view() > self.current_view() + MAX_VIEW_LEAD {
            let qc = match &msg {
                HotStuffMessage::Proposal(proposal) => Some(&proposal.block.justify),
                HotStuffMessage::NewView(new_view) => Some(&new_view.high_qc),
                HotStuffMessage::Vote(_) => None,
            };
            if let Some(qc) = qc
                .filter(|qc| qc.is_correct(self.config.chain_id, &self.scheme))
                .cloned()
            {
                self.on_qc(origin, &qc, now)?;
            }
            if msg.view() > self.current_view() + MAX_VIEW_LEAD {
                self.reject(origin, InvalidMessageReason::TooFarAhead);
                return Ok(());
            }
        }

        match msg {
            HotStuffMessage::Proposal(proposal) => self.on_receive_proposal(origin, proposal, now),
            HotStuffMessage::Vote(vote) => self.on_receive_vote(origin, vote, now),
            HotStuffMessage::NewView(new_view) => self.on_receive_new_view(origin, new_view, now),
        }
    }

    /// Check that `proposal` comes from the leader of its view and is well-formed, then process it.
    fn on_receive_proposal(
        &mut self,
        origin: VerifyingKey,
        proposal: Proposal,
        now: Instant,
    ) -> Result<(), HotStuffError> {
        Event::ReceiveProposal(ReceiveProposalEvent {
            timestamp: SystemTime::now(),
            origin,
            proposal: proposal.clone(),
        })
        .publish(&self.event_publisher);

        if !is_proposer(&origin, proposal.view, &self.config.validator_set) {
            self.reject(origin, InvalidMessageReason::NotFromLeader);
            return Ok(());
        }
        let block = &proposal.block;
        if block.height != proposal.view || !block.is_correct(self.config.chain_id, &self.scheme) {
            self.reject(origin, InvalidMessageReason::IncorrectBlock);
            return Ok(());
        }
        if Block::filler_count(&block.justify, proposal.view) > Block::MAX_FILLERS {
            self.reject(origin, InvalidMessageReason::TooManyFillers);
            return Ok(());
        }

        match self.proposals_seen.get(&proposal.view) {
            Some(first) if *first != block.hash => {
                Event::Equivocation(EquivocationEvent {
                    timestamp: SystemTime::now(),
                    offender: origin,
                    kind: EquivocationKind::Proposal,
                    view: proposal.view,
                    first: *first,
                    second: block.hash,
                })
                .publish(&self.event_publisher);
                return Ok(());
            }
            Some(_) => (),
            None => {
                self.proposals_seen.insert(proposal.view, block.hash);
            }
        }

        self.process_proposal(origin, proposal, now)
    }

    /// Insert a verified proposal, apply its justify, and vote for it if it is for the current view and
    /// safe to vote for.
    ///
    /// Processing the same proposal more than once has no further effect, so buffered and pending
    /// proposals may be replayed freely.
    fn process_proposal(
        &mut self,
        origin: VerifyingKey,
        proposal: Proposal,
        now: Instant,
    ) -> Result<(), HotStuffError> {
        let justify = proposal.block.justify.clone();

        // 1. A proposal for a future view carries a QC that may bring the replica up to that view.
        if proposal.view > self.current_view() {
            self.on_qc(origin, &justify, now)?;
            if proposal.view > self.current_view() {
                self.future_msgs.insert(origin, proposal.into());
                return Ok(());
            }
        }

        // 2. Fetch the ancestors of the proposal if they are missing, and come back to it later.
        if !self.has_block(&justify.block)? {
            self.start_sync(origin, justify.block, now);
            self.block_sync_client
                .set_pending_proposal(origin, proposal);
            return Ok(());
        }

        // 3. Check the parent against the fillers the proposal implies, then insert them and the block.
        let Some(fillers) = Block::fillers(&justify, proposal.view) else {
            self.reject(origin, InvalidMessageReason::TooManyFillers);
            return Ok(());
        };
        let expected_parent = fillers.last().map_or(justify.block, |filler| filler.hash);
        if proposal.block.parent != expected_parent {
            self.reject(origin, InvalidMessageReason::UnexpectedParent);
            return Ok(());
        }
        let mut new_blocks = Vec::new();
        for filler in fillers {
            if !self.block_tree.contains(&filler.hash)? {
                new_blocks.push(filler);
            }
        }
        if !self.block_tree.contains(&proposal.block.hash)? {
            new_blocks.push(proposal.block.clone());
        }
        self.insert_blocks(&new_blocks)?;

        // 4. Decide whether the block is safe against the lock held before its justify is applied.
        let accept = safe_block(&proposal.block, &self.block_tree)?;

        // 5. Apply the justify.
        self.update(&justify)?;

        // 6. Vote.
        if proposal.view == self.current_view()
            && proposal.view > self.block_tree.last_voted_height()?
            && accept
            && is_validator(&self.me, &self.config.validator_set)
        {
            let vote = self.persist_vote(proposal.view, proposal.block.hash)?;
            self.send_vote(vote, now)?;
        }

        self.try_propose(now)
    }

    fn on_receive_vote(
        &mut self,
        origin: VerifyingKey,
        vote: Vote,
        now: Instant,
    ) -> Result<(), HotStuffError> {
        Event::ReceiveVote(ReceiveVoteEvent {
            timestamp: SystemTime::now(),
            origin,
            vote: vote.clone(),
        })
        .publish(&self.event_publisher);

        if origin.to_bytes() != vote.signer {
            self.reject(origin, InvalidMessageReason::NotFromSigner);
            return Ok(());
        }
        if vote_recipient(&vote, &self.config.validator_set) != self.me
            && forwarded_vote_recipient(&vote, &self.config.validator_set) != self.me
        {
            self.reject(origin, InvalidMessageReason::NotLeaderOfNextView);
            return Ok(());
        }
        // Votes for a view whose QC can no longer be extended in time.
        if vote.view + 2 < self.current_view() {
            return Ok(());
        }
        if !vote.is_correct(&self.scheme) {
            self.reject(origin, InvalidMessageReason::IncorrectSignature);
            return Ok(());
        }

        let qc = self.votes.ingest(&vote, &self.scheme);

        for equivocation in self.votes.take_equivocations() {
            if let Ok(offender) = VerifyingKey::from_bytes(&equivocation.signer) {
                Event::Equivocation(EquivocationEvent {
                    timestamp: SystemTime::now(),
                    offender,
                    kind: EquivocationKind::Vote,
                    view: equivocation.view,
                    first: equivocation.first,
                    second: equivocation.second,
                })
                .publish(&self.event_publisher);
            }
        }

        if let Some(qc) = qc {
            Event::CollectQC(CollectQCEvent {
                timestamp: SystemTime::now(),
                quorum_certificate: qc.clone(),
            })
            .publish(&self.event_publisher);

            self.on_qc(origin, &qc, now)?;
            self.try_propose(now)?;
        }

        Ok(())
    }

    fn on_receive_new_view(
        &mut self,
        origin: VerifyingKey,
        new_view: NewView,
        now: Instant,
    ) -> Result<(), HotStuffError> {
        Event::ReceiveNewView(ReceiveNewViewEvent {
            timestamp: SystemTime::now(),
            origin,
            new_view: new_view.clone(),
        })
        .publish(&self.event_publisher);

        if !new_view
            .high_qc
            .is_correct(self.config.chain_id, &self.scheme)
        {
            self.reject(origin, InvalidMessageReason::IncorrectQC);
            return Ok(());
        }

        self.on_qc(origin, &new_view.high_qc, now)?;

        if new_view_recipient(&new_view, &self.config.validator_set) == self.me
            && new_view.view >= self.current_view()
            && self.new_views.collect(&origin, &new_view).is_some()
        {
            // The highest QC of the quorum has already been applied above, one `NewView` at a time.
            if new_view.view > self.current_view() {
                self.advance_view(new_view.view, now)?;
            }
            self.new_view_quorum = Some(new_view.view);
            self.try_propose(now)?;
        }

        Ok(())
    }
}

/// Helpers that change the replica's state.
impl<K: KVStore, N: Network, A: App, C: ThresholdScheme> HotStuff<K, N, A, C> {
    /// Apply a verified `qc` received from `source`: update the block tree, fetch its block if it is
    /// missing, and move to the view after `qc.view` if the replica is behind.
    fn on_qc(
        &mut self,
        source: VerifyingKey,
        qc: &QuorumCertificate,
        now: Instant,
    ) -> Result<(), HotStuffError> {
        self.update(qc)?;
        if !self.has_block(&qc.block)? {
            self.start_sync(source, qc.block, now);
        }
        if qc.view + 1 > self.current_view() {
            self.advance_view(qc.view + 1, now)?;
        }
        Ok(())
    }

    /// Update highQC, the lock, and the committed chain upon seeing `justify`, then execute the newly
    /// committed blocks in ascending order of height.
    fn update(&mut self, justify: &QuorumCertificate) -> Result<(), HotStuffError> {
        let committed_blocks = self.block_tree.update(justify, &self.event_publisher)?;
        if !committed_blocks.is_empty() {
            self.pacemaker.reset_timeout_interval();
        }
        for block in committed_blocks {
            self.app.execute(&block.command, block.height);
        }
        Ok(())
    }

    /// Propose in the current view if the replica leads it, has not proposed in it yet, and holds either
    /// a QC for the previous view or a quorum of `NewView`s for the current view.
    fn try_propose(&mut self, now: Instant) -> Result<(), HotStuffError> {
        let cur_view = self.current_view();
        if self.pacemaker.state() != PacemakerState::WaitingForVotes(cur_view) {
            return Ok(());
        }
        // The replica votes for its own proposal, so this also holds after a restart.
        if self.block_tree.last_voted_height()? >= cur_view {
            return Ok(());
        }

        let highest_qc = self.block_tree.highest_qc()?;
        if highest_qc.view + 1 != cur_view && self.new_view_quorum != Some(cur_view) {
            return Ok(());
        }
        if !self.has_block(&highest_qc.block)? {
            return Ok(());
        }

        self.propose(highest_qc, now)
    }

    fn propose(&mut self, highest_qc: QuorumCertificate, now: Instant) -> Result<(), HotStuffError> {
        self.update(&highest_qc)?;

        let view = self.current_view();
        let Some(fillers) = Block::fillers(&highest_qc, view) else {
            return Ok(());
        };
        let parent = fillers.last().map_or(highest_qc.block, |filler| filler.hash);
        let mut new_blocks = Vec::new();
        for filler in fillers {
            if !self.block_tree.contains(&filler.hash)? {
                new_blocks.push(filler);
            }
        }
        let command = self.app.produce_command(view);
        let block = Block::new(parent, view, command, highest_qc);
        new_blocks.push(block.clone());
        self.insert_blocks(&new_blocks)?;

        if !safe_block(&block, &self.block_tree)? {
            return Ok(());
        }

        self.proposals_seen.insert(view, block.hash);
        self.pacemaker.on_propose();

        let vote = self.persist_vote(view, block.hash)?;

        let proposal = Proposal {
            chain_id: self.config.chain_id,
            view,
            block,
        };
        self.sender.broadcast(proposal.clone());
        Event::Propose(ProposeEvent {
            timestamp: SystemTime::now(),
            proposal,
        })
        .publish(&self.event_publisher);

        self.send_vote(vote, now)
    }

    /// Durably record a vote in `view` before the vote (or anything else) is sent.
    fn persist_vote(&mut self, view: ViewNumber, block: CryptoHash) -> Result<Vote, HotStuffError> {
        let mut state = self.block_tree.replica_state()?;
        state.last_voted_height = view;
        state.current_view = state.current_view.max(view + 1);
        self.block_tree.persist_state(&state)?;

        Ok(Vote::new(&self.scheme, self.config.chain_id, view, block))
    }

    /// Send a persisted `vote` to the leader of the next view, and move to that view.
    fn send_vote(&mut self, vote: Vote, now: Instant) -> Result<(), HotStuffError> {
        Event::Vote(VoteEvent {
            timestamp: SystemTime::now(),
            vote: vote.clone(),
        })
        .publish(&self.event_publisher);

        let next_view = vote.view + 1;
        let recipient = vote_recipient(&vote, &self.config.validator_set);
        self.last_vote = Some(vote.clone());
        self.send_or_loopback(recipient, vote.into());

        self.advance_view(next_view, now)
    }

    /// Enter `next_view` if it is higher than the current view.
    ///
    /// The new view is persisted before the pacemaker restarts the timer, and state kept for views the
    /// replica can no longer act in is dropped. Buffered proposals for `next_view` are queued for
    /// processing.
    fn advance_view(&mut self, next_view: ViewNumber, now: Instant) -> Result<(), HotStuffError> {
        if next_view <= self.current_view() {
            return Ok(());
        }

        if self.block_tree.current_view()? < next_view {
            self.block_tree.set_current_view(next_view)?;
        }

        let leader = select_leader(next_view, &self.config.validator_set);
        self.pacemaker
            .enter_view(next_view, leader == self.me, now)?;

        Event::StartView(StartViewEvent {
            timestamp: SystemTime::now(),
            leader,
            view: next_view,
        })
        .publish(&self.event_publisher);

        self.votes.gc(next_view - 2);
        self.new_views.gc(next_view);
        self.proposals_seen = self.proposals_seen.split_off(&(next_view - 1));
        self.future_msgs.remove_expired_msgs(next_view);
        if self.new_view_quorum.is_some_and(|view| view < next_view) {
            self.new_view_quorum = None;
        }

        while let Some((origin, msg)) = self.future_msgs.get_msg(&next_view) {
            if let HotStuffMessage::Proposal(proposal) = msg {
                self.inputs.push_back(Input::Replayed(origin, proposal));
            }
        }

        Ok(())
    }

    fn insert_blocks(&mut self, blocks: &[Block]) -> Result<(), HotStuffError> {
        if blocks.is_empty() {
            return Ok(());
        }
        self.block_tree.append_blocks(blocks)?;
        for block in blocks {
            Event::InsertBlock(InsertBlockEvent {
                timestamp: SystemTime::now(),
                block: block.clone(),
            })
            .publish(&self.event_publisher);
        }
        Ok(())
    }

    /// Ask `peer` for the chain ending at `block`, unless a sync is already in progress. The sync may run
    /// for at most one view timeout interval.
    fn start_sync(&mut self, peer: VerifyingKey, block: CryptoHash, now: Instant) {
        if peer == self.me {
            return;
        }
        let deadline = now + self.pacemaker.timeout_interval();
        if let Some(request) = self
            .block_sync_client
            .start_sync(peer, block, now, deadline)
        {
            Event::StartSync(StartSyncEvent {
                timestamp: SystemTime::now(),
                peer,
                block,
            })
            .publish(&self.event_publisher);
            self.sender.send(peer, request);
        }
    }

    fn send_or_loopback(&mut self, peer: VerifyingKey, msg: HotStuffMessage) {
        if peer == self.me {
            self.inputs.push_back(Input::Received(self.me, msg));
        } else {
            self.sender.send(peer, msg);
        }
    }

    fn has_block(&self, block: &CryptoHash) -> Result<bool, BlockTreeError> {
        Ok(block.is_zero() || self.block_tree.contains(block)?)
    }

    fn reject(&self, origin: VerifyingKey, reason: InvalidMessageReason) {
        Event::InvalidMessage(InvalidMessageEvent {
            timestamp: SystemTime::now(),
            origin,
            reason,
        })
        .publish(&self.event_publisher)
    }
}

/// Immutable parameters that define the behaviour of a [`HotStuff`] replica.
#[derive(Clone)]
pub struct HotStuffConfiguration {
    pub chain_id: ChainID,
    pub validator_set: ValidatorSet,
    pub pacemaker: PacemakerConfiguration,

    /// Maximum number of blocks requested from, or sent to, a peer in a single block sync exchange.
    pub block_sync_request_limit: u32,

    /// Maximum number of bytes of proposals for future views held until their view comes.
    pub progress_msg_buffer_capacity: BufferSize,
}

/// Errors that stop the replica. See [`HotStuff`].
#[derive(Debug, thiserror::Error)]
pub enum HotStuffError {
    #[error(transparent)]
    BlockTreeError(#[from] BlockTreeError),

    #[error(transparent)]
    UpdateViewError(#[from] UpdateViewError),
}
