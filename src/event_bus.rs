/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Thread that receives events from the algorithm thread and fires the registered handlers.

use std::{
    sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError},
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{events::*, logging::Logger};

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

#[derive(Default)]
pub(crate) struct EventHandlers {
    pub(crate) insert_block_handlers: Vec<HandlerPtr<InsertBlockEvent>>,
    pub(crate) commit_block_handlers: Vec<HandlerPtr<CommitBlockEvent>>,
    pub(crate) update_highest_qc_handlers: Vec<HandlerPtr<UpdateHighestQCEvent>>,
    pub(crate) update_locked_qc_handlers: Vec<HandlerPtr<UpdateLockedQCEvent>>,
    pub(crate) propose_handlers: Vec<HandlerPtr<ProposeEvent>>,
    pub(crate) vote_handlers: Vec<HandlerPtr<VoteEvent>>,
    pub(crate) new_view_handlers: Vec<HandlerPtr<NewViewEvent>>,
    pub(crate) receive_proposal_handlers: Vec<HandlerPtr<ReceiveProposalEvent>>,
    pub(crate) receive_vote_handlers: Vec<HandlerPtr<ReceiveVoteEvent>>,
    pub(crate) receive_new_view_handlers: Vec<HandlerPtr<ReceiveNewViewEvent>>,
    pub(crate) start_view_handlers: Vec<HandlerPtr<StartViewEvent>>,
    pub(crate) view_timeout_handlers: Vec<HandlerPtr<ViewTimeoutEvent>>,
    pub(crate) collect_qc_handlers: Vec<HandlerPtr<CollectQCEvent>>,
    pub(crate) equivocation_handlers: Vec<HandlerPtr<EquivocationEvent>>,
    pub(crate) invalid_message_handlers: Vec<HandlerPtr<InvalidMessageEvent>>,
    pub(crate) start_sync_handlers: Vec<HandlerPtr<StartSyncEvent>>,
    pub(crate) end_sync_handlers: Vec<HandlerPtr<EndSyncEvent>>,
    pub(crate) receive_sync_request_handlers: Vec<HandlerPtr<ReceiveSyncRequestEvent>>,
    pub(crate) send_sync_response_handlers: Vec<HandlerPtr<SendSyncResponseEvent>>,
}

impl EventHandlers {
    /// Register the default logger of every event type ahead of any user-provided handlers.
    pub(crate) fn add_loggers(&mut self) {
        self.insert_block_handlers.insert(0, InsertBlockEvent::get_logger());
        self.commit_block_handlers.insert(0, CommitBlockEvent::get_logger());
        self.update_highest_qc_handlers.insert(0, UpdateHighestQCEvent::get_logger());
        self.update_locked_qc_handlers.insert(0, UpdateLockedQCEvent::get_logger());
        self.propose_handlers.insert(0, ProposeEvent::get_logger());
        self.vote_handlers.insert(0, VoteEvent::get_logger());
        self.new_view_handlers.insert(0, NewViewEvent::get_logger());
        self.receive_proposal_handlers.insert(0, ReceiveProposalEvent::get_logger());
        self.receive_vote_handlers.insert(0, ReceiveVoteEvent::get_logger());
        self.receive_new_view_handlers.insert(0, ReceiveNewViewEvent::get_logger());
        self.start_view_handlers.insert(0, StartViewEvent::get_logger());
        self.view_timeout_handlers.insert(0, ViewTimeoutEvent::get_logger());
        self.collect_qc_handlers.insert(0, CollectQCEvent::get_logger());
        self.equivocation_handlers.insert(0, EquivocationEvent::get_logger());
        self.invalid_message_handlers.insert(0, InvalidMessageEvent::get_logger());
        self.start_sync_handlers.insert(0, StartSyncEvent::get_logger());
        self.end_sync_handlers.insert(0, EndSyncEvent::get_logger());
        self.receive_sync_request_handlers.insert(0, ReceiveSyncRequestEvent::get_logger());
        self.send_sync_response_handlers.insert(0, SendSyncResponseEvent::get_logger());
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.insert_block_handlers.is_empty()
            && self.commit_block_handlers.is_empty()
            && self.update_highest_qc_handlers.is_empty()
            && self.update_locked_qc_handlers.is_empty()
            && self.propose_handlers.is_empty()
            && self.vote_handlers.is_empty()
            && self.new_view_handlers.is_empty()
            && self.receive_proposal_handlers.is_empty()
            && self.receive_vote_handlers.is_empty()
            && self.receive_new_view_handlers.is_empty()
            && self.start_view_handlers.is_empty()
            && self.view_timeout_handlers.is_empty()
            && self.collect_qc_handlers.is_empty()
            && self.equivocation_handlers.is_empty()
            && self.invalid_message_handlers.is_empty()
            && self.start_sync_handlers.is_empty()
            && self.end_sync_handlers.is_empty()
            && self.receive_sync_request_handlers.is_empty()
            && self.send_sync_response_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::InsertBlock(insert_block_event) => self
                .insert_block_handlers
                .iter()
                .for_each(|handler| handler(&insert_block_event)),

            Event::CommitBlock(commit_block_event) => self
                .commit_block_handlers
                .iter()
                .for_each(|handler| handler(&commit_block_event)),

            Event::UpdateHighestQC(update_highest_qc_event) => self
                .update_highest_qc_handlers
                .iter()
                .for_each(|handler| handler(&update_highest_qc_event)),

            Event::UpdateLockedQC(update_locked_qc_event) => self
                .update_locked_qc_handlers
                .iter()
                .for_each(|handler| handler(&update_locked_qc_event)),

            Event::Propose(propose_event) => self
                .propose_handlers
                .iter()
                .for_each(|handler| handler(&propose_event)),

            Event::Vote(vote_event) => self
                .vote_handlers
                .iter()
                .for_each(|handler| handler(&vote_event)),

            Event::NewView(new_view_event) => self
                .new_view_handlers
                .iter()
                .for_each(|handler| handler(&new_view_event)),

            Event::ReceiveProposal(receive_proposal_event) => self
                .receive_proposal_handlers
                .iter()
                .for_each(|handler| handler(&receive_proposal_event)),

            Event::ReceiveVote(receive_vote_event) => self
                .receive_vote_handlers
                .iter()
                .for_each(|handler| handler(&receive_vote_event)),

            Event::ReceiveNewView(receive_new_view_event) => self
                .receive_new_view_handlers
                .iter()
                .for_each(|handler| handler(&receive_new_view_event)),

            Event::StartView(start_view_event) => self
                .start_view_handlers
                .iter()
                .for_each(|handler| handler(&start_view_event)),

            Event::ViewTimeout(view_timeout_event) => self
                .view_timeout_handlers
                .iter()
                .for_each(|handler| handler(&view_timeout_event)),

            Event::CollectQC(collect_qc_event) => self
                .collect_qc_handlers
                .iter()
                .for_each(|handler| handler(&collect_qc_event)),

            Event::Equivocation(equivocation_event) => self
                .equivocation_handlers
                .iter()
                .for_each(|handler| handler(&equivocation_event)),

            Event::InvalidMessage(invalid_message_event) => self
                .invalid_message_handlers
                .iter()
                .for_each(|handler| handler(&invalid_message_event)),

            Event::StartSync(start_sync_event) => self
                .start_sync_handlers
                .iter()
                .for_each(|handler| handler(&start_sync_event)),

            Event::EndSync(end_sync_event) => self
                .end_sync_handlers
                .iter()
                .for_each(|handler| handler(&end_sync_event)),

            Event::ReceiveSyncRequest(receive_sync_request_event) => self
                .receive_sync_request_handlers
                .iter()
                .for_each(|handler| handler(&receive_sync_request_event)),

            Event::SendSyncResponse(send_sync_response_event) => self
                .send_sync_response_handlers
                .iter()
                .for_each(|handler| handler(&send_sync_response_event)),
        }
    }
}

pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return,
            Err(TryRecvError::Empty) => (),
        }

        match event_subscriber.recv_timeout(Duration::from_millis(50)) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            // The algorithm thread has exited, either on shutdown or after a fatal storage error.
            Err(RecvTimeoutError::Disconnected) => return,
        }
    })
}
