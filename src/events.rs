/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the events a replica emits, for event handling and logging.
//!
//! An event for a given action indicates that the action has been completed. In particular, events
//! that describe changes to persistent state are only published after the change has been durably
//! written into the block tree.
//!
//! Events are published by the algorithm thread into a channel and consumed by the
//! [event bus](crate::event_bus) thread, which passes them to the default
//! [loggers](crate::logging) (if enabled) and to the handlers registered in the
//! [`ReplicaSpec`](crate::replica::ReplicaSpec).

use std::{
    sync::mpsc::Sender,
    time::{Duration, SystemTime},
};

use crate::{
    hotstuff::{
        messages::{NewView, Proposal, Vote},
        types::QuorumCertificate,
    },
    types::{
        block::Block,
        data_types::{BlockHeight, CryptoHash, ViewNumber},
        validator_set::VerifyingKey,
    },
};

pub enum Event {
    // Events that change persistent state.
    InsertBlock(InsertBlockEvent),
    CommitBlock(CommitBlockEvent),
    UpdateHighestQC(UpdateHighestQCEvent),
    UpdateLockedQC(UpdateLockedQCEvent),
    // Events that involve sending a progress message.
    Propose(ProposeEvent),
    Vote(VoteEvent),
    NewView(NewViewEvent),
    // Events that involve receiving a progress message.
    ReceiveProposal(ReceiveProposalEvent),
    ReceiveVote(ReceiveVoteEvent),
    ReceiveNewView(ReceiveNewViewEvent),
    // Pacemaker events.
    StartView(StartViewEvent),
    ViewTimeout(ViewTimeoutEvent),
    CollectQC(CollectQCEvent),
    // Byzantine behaviour and malformed input.
    Equivocation(EquivocationEvent),
    InvalidMessage(InvalidMessageEvent),
    // Block sync events.
    StartSync(StartSyncEvent),
    EndSync(EndSyncEvent),
    ReceiveSyncRequest(ReceiveSyncRequestEvent),
    SendSyncResponse(SendSyncResponseEvent),
}

impl Event {
    /// Send the event to the event bus, if there is one.
    ///
    /// A closed channel means that the replica is shutting down, so send errors are ignored.
    pub(crate) fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(self);
        }
    }
}

/// A block (proposed, filler, or synced) was inserted into the block tree.
pub struct InsertBlockEvent {
    pub timestamp: SystemTime,
    pub block: Block,
}

/// A block was committed. Committed blocks are handed to the [app](crate::app::App) in this order.
pub struct CommitBlockEvent {
    pub timestamp: SystemTime,
    pub block: CryptoHash,
    pub height: BlockHeight,
}

pub struct UpdateHighestQCEvent {
    pub timestamp: SystemTime,
    pub highest_qc: QuorumCertificate,
}

pub struct UpdateLockedQCEvent {
    pub timestamp: SystemTime,
    pub locked_qc: QuorumCertificate,
}

pub struct ProposeEvent {
    pub timestamp: SystemTime,
    pub proposal: Proposal,
}

pub struct VoteEvent {
    pub timestamp: SystemTime,
    pub vote: Vote,
}

pub struct NewViewEvent {
    pub timestamp: SystemTime,
    pub new_view: NewView,
}

pub struct ReceiveProposalEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub proposal: Proposal,
}

pub struct ReceiveVoteEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub vote: Vote,
}

pub struct ReceiveNewViewEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub new_view: NewView,
}

pub struct StartViewEvent {
    pub timestamp: SystemTime,
    pub leader: VerifyingKey,
    pub view: ViewNumber,
}

/// The view timer of `view` fired after `timeout`.
pub struct ViewTimeoutEvent {
    pub timestamp: SystemTime,
    pub view: ViewNumber,
    pub timeout: Duration,
}

pub struct CollectQCEvent {
    pub timestamp: SystemTime,
    pub quorum_certificate: QuorumCertificate,
}

/// What kind of message a replica equivocated on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EquivocationKind {
    Proposal,
    Vote,
}

/// `offender` signed two conflicting messages of the same `kind` for `view`.
///
/// The second message is never processed, and the offender is never counted twice. Reputation or
/// slashing tooling can subscribe to these events through
/// [`on_equivocation`](crate::replica::ReplicaSpec).
pub struct EquivocationEvent {
    pub timestamp: SystemTime,
    pub offender: VerifyingKey,
    pub kind: EquivocationKind,
    pub view: ViewNumber,
    pub first: CryptoHash,
    pub second: CryptoHash,
}

/// Why a message was dropped at ingestion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidMessageReason {
    WrongChain,
    NotFromLeader,
    NotFromSigner,
    NotLeaderOfNextView,
    IncorrectBlock,
    IncorrectSignature,
    IncorrectQC,
    UnexpectedParent,
    TooManyFillers,
    TooFarAhead,
    IncorrectSyncResponse,
}

pub struct InvalidMessageEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub reason: InvalidMessageReason,
}

/// The replica asked `peer` for the ancestors of a proposal, ending at `block`.
pub struct StartSyncEvent {
    pub timestamp: SystemTime,
    pub peer: VerifyingKey,
    pub block: CryptoHash,
}

pub struct EndSyncEvent {
    pub timestamp: SystemTime,
    pub peer: VerifyingKey,
    pub blocks_synced: u64,
}

pub struct ReceiveSyncRequestEvent {
    pub timestamp: SystemTime,
    pub peer: VerifyingKey,
    pub block: CryptoHash,
    pub limit: u32,
}

pub struct SendSyncResponseEvent {
    pub timestamp: SystemTime,
    pub peer: VerifyingKey,
    pub blocks: Vec<Block>,
}
