/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that determine what roles a replica should play at any given view.

use crate::{
    pacemaker::implementation::select_leader,
    types::{
        data_types::ViewNumber,
        validator_set::{ValidatorSet, VerifyingKey},
    },
};

use super::messages::{NewView, Vote};

/// Determine whether `replica` is a validator, i.e., whether it may propose, vote, and send `NewView`
/// messages.
pub(crate) fn is_validator(replica: &VerifyingKey, validator_set: &ValidatorSet) -> bool {
    validator_set.contains(replica)
}

/// Determine whether `validator` is the proposer of `view`.
pub(crate) fn is_proposer(
    validator: &VerifyingKey,
    view: ViewNumber,
    validator_set: &ValidatorSet,
) -> bool {
    *validator == select_leader(view, validator_set)
}

/// Identify the replica that `vote` should be sent to: the leader of the view after the view in which
/// the voted block was proposed. That leader turns the votes into the QC it extends in its own proposal.
pub(crate) fn vote_recipient(vote: &Vote, validator_set: &ValidatorSet) -> VerifyingKey {
    select_leader(vote.view + 1, validator_set)
}

/// Identify the replica that `vote` is forwarded to when the view after `vote.view` times out: the leader
/// of the view after that. If the recipient of the original vote never formed the QC, this leader can.
pub(crate) fn forwarded_vote_recipient(vote: &Vote, validator_set: &ValidatorSet) -> VerifyingKey {
    select_leader(vote.view + 2, validator_set)
}

/// Identify the replica that `new_view` should be sent to: the leader of the view being entered.
pub(crate) fn new_view_recipient(new_view: &NewView, validator_set: &ValidatorSet) -> VerifyingKey {
    select_leader(new_view.view, validator_set)
}
