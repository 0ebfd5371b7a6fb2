/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of types specific to the Pacemaker subprotocol.

use std::collections::{BTreeMap, HashMap};

use crate::{
    hotstuff::{messages::NewView, types::QuorumCertificate},
    types::{
        data_types::{ChainID, VerifyingKeyBytes, ViewNumber},
        validator_set::{ValidatorSet, VerifyingKey},
    },
};

/// How many views past the lowest view still collected `NewView`s are accepted for.
const MAX_VIEWS_AHEAD: u64 = 8;

/// Helps the leader of a view collect the `NewView` messages sent to it by replicas that timed out of the
/// previous view.
///
/// Once `NewView`s for the same view have arrived from a quorum of distinct validators, the collector yields
/// the highest QC carried by any of them. The leader extends that QC in its proposal.
///
/// Only views from `lowest_view` to `lowest_view + MAX_VIEWS_AHEAD` are collected, so the collector holds
/// at most that many views' worth of `NewView`s.
pub(crate) struct NewViewCollector {
    chain_id: ChainID,
    validator_set: ValidatorSet,
    lowest_view: ViewNumber,
    new_views: BTreeMap<ViewNumber, NewViewSet>,
}

#[derive(Default)]
struct NewViewSet {
    senders: HashMap<VerifyingKeyBytes, QuorumCertificate>,
    completed: bool,
}

impl NewViewCollector {
    pub(crate) fn new(chain_id: ChainID, validator_set: ValidatorSet, cur_view: ViewNumber) -> Self {
        Self {
            chain_id,
            validator_set,
            lowest_view: cur_view,
            new_views: BTreeMap::new(),
        }
    }

    /// Add `new_view`, sent by `origin`, to the collected `NewView`s of `new_view.view`.
    ///
    /// Returns the highest QC among those collected the first time the number of distinct senders reaches a
    /// quorum. Messages from non-validators, for another chain, for a view outside the collected range, or
    /// from a sender already counted for the view are ignored.
    ///
    /// # Preconditions
    ///
    /// `new_view.high_qc` has already been checked to be correct.
    pub(crate) fn collect(
        &mut self,
        origin: &VerifyingKey,
        new_view: &NewView,
    ) -> Option<QuorumCertificate> {
        if self.chain_id != new_view.chain_id
            || !self.validator_set.contains(origin)
            || new_view.view < self.lowest_view
            || new_view.view > self.lowest_view + MAX_VIEWS_AHEAD
        {
            return None;
        }

        let new_view_set = self.new_views.entry(new_view.view).or_default();
        if new_view_set.completed || new_view_set.senders.contains_key(&origin.to_bytes()) {
            return None;
        }
        new_view_set
            .senders
            .insert(origin.to_bytes(), new_view.high_qc.clone());

        if new_view_set.senders.len() < self.validator_set.quorum() {
            return None;
        }
        new_view_set.completed = true;
        new_view_set
            .senders
            .values()
            .max_by_key(|qc| qc.view)
            .cloned()
    }

    /// Number of distinct senders whose `NewView` for `view` has been collected.
    #[cfg(test)]
    pub(crate) fn count(&self, view: ViewNumber) -> usize {
        self.new_views
            .get(&view)
            .map_or(0, |new_view_set| new_view_set.senders.len())
    }

    /// Number of views for which `NewView`s are held.
    #[cfg(test)]
    pub(crate) fn views(&self) -> usize {
        self.new_views.len()
    }

    /// Forget the `NewView`s of views lower than `view`, and start collecting up to `MAX_VIEWS_AHEAD`
    /// views past it.
    pub(crate) fn gc(&mut self, view: ViewNumber) {
        self.lowest_view = self.lowest_view.max(view);
        self.new_views = self.new_views.split_off(&self.lowest_view);
    }
}
