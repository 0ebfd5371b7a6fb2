/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Timer-driven implementation of the Pacemaker subprotocol.
//!
//! Main type: [`Pacemaker`].

use std::time::{Duration, Instant};

use crate::types::{
    data_types::ViewNumber,
    validator_set::{ValidatorSet, VerifyingKey},
};

/// A single replica's view timer and view counter.
///
/// # Usage
///
/// After creating an instance of `Pacemaker` using [`new`](Self::new), the caller should interact with
/// it by calling these methods:
/// 1. [`enter_view`](Self::enter_view): whenever the replica moves to a higher view, for any reason.
///    This restarts the view timer, which cancels the timer of the view being left.
/// 2. [`has_timed_out`](Self::has_timed_out): *as often as is practical*, with the current time.
/// 3. [`on_timeout`](Self::on_timeout): when `has_timed_out` returns `true`. This doubles the timeout
///    interval and returns the view to enter next.
/// 4. [`reset_timeout_interval`](Self::reset_timeout_interval): whenever the replica commits a block.
///
/// The Pacemaker never sends messages itself. Sending the `NewView` message that follows a timeout
/// is the responsibility of the caller.
pub struct Pacemaker {
    config: PacemakerConfiguration,
    state: PacemakerState,
    view_info: ViewInfo,
    timeout_interval: Duration,
}

impl Pacemaker {
    /// Create a new `Pacemaker` that starts in `init_view`, as a leader if `is_leader`.
    pub fn new(
        config: PacemakerConfiguration,
        init_view: ViewNumber,
        is_leader: bool,
        now: Instant,
    ) -> Self {
        let timeout_interval = config.initial_view_timeout;
        Self {
            state: PacemakerState::entered(init_view, is_leader),
            view_info: ViewInfo::new(init_view, now + timeout_interval),
            config,
            timeout_interval,
        }
    }

    /// Query the Pacemaker for its current `ViewInfo`.
    pub fn query(&self) -> &ViewInfo {
        &self.view_info
    }

    pub fn state(&self) -> PacemakerState {
        self.state
    }

    /// The duration of the view timer of the current view, and of every view entered until the next
    /// timeout or commit.
    pub fn timeout_interval(&self) -> Duration {
        self.timeout_interval
    }

    /// Check whether the timer of the current view has fired by `now`.
    ///
    /// Always `false` once [`on_timeout`](Self::on_timeout) has been called for the current view.
    pub fn has_timed_out(&self, now: Instant) -> bool {
        !matches!(self.state, PacemakerState::TimedOut(_)) && now >= self.view_info.deadline
    }

    /// Enter `next_view` and start its timer.
    ///
    /// # Errors
    ///
    /// `next_view` must be greater than the current view. Otherwise, an [`UpdateViewError`] is returned.
    pub fn enter_view(
        &mut self,
        next_view: ViewNumber,
        is_leader: bool,
        now: Instant,
    ) -> Result<(), UpdateViewError> {
        let cur_view = self.view_info.view;
        if next_view <= cur_view {
            return Err(UpdateViewError::NonIncreasingViewError {
                cur_view,
                next_view,
            });
        }

        self.view_info = ViewInfo::new(next_view, now + self.timeout_interval);
        self.state = PacemakerState::entered(next_view, is_leader);

        Ok(())
    }

    /// Handle the expiry of the current view's timer.
    ///
    /// Doubles the timeout interval (up to the configured maximum) and marks the current view as timed
    /// out. Returns the view that the replica should enter next.
    pub fn on_timeout(&mut self) -> ViewNumber {
        self.timeout_interval = self
            .timeout_interval
            .saturating_mul(2)
            .min(self.config.max_view_timeout);
        self.state = PacemakerState::TimedOut(self.view_info.view);
        self.view_info.view + 1
    }

    /// Go back to the initial timeout interval. The timer of the current view keeps its deadline.
    pub fn reset_timeout_interval(&mut self) {
        self.timeout_interval = self.config.initial_view_timeout;
    }

    /// Record that the leader of the current view has broadcasted its proposal.
    pub fn on_propose(&mut self) {
        self.state = PacemakerState::Proposed(self.view_info.view);
    }
}

/// Configuration variables for the [`Pacemaker`] struct.
#[derive(Clone, Copy, Debug)]
pub struct PacemakerConfiguration {
    /// The timeout interval of the first view, and the one the interval is reset to after a commit.
    pub initial_view_timeout: Duration,

    /// The interval stops doubling once it reaches this duration.
    pub max_view_timeout: Duration,
}

/// What the replica is waiting for in its current view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacemakerState {
    /// The replica is not the leader of the view, and waits for the leader's proposal.
    WaitingForProposal(ViewNumber),

    /// The replica is the leader of the view, and waits for either a QC for the previous view or a
    /// quorum of `NewView` messages before it can propose.
    WaitingForVotes(ViewNumber),

    /// The replica is the leader of the view and has proposed.
    Proposed(ViewNumber),

    /// The view timer fired before the view made progress.
    TimedOut(ViewNumber),
}

impl PacemakerState {
    fn entered(view: ViewNumber, is_leader: bool) -> Self {
        if is_leader {
            PacemakerState::WaitingForVotes(view)
        } else {
            PacemakerState::WaitingForProposal(view)
        }
    }

    pub fn view(&self) -> ViewNumber {
        match self {
            PacemakerState::WaitingForProposal(view)
            | PacemakerState::WaitingForVotes(view)
            | PacemakerState::Proposed(view)
            | PacemakerState::TimedOut(view) => *view,
        }
    }
}

/// Enumerates the different ways a [`Pacemaker::enter_view`] call can fail.
#[derive(Debug, thiserror::Error)]
pub enum UpdateViewError {
    /// An attempt was made to update the current view to a lower or equal view. This violates the invariant
    /// that views must be monotonically increasing.
    #[error("cannot move from view {cur_view} to view {next_view}")]
    NonIncreasingViewError {
        cur_view: ViewNumber,
        next_view: ViewNumber,
    },
}

/// Describes a view (most often the current view), in terms of its view number and its view deadline (the
/// instant in time in which the view should end if no progress was made).
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct ViewInfo {
    pub view: ViewNumber,
    pub deadline: Instant,
}

impl ViewInfo {
    /// Create a new `ViewInfo` instance containing the provided parameters.
    pub(crate) fn new(view: ViewNumber, deadline: Instant) -> Self {
        Self { view, deadline }
    }
}

/// Deterministically select the leader of `view`: the validator at position `view mod n` in
/// `validator_set`.
///
/// [Read more](super#leader-selection).
///
/// # Panics
///
/// `validator_set` must not be empty. [`Configuration`](crate::replica::Configuration) never holds an
/// empty validator set.
pub fn select_leader(view: ViewNumber, validator_set: &ValidatorSet) -> VerifyingKey {
    let index = view.int() % (validator_set.len() as u64);
    validator_set.validators().as_slice()[index as usize]
}
