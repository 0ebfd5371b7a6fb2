/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`App`] trait, the state machine that the replicated log drives.
//!
//! The consensus core orders opaque [`Command`]s. It asks the app for a command when the local replica
//! proposes, and hands every committed command back to the app exactly once, in height order.

use crate::types::data_types::{BlockHeight, Command, ViewNumber};

/// Methods that a type needs to implement to serve as the deterministic state machine of a replicated
/// log.
///
/// Implementors must be *deterministic*: executing the same sequence of commands must always lead to
/// the same state, on every replica.
pub trait App: Send {
    /// Called when the local replica is the leader of `view` and is about to propose. The returned
    /// command becomes the command of the proposed block.
    fn produce_command(&mut self, view: ViewNumber) -> Command;

    /// Apply a committed `command`, whose block sits at `commit_height`.
    ///
    /// Called once for every committed block, in strictly increasing order of `commit_height`, and only
    /// after the commit has been durably persisted. Blocks that filled views without a proposal carry an
    /// [empty](Command::is_empty) command.
    fn execute(&mut self, command: &Command, commit_height: BlockHeight);
}
