//! [`RecordingApp`], the [`App`] used in all of the integration tests.

use std::sync::{Arc, Mutex};

use chained_hotstuff::{
    app::App,
    types::data_types::{BlockHeight, Command, ViewNumber},
};

/// An app that proposes a command naming its replica and the view, and records every command it is
/// asked to execute.
///
/// The execution log is shared between clones, so that a test can keep a handle to it after moving the
/// app into a replica.
#[derive(Clone)]
pub(crate) struct RecordingApp {
    replica: usize,
    executed: Arc<Mutex<Vec<(BlockHeight, Command)>>>,
}

impl RecordingApp {
    pub(crate) fn new(replica: usize) -> RecordingApp {
        RecordingApp {
            replica,
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every `(height, command)` executed so far, in execution order.
    pub(crate) fn executed(&self) -> Vec<(BlockHeight, Command)> {
        self.executed.lock().unwrap().clone()
    }

    /// Number of times the block at `height` was executed.
    pub(crate) fn executions_at(&self, height: BlockHeight) -> usize {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .filter(|(executed_height, _)| *executed_height == height)
            .count()
    }
}

impl App for RecordingApp {
    fn produce_command(&mut self, view: ViewNumber) -> Command {
        Command::new(format!("replica {} view {}", self.replica, view).into_bytes())
    }

    fn execute(&mut self, command: &Command, commit_height: BlockHeight) {
        self.executed
            .lock()
            .unwrap()
            .push((commit_height, command.clone()));
    }
}
