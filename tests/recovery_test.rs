use std::time::Duration;

use chained_hotstuff::{
    block_tree::accessors::internal::BlockTreeSingleton, types::data_types::ViewNumber,
};

mod common;

use common::simulation::{SimConfig, Simulation};

/// A replica that crashes mid-run and restarts on its store resumes in the view it persisted, with the
/// lock and the last vote it had before the crash. It never votes again in a view it already voted in,
/// and never executes a committed block twice.
#[test]
fn restarted_replica_keeps_its_lock_and_votes() {
    let mut sim = Simulation::new(SimConfig::new(4, 9));
    sim.start();

    // 1. Make progress, then crash replica 1 right after it has voted.
    assert!(sim.run_until(Duration::from_secs(10), |sim| {
        sim.highest_committed_height(1) >= Some(ViewNumber::new(5))
            && sim.vote_views(1).last().map(|view| *view + 1) == sim.current_view(1)
    }));
    let before = sim
        .replica(1)
        .unwrap()
        .block_tree()
        .replica_state()
        .unwrap();
    let committed_before = sim.highest_committed_height(1);
    assert!(before.last_voted_height > ViewNumber::init());
    assert!(!before.locked_qc.is_genesis_qc());

    sim.restart(1);

    // 2. The new instance picks up exactly where the old one left off.
    let replica = sim.replica(1).unwrap();
    assert_eq!(replica.current_view(), before.current_view);
    let after = replica.block_tree().replica_state().unwrap();
    assert_eq!(after.locked_qc, before.locked_qc);
    assert_eq!(after.last_voted_height, before.last_voted_height);
    assert_eq!(after.high_qc, before.high_qc);
    assert_eq!(sim.highest_committed_height(1), committed_before);

    // 3. Progress resumes, and replica 1 takes part in it.
    let votes_at_restart = sim.vote_views(1).len();
    let target = sim.highest_committed_height(0).unwrap() + 10;
    assert!(sim.run_until(Duration::from_secs(60), |sim| {
        (0..sim.len()).all(|i| sim.highest_committed_height(i) >= Some(target))
    }));
    assert!(sim.halted(1).is_none());
    assert_eq!(sim.conflicting_commits(), None);

    let votes = sim.vote_views(1);
    assert!(votes.len() > votes_at_restart);
    assert!(votes[votes_at_restart..]
        .iter()
        .all(|view| *view > before.last_voted_height));
    assert!(votes.windows(2).all(|pair| pair[0] < pair[1]));

    for block in sim.committed_chain(1) {
        assert_eq!(sim.app(1).executions_at(block.height), 1);
    }
}

/// Persisting the replica state leaves the committed chain alone.
#[test]
fn persisting_replica_state_keeps_highest_committed_block() {
    let mut sim = Simulation::new(SimConfig::new(4, 11));
    sim.start();
    assert!(sim.run_until(Duration::from_secs(10), |sim| {
        sim.highest_committed_height(2) >= Some(ViewNumber::new(3))
    }));
    sim.isolate_all();

    // Replica 2 no longer receives messages, so nothing else writes to its store.
    let mut block_tree = unsafe { BlockTreeSingleton::new_unsafe(sim.store(2)) };
    let committed = block_tree.highest_committed_block().unwrap();
    assert!(committed.is_some());

    let mut state = block_tree.replica_state().unwrap();
    state.current_view += 1;
    block_tree.persist_state(&state).unwrap();

    assert_eq!(block_tree.replica_state().unwrap(), state);
    assert_eq!(block_tree.highest_committed_block().unwrap(), committed);
}
