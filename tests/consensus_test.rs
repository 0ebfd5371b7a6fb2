use std::time::Duration;

use chained_hotstuff::{events::Event, types::data_types::ViewNumber};

mod common;

use common::simulation::{SimConfig, Simulation};

/// Four replicas on a healthy network. The block proposed in view 1 gets committed by a replica when it
/// sees the QC for view 3, which, for every replica other than the leader of view 4, arrives with the
/// proposal of view 4. The committed block is executed exactly once.
#[test]
fn first_block_commits_on_fourth_proposal() {
    // Equal latencies keep every replica's view of the run in causal order.
    let mut config = SimConfig::new(4, 1);
    config.min_latency = Duration::from_millis(5);
    config.max_latency = Duration::from_millis(5);
    let mut sim = Simulation::new(config);
    sim.start();

    // 1. Run until every replica has committed something.
    assert!(sim.run_until(Duration::from_secs(10), |sim| {
        (0..sim.len()).all(|i| sim.highest_committed_height(i).is_some())
    }));

    // 2. The leader of view 4 is replica 0. Every other replica commits height 1 only after receiving
    //    the proposal of view 4, and before receiving the proposal of view 5.
    for replica in 1..4 {
        let events = sim.events(replica);
        let received_proposal = |view: u64| {
            events.iter().position(|event| {
                matches!(event, Event::ReceiveProposal(e) if e.proposal.view == ViewNumber::new(view))
            })
        };
        let first_commit = events
            .iter()
            .position(|event| matches!(event, Event::CommitBlock(_)))
            .unwrap();

        assert!(received_proposal(4).unwrap() < first_commit);
        if let Some(fifth) = received_proposal(5) {
            assert!(first_commit < fifth);
        }
        match &events[first_commit] {
            Event::CommitBlock(commit) => assert_eq!(commit.height, ViewNumber::new(1)),
            _ => unreachable!(),
        }
    }

    // 3. Every replica committed the block proposed by replica 1 in view 1, and executes it once.
    sim.run_for(Duration::from_secs(2));
    for replica in 0..4 {
        let chain = sim.committed_chain(replica);
        assert_eq!(chain[0].height, ViewNumber::new(1));
        assert_eq!(chain[0].command.bytes(), &b"replica 1 view 1".to_vec());
        assert_eq!(sim.app(replica).executions_at(ViewNumber::new(1)), 1);
    }
}

/// On a healthy network, every replica commits one block per view, executes the committed chain in
/// height order, and agrees with every other replica.
#[test]
fn replicas_agree_and_make_steady_progress() {
    let mut sim = Simulation::new(SimConfig::new(4, 7));
    sim.start();

    assert!(sim.run_until(Duration::from_secs(30), |sim| {
        (0..sim.len()).all(|i| sim.highest_committed_height(i) >= Some(ViewNumber::new(30)))
    }));
    assert_eq!(sim.conflicting_commits(), None);

    for replica in 0..sim.len() {
        assert!(sim.halted(replica).is_none());

        let chain = sim.committed_chain(replica);
        let executed = sim.app(replica).executed();
        assert_eq!(executed.len(), chain.len());
        for (block, (height, command)) in chain.iter().zip(executed.iter()) {
            assert_eq!(block.height, *height);
            assert_eq!(&block.command, command);
        }

        // No view timed out, so no block is a filler.
        assert!(chain.iter().all(|block| !block.command.is_empty()));
    }
}

/// The views a replica votes in strictly increase, and the heights it commits go up one by one.
#[test]
fn votes_and_commits_are_monotonic() {
    let mut config = SimConfig::new(4, 11);
    config.max_latency = Duration::from_millis(250);
    config.drop_rate = 0.05;
    let mut sim = Simulation::new(config);
    sim.start();
    sim.run_for(Duration::from_secs(20));

    assert_eq!(sim.conflicting_commits(), None);
    for replica in 0..sim.len() {
        let votes = sim.vote_views(replica);
        assert!(!votes.is_empty());
        assert!(votes.windows(2).all(|pair| pair[0] < pair[1]));

        let commits = sim.commit_heights(replica);
        for (expected, height) in commits.iter().enumerate() {
            assert_eq!(*height, ViewNumber::new(expected as u64 + 1));
        }
        assert_eq!(
            commits.last().copied(),
            sim.highest_committed_height(replica)
        );
    }
}
