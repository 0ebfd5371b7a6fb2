use std::time::Duration;

use chained_hotstuff::{
    events::{Event, EquivocationKind},
    types::data_types::ViewNumber,
};

mod common;

use common::simulation::{SimConfig, Simulation};

/// Seven replicas. The leader of view 5 sends one block to some replicas and a conflicting block to
/// the others. The equivocation is reported by the replica that received both, neither block can
/// gather a quorum of votes, and the honest replicas go on to commit the same chain.
#[test]
fn equivocating_leader_cannot_split_honest_replicas() {
    let mut sim = Simulation::new(SimConfig::new(7, 21));
    sim.equivocate_at(ViewNumber::new(5));
    sim.start();

    let honest = [0, 1, 2, 3, 4, 6];
    assert!(sim.run_until(Duration::from_secs(60), |sim| {
        honest
            .iter()
            .all(|i| sim.highest_committed_height(*i) >= Some(ViewNumber::new(15)))
    }));
    assert_eq!(sim.conflicting_commits(), None);
    for replica in 0..sim.len() {
        assert!(sim.halted(replica).is_none());
    }

    // Replica 6 received both blocks, and reported the leader of view 5.
    let reported = sim.events(6).iter().any(|event| match event {
        Event::Equivocation(equivocation) => {
            equivocation.kind == EquivocationKind::Proposal
                && equivocation.view == ViewNumber::new(5)
                && equivocation.offender == sim.key(5)
                && equivocation.first != equivocation.second
        }
        _ => false,
    });
    assert!(reported);

    // Neither block of view 5 was certified, so height 5 is held by a filler.
    let chain = sim.committed_chain(0);
    assert!(chain[4].command.is_empty());
    assert_eq!(chain[4].height, ViewNumber::new(5));
}

/// A replica that signs votes for two different blocks in the same view is reported by the leader that
/// collects them, and only its first vote counts.
#[test]
fn double_voting_is_reported_and_not_counted() {
    use chained_hotstuff::{
        hotstuff::{aggregator::VoteAggregator, messages::Vote},
        types::{
            crypto_primitives::{SignatureSetScheme, SigningKey, ThresholdScheme},
            data_types::{ChainID, CryptoHash},
            validator_set::ValidatorSet,
        },
    };

    let keypairs: Vec<SigningKey> = (0..4u8)
        .map(|i| SigningKey::from_bytes(&[i + 40; 32]))
        .collect();
    let validator_set = ValidatorSet::new(keypairs.iter().map(|k| k.verifying_key()).collect());
    let schemes: Vec<SignatureSetScheme> = keypairs
        .into_iter()
        .map(|k| SignatureSetScheme::new(k, validator_set.clone()))
        .collect();

    let chain_id = ChainID::new(3);
    let view = ViewNumber::new(9);
    let (a, b) = (CryptoHash::new([1; 32]), CryptoHash::new([2; 32]));
    let mut aggregator = VoteAggregator::new(chain_id);

    assert!(aggregator
        .ingest(&Vote::new(&schemes[0], chain_id, view, a), &schemes[1])
        .is_none());
    assert!(aggregator
        .ingest(&Vote::new(&schemes[0], chain_id, view, b), &schemes[1])
        .is_none());

    let equivocations = aggregator.take_equivocations();
    assert_eq!(equivocations.len(), 1);
    assert_eq!(equivocations[0].signer, schemes[0].me().to_bytes());
    assert_eq!((equivocations[0].first, equivocations[0].second), (a, b));

    // Two more honest votes for `b` are not enough: the double vote does not count towards it.
    assert!(aggregator
        .ingest(&Vote::new(&schemes[2], chain_id, view, b), &schemes[1])
        .is_none());
    assert!(aggregator
        .ingest(&Vote::new(&schemes[3], chain_id, view, b), &schemes[1])
        .is_none());
    assert_eq!(aggregator.vote_count(view, &b), 2);
}
