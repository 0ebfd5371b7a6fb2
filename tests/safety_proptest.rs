use std::time::Duration;

use chained_hotstuff::types::data_types::ViewNumber;
use proptest::prelude::*;

mod common;

use common::simulation::{SimConfig, Simulation};

/// An adversarial schedule for one simulated run of four replicas.
#[derive(Clone, Debug)]
struct Schedule {
    seed: u64,
    max_latency_ms: u64,
    drop_rate: f64,
    /// `(start, duration, members of the first group)` of a network partition.
    partition: Option<(u64, u64, Vec<usize>)>,
    /// The view whose leader equivocates.
    equivocation: Option<u64>,
}

fn schedule() -> impl Strategy<Value = Schedule> {
    (
        any::<u64>(),
        1..300u64,
        0.0..0.25f64,
        proptest::option::of((
            0..1_000u64,
            100..1_500u64,
            proptest::sample::subsequence(vec![0usize, 1, 2, 3], 1..=3),
        )),
        proptest::option::of(1..20u64),
    )
        .prop_map(
            |(seed, max_latency_ms, drop_rate, partition, equivocation)| Schedule {
                seed,
                max_latency_ms,
                drop_rate,
                partition,
                equivocation,
            },
        )
}

fn run(schedule: &Schedule) -> Simulation {
    let mut config = SimConfig::new(4, schedule.seed);
    config.initial_view_timeout = Duration::from_millis(100);
    config.max_view_timeout = Duration::from_secs(2);
    config.max_latency = Duration::from_millis(schedule.max_latency_ms);
    config.drop_rate = schedule.drop_rate;

    let mut sim = Simulation::new(config);
    if let Some(view) = schedule.equivocation {
        sim.equivocate_at(ViewNumber::new(view));
    }
    sim.start();

    match &schedule.partition {
        Some((start, duration, group)) => {
            sim.run_for(Duration::from_millis(*start));
            sim.partition(&[group.as_slice()]);
            sim.run_for(Duration::from_millis(*duration));
            sim.heal();
        }
        None => (),
    }
    let remaining = Duration::from_millis(3_000).saturating_sub(sim.elapsed());
    sim.run_for(remaining);
    sim
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Whatever the latencies, losses, partitions and equivocations, no two replicas commit different
    /// blocks at the same height, and every replica's votes and commits only move forward.
    #[test]
    fn no_conflicting_commits(schedule in schedule()) {
        let sim = run(&schedule);

        prop_assert_eq!(sim.conflicting_commits(), None);
        for replica in 0..sim.len() {
            prop_assert!(sim.halted(replica).is_none(), "replica {} halted: {:?}", replica, sim.halted(replica));

            let votes = sim.vote_views(replica);
            prop_assert!(votes.windows(2).all(|pair| pair[0] < pair[1]));

            let commits = sim.commit_heights(replica);
            for (expected, height) in commits.iter().enumerate() {
                prop_assert_eq!(*height, ViewNumber::new(expected as u64 + 1));
            }

            let chain = sim.committed_chain(replica);
            let executed = sim.app(replica).executed();
            prop_assert_eq!(executed.len(), chain.len());
            for (block, (height, command)) in chain.iter().zip(executed.iter()) {
                prop_assert_eq!(block.height, *height);
                prop_assert_eq!(&block.command, command);
            }
        }
    }
}
