/// Property-based tests for seeding, bracket plans and full play-outs
///
/// A play-out reports random results for every playable match until the
/// stage has a champion, then checks double-elimination bookkeeping.
mod common;

use bracket_engine::bracket::{
    BracketKind, BracketPlan, CompetitorId, Match, SUPPORTED_BRACKET_SIZES, seed_competitors,
    seed_pairs,
};
use common::{memory_manager, play_out};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

// Strategy to pick one of the supported bracket sizes
fn size_strategy() -> impl Strategy<Value = u32> {
    prop::sample::select(SUPPORTED_BRACKET_SIZES.to_vec())
}

// Strategy to pick a size and a competitor count that fits it
fn field_strategy() -> impl Strategy<Value = (u32, usize)> {
    size_strategy().prop_flat_map(|size| (Just(size), 2..=size as usize))
}

// Coin flip per match, stable for a given seed
fn random_winner(seed: u64) -> impl Fn(&Match) -> CompetitorId {
    move |m: &Match| {
        let a = m.slot_a.competitor().expect("slot a filled");
        let b = m.slot_b.competitor().expect("slot b filled");
        let mixed = (m.id as u64)
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add(seed)
            .rotate_left(17);
        if mixed % 2 == 0 { a } else { b }
    }
}

struct PlayOut {
    champion: Option<CompetitorId>,
    losses: HashMap<CompetitorId, usize>,
    all_complete: bool,
    reset_count: usize,
}

fn run_play_out(size: u32, competitors: usize, seed: u64) -> PlayOut {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    runtime.block_on(async {
        let (manager, _) = memory_manager();
        let field: Vec<CompetitorId> = (100..100 + competitors as CompetitorId).collect();
        manager.generate(1, &field, size).await.expect("generate");

        play_out(&manager, 1, random_winner(seed)).await;

        let overview = manager.stage_overview(1).await.expect("overview");
        let mut losses: HashMap<CompetitorId, usize> = field.iter().map(|&c| (c, 0)).collect();
        let mut reset_count = 0;
        for m in overview.iter().flat_map(|b| &b.matches) {
            if m.is_bracket_reset {
                reset_count += 1;
            }
            let Some(winner) = m.winner else { continue };
            for slot in [m.slot_a, m.slot_b] {
                if let Some(c) = slot.competitor() {
                    if c != winner {
                        *losses.entry(c).or_default() += 1;
                    }
                }
            }
        }

        PlayOut {
            champion: manager.champion(1).await.expect("champion"),
            losses,
            all_complete: overview.iter().all(|b| b.bracket.is_complete),
            reset_count,
        }
    })
}

proptest! {
    #[test]
    fn test_seed_pairs_cover_every_position(exp in 1u32..=6) {
        let n = 1usize << exp;
        let pairs = seed_pairs(n).unwrap();

        prop_assert_eq!(pairs.len(), n / 2);
        let mut seen = HashSet::new();
        for (low, high) in pairs {
            prop_assert!(low < high);
            prop_assert_eq!(low + high, n - 1);
            prop_assert!(seen.insert(low));
            prop_assert!(seen.insert(high));
        }
        prop_assert_eq!(seen.len(), n);
    }

    #[test]
    fn test_seeded_slots_never_repeat_a_competitor((size, count) in field_strategy()) {
        let roster: Vec<CompetitorId> = (1..=count as CompetitorId).collect();
        let slots = seed_competitors(&roster, size as usize).unwrap();

        let placed: Vec<CompetitorId> = slots
            .iter()
            .flat_map(|(a, b)| [a.competitor(), b.competitor()])
            .flatten()
            .collect();
        let unique: HashSet<_> = placed.iter().collect();
        prop_assert_eq!(placed.len(), count);
        prop_assert_eq!(unique.len(), count);

        let byes = slots
            .iter()
            .flat_map(|(a, b)| [a.is_bye(), b.is_bye()])
            .filter(|&bye| bye)
            .count();
        prop_assert_eq!(byes, size as usize - count);
    }

    #[test]
    fn test_plan_links_form_two_converging_trees(size in size_strategy()) {
        let plan = BracketPlan::build(size).unwrap();
        let n = size as usize;

        prop_assert_eq!(plan.matches.len(), 2 * n - 2);
        prop_assert_eq!(plan.matches_of(BracketKind::Winner).count(), n - 1);
        prop_assert_eq!(plan.matches_of(BracketKind::GrandFinals).count(), 1);

        // Every match except grand finals receives exactly two entrants
        let mut incoming = vec![0usize; plan.matches.len()];
        for (index, m) in plan.matches.iter().enumerate() {
            if m.kind == BracketKind::Winner && m.round == 1 {
                incoming[index] += 2;
            }
            for target in [m.advance_winner_to, m.advance_loser_to].into_iter().flatten() {
                prop_assert!(target > index);
                incoming[target] += 1;
            }
        }
        for (index, count) in incoming.iter().enumerate() {
            prop_assert_eq!(*count, 2, "match {} of size {}", index, size);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_random_play_out_eliminates_after_two_losses(
        (size, count) in field_strategy(),
        seed in any::<u64>(),
    ) {
        let outcome = run_play_out(size, count, seed);

        let champion = outcome.champion.expect("stage has a champion");
        prop_assert!(outcome.all_complete);
        prop_assert!(outcome.reset_count <= 1);

        for (&competitor, &losses) in &outcome.losses {
            if competitor == champion {
                // Champion only lost if grand finals went to a reset
                prop_assert_eq!(losses, outcome.reset_count);
            } else {
                prop_assert_eq!(losses, 2, "competitor {} lost {} times", competitor, losses);
            }
        }
    }
}
