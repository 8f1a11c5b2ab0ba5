//! Double-elimination bracket generator.
//!
//! The structure is built in two steps. [`BracketPlan::build`] lays out every
//! match of a bracket size with its round, name and advancement links as
//! indexes into the plan. [`BracketGenerator::generate`] then persists a plan
//! for a stage, seeds round one and settles the byes.
//!
//! Layout for `size = 2^w`:
//!
//! - winner rounds `1..=w`, round `r` holding `size >> r` matches; match
//!   `2i` and `2i + 1` feed match `i` of the next round
//! - loser round 1 takes the round-one losers two by two; then for every
//!   winner round `k >= 2` a merge round pairs the loser-bracket survivors
//!   with the losers dropping out of winner round `k`, followed (except
//!   after the last winner round) by a consolidation round that halves the
//!   field
//! - a single grand finals match fed by the Winner Finals and Loser Finals

use log::{info, warn};
use std::collections::HashSet;

use super::errors::{BracketError, BracketResult};
use super::models::{
    BracketKind, CompetitorId, GenerateSummary, Match, MatchId, MatchStatus, NewBracket,
    NewMatch, SUPPORTED_BRACKET_SIZES, Slot, StageId,
};
use super::progression::Advancer;
use super::seeding::seed_competitors;
use crate::db::SharedStore;

/// One match of a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMatch {
    pub kind: BracketKind,
    pub round: u32,
    pub position: u32,
    pub round_name: String,
    /// Plan index of the match the winner moves to
    pub advance_winner_to: Option<usize>,
    /// Plan index of the match the loser drops to
    pub advance_loser_to: Option<usize>,
}

impl PlannedMatch {
    fn new(kind: BracketKind, round: u32, position: u32, round_name: String) -> Self {
        Self {
            kind,
            round,
            position,
            round_name,
            advance_winner_to: None,
            advance_loser_to: None,
        }
    }
}

/// Complete match layout of a double-elimination bracket
///
/// Matches are ordered winner bracket, loser bracket, grand finals, each by
/// round then position. Every link points to a later index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketPlan {
    pub size: u32,
    pub matches: Vec<PlannedMatch>,
    winner_rounds: Vec<Vec<usize>>,
    loser_rounds: Vec<Vec<usize>>,
    grand_finals: usize,
}

impl BracketPlan {
    /// Lay out a bracket of `size` positions
    ///
    /// # Errors
    ///
    /// * `BracketError::UnsupportedBracketSize` - size not in 4, 8, 16, 32
    pub fn build(size: u32) -> BracketResult<Self> {
        if !SUPPORTED_BRACKET_SIZES.contains(&size) {
            return Err(BracketError::UnsupportedBracketSize(size));
        }

        let total_rounds = size.trailing_zeros();
        let mut matches = Vec::with_capacity(2 * size as usize - 2);

        // Winner bracket
        let mut winner_rounds: Vec<Vec<usize>> = Vec::new();
        for round in 1..=total_rounds {
            let count = size >> round;
            let name = winner_round_name(round, count, size);
            winner_rounds.push(push_round(&mut matches, BracketKind::Winner, round, count, &name));
        }
        for pair in winner_rounds.windows(2) {
            for (position, &index) in pair[0].iter().enumerate() {
                matches[index].advance_winner_to = Some(pair[1][position / 2]);
            }
        }

        // Loser bracket
        let loser_round_count = 2 * (total_rounds - 1);
        let mut loser_rounds: Vec<Vec<usize>> = Vec::new();
        let mut next_loser_round = |matches: &mut Vec<PlannedMatch>, count: u32| {
            let round = loser_rounds.len() as u32 + 1;
            let name = loser_round_name(round, loser_round_count);
            let indexes = push_round(matches, BracketKind::Loser, round, count, &name);
            loser_rounds.push(indexes.clone());
            indexes
        };

        let first = next_loser_round(&mut matches, size >> 2);
        for (position, &index) in winner_rounds[0].iter().enumerate() {
            matches[index].advance_loser_to = Some(first[position / 2]);
        }

        let mut survivors = first;
        for k in 2..=total_rounds {
            let merge = next_loser_round(&mut matches, size >> k);
            for (position, &index) in survivors.iter().enumerate() {
                matches[index].advance_winner_to = Some(merge[position]);
            }
            for (position, &index) in winner_rounds[k as usize - 1].iter().enumerate() {
                matches[index].advance_loser_to = Some(merge[position]);
            }

            survivors = if k < total_rounds {
                let consolidation = next_loser_round(&mut matches, size >> (k + 1));
                for (position, &index) in merge.iter().enumerate() {
                    matches[index].advance_winner_to = Some(consolidation[position / 2]);
                }
                consolidation
            } else {
                merge
            };
        }

        // Grand finals
        let grand_finals = matches.len();
        matches.push(PlannedMatch::new(
            BracketKind::GrandFinals,
            1,
            0,
            BracketKind::GrandFinals.display_name().to_string(),
        ));
        if let Some(&winner_finals) = winner_rounds.last().and_then(|r| r.first()) {
            matches[winner_finals].advance_winner_to = Some(grand_finals);
        }
        if let Some(&loser_finals) = survivors.first() {
            matches[loser_finals].advance_winner_to = Some(grand_finals);
        }

        Ok(Self {
            size,
            matches,
            winner_rounds,
            loser_rounds,
            grand_finals,
        })
    }

    pub fn winner_round_count(&self) -> usize {
        self.winner_rounds.len()
    }

    pub fn loser_round_count(&self) -> usize {
        self.loser_rounds.len()
    }

    /// Plan indexes of a winner round (1-based)
    pub fn winner_round(&self, round: u32) -> &[usize] {
        round_slice(&self.winner_rounds, round)
    }

    /// Plan indexes of a loser round (1-based)
    pub fn loser_round(&self, round: u32) -> &[usize] {
        round_slice(&self.loser_rounds, round)
    }

    pub fn grand_finals(&self) -> usize {
        self.grand_finals
    }

    /// Matches of one bracket kind
    pub fn matches_of(&self, kind: BracketKind) -> impl Iterator<Item = &PlannedMatch> {
        self.matches.iter().filter(move |m| m.kind == kind)
    }
}

fn push_round(
    matches: &mut Vec<PlannedMatch>,
    kind: BracketKind,
    round: u32,
    count: u32,
    name: &str,
) -> Vec<usize> {
    (0..count)
        .map(|position| {
            matches.push(PlannedMatch::new(kind, round, position, name.to_string()));
            matches.len() - 1
        })
        .collect()
}

fn round_slice(rounds: &[Vec<usize>], round: u32) -> &[usize] {
    round
        .checked_sub(1)
        .and_then(|i| rounds.get(i as usize))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Name of a winner-bracket round holding `count` matches
pub fn winner_round_name(round: u32, count: u32, size: u32) -> String {
    if round == 1 {
        return format!("Round of {}", size);
    }

    match count {
        1 => "Winner Finals".to_string(),
        2 => "Winner Semifinals".to_string(),
        4 => "Winner Quarterfinals".to_string(),
        _ => format!("Winner Round {}", round),
    }
}

/// Name of a loser-bracket round
pub fn loser_round_name(round: u32, total: u32) -> String {
    if round == total {
        "Loser Finals".to_string()
    } else {
        format!("Loser Round {}", round)
    }
}

/// Builds and persists brackets for a tournament stage
#[derive(Clone)]
pub struct BracketGenerator {
    store: SharedStore,
}

impl BracketGenerator {
    /// Create a new bracket generator
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Replace the brackets of `stage_id` with a fresh double-elimination
    /// structure
    ///
    /// `competitors` is in seed order. Extra competitors beyond
    /// `bracket_size` are dropped; missing ones become byes, which are
    /// settled before returning.
    ///
    /// # Errors
    ///
    /// * `BracketError::UnsupportedBracketSize` - size not in 4, 8, 16, 32
    /// * `BracketError::NotEnoughCompetitors` - fewer than 2 competitors
    /// * `BracketError::DuplicateCompetitor` - a competitor is listed twice
    /// * `BracketError::Store` - storage failure; nothing is written
    pub async fn generate(
        &self,
        stage_id: StageId,
        competitors: &[CompetitorId],
        bracket_size: u32,
    ) -> BracketResult<GenerateSummary> {
        let plan = BracketPlan::build(bracket_size)?;

        if competitors.len() < 2 {
            return Err(BracketError::NotEnoughCompetitors {
                needed: 2,
                current: competitors.len(),
            });
        }

        let mut seen = HashSet::with_capacity(competitors.len());
        if let Some(&duplicate) = competitors.iter().find(|&&c| !seen.insert(c)) {
            return Err(BracketError::DuplicateCompetitor(duplicate));
        }

        let size = bracket_size as usize;
        let seeded = if competitors.len() > size {
            warn!(
                "Stage {}: {} competitors for a bracket of {}, dropping seeds {}..={}",
                stage_id,
                competitors.len(),
                size,
                size + 1,
                competitors.len()
            );
            &competitors[..size]
        } else {
            competitors
        };
        let first_round = seed_competitors(seeded, size)?;

        let mut tx = self.store.begin().await?;
        tx.lock_stage(stage_id).await?;

        // Clear previous structure
        for bracket in tx.list_brackets(stage_id).await? {
            let removed = tx.delete_matches_by_bracket(bracket.id).await?;
            tx.delete_bracket(bracket.id).await?;
            info!(
                "Stage {}: removed {} ({} matches)",
                stage_id, bracket.name, removed
            );
        }

        let winner = tx
            .create_bracket(&NewBracket::conventional(stage_id, BracketKind::Winner, bracket_size))
            .await?;
        let loser = tx
            .create_bracket(&NewBracket::conventional(stage_id, BracketKind::Loser, bracket_size))
            .await?;
        let grand_finals = tx
            .create_bracket(&NewBracket::conventional(
                stage_id,
                BracketKind::GrandFinals,
                bracket_size,
            ))
            .await?;

        let bracket_id_of = |kind: BracketKind| match kind {
            BracketKind::Winner => winner.id,
            BracketKind::Loser => loser.id,
            BracketKind::GrandFinals => grand_finals.id,
        };

        // Link targets always sit at a higher index, so inserting back to
        // front guarantees every referenced match already exists.
        let mut ids: Vec<Option<MatchId>> = vec![None; plan.matches.len()];
        let mut round_one: Vec<Match> = Vec::with_capacity(first_round.len());

        for (index, planned) in plan.matches.iter().enumerate().rev() {
            let (slot_a, slot_b) = if planned.kind == BracketKind::Winner && planned.round == 1 {
                first_round[planned.position as usize]
            } else {
                (Slot::Empty, Slot::Empty)
            };

            let created = tx
                .create_match(&NewMatch {
                    bracket_id: bracket_id_of(planned.kind),
                    round: planned.round,
                    position: planned.position,
                    round_name: planned.round_name.clone(),
                    slot_a,
                    slot_b,
                    status: MatchStatus::Scheduled,
                    advance_winner_to: planned.advance_winner_to.and_then(|i| ids[i]),
                    advance_loser_to: planned.advance_loser_to.and_then(|i| ids[i]),
                    is_bracket_reset: false,
                })
                .await?;

            ids[index] = Some(created.id);
            if planned.kind == BracketKind::Winner && planned.round == 1 {
                round_one.push(created);
            }
        }

        // Inserted in reverse; settle byes in bracket order
        round_one.reverse();
        let mut advancer = Advancer::new(tx);
        for m in &round_one {
            advancer.consider(m);
        }
        advancer.settle_pending().await?;
        advancer.refresh_completion().await?;

        let byes_settled = advancer.byes_settled();
        advancer.commit().await?;

        info!(
            "Stage {}: generated bracket of {} with {} competitors ({} matches, {} byes settled)",
            stage_id,
            bracket_size,
            seeded.len(),
            plan.matches.len(),
            byes_settled
        );

        Ok(GenerateSummary {
            stage_id,
            winner_bracket_id: winner.id,
            loser_bracket_id: loser.id,
            grandfinals_bracket_id: grand_finals.id,
            match_count: plan.matches.len(),
            seeded: seeded.len(),
            byes_settled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unsupported_sizes() {
        for size in [0, 2, 3, 6, 12, 64] {
            assert!(
                matches!(
                    BracketPlan::build(size),
                    Err(BracketError::UnsupportedBracketSize(s)) if s == size
                ),
                "size {} should be rejected",
                size
            );
        }
    }

    #[test]
    fn test_plan_of_eight() {
        let plan = BracketPlan::build(8).unwrap();

        assert_eq!(plan.matches.len(), 14);
        assert_eq!(plan.winner_round_count(), 3);
        assert_eq!(plan.loser_round_count(), 4);
        assert_eq!(plan.matches_of(BracketKind::Winner).count(), 7);
        assert_eq!(plan.matches_of(BracketKind::Loser).count(), 6);
        assert_eq!(plan.matches_of(BracketKind::GrandFinals).count(), 1);

        let names: Vec<&str> = plan
            .matches
            .iter()
            .map(|m| m.round_name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "Round of 8",
                "Round of 8",
                "Round of 8",
                "Round of 8",
                "Winner Semifinals",
                "Winner Semifinals",
                "Winner Finals",
                "Loser Round 1",
                "Loser Round 1",
                "Loser Round 2",
                "Loser Round 2",
                "Loser Round 3",
                "Loser Finals",
                "Grand Finals",
            ]
        );
    }

    #[test]
    fn test_plan_links_of_eight() {
        let plan = BracketPlan::build(8).unwrap();
        let m = &plan.matches;

        // Winner round 1 feeds the semifinals pairwise and drops into loser round 1
        assert_eq!(m[0].advance_winner_to, Some(4));
        assert_eq!(m[1].advance_winner_to, Some(4));
        assert_eq!(m[2].advance_winner_to, Some(5));
        assert_eq!(m[3].advance_winner_to, Some(5));
        assert_eq!(m[0].advance_loser_to, Some(7));
        assert_eq!(m[1].advance_loser_to, Some(7));
        assert_eq!(m[2].advance_loser_to, Some(8));
        assert_eq!(m[3].advance_loser_to, Some(8));

        // Semifinal losers meet loser round 1 survivors one to one
        assert_eq!(m[4].advance_loser_to, Some(9));
        assert_eq!(m[5].advance_loser_to, Some(10));
        assert_eq!(m[7].advance_winner_to, Some(9));
        assert_eq!(m[8].advance_winner_to, Some(10));

        // Consolidation, then the Winner Finals loser joins in Loser Finals
        assert_eq!(m[9].advance_winner_to, Some(11));
        assert_eq!(m[10].advance_winner_to, Some(11));
        assert_eq!(m[11].advance_winner_to, Some(12));
        assert_eq!(m[6].advance_loser_to, Some(12));

        assert_eq!(m[6].advance_winner_to, Some(13));
        assert_eq!(m[12].advance_winner_to, Some(13));
        assert_eq!(m[13].advance_winner_to, None);
        assert_eq!(m[13].advance_loser_to, None);
        assert_eq!(plan.grand_finals(), 13);
    }

    #[test]
    fn test_plan_of_four() {
        let plan = BracketPlan::build(4).unwrap();
        assert_eq!(plan.matches.len(), 6);
        assert_eq!(plan.loser_round_count(), 2);
        assert_eq!(plan.matches[2].round_name, "Winner Finals");
        assert_eq!(plan.matches[3].round_name, "Loser Round 1");
        assert_eq!(plan.matches[4].round_name, "Loser Finals");
    }

    #[test]
    fn test_round_names_for_larger_sizes() {
        let plan = BracketPlan::build(32).unwrap();
        let round_names: Vec<&str> = (1..=5)
            .map(|r| plan.matches[plan.winner_round(r)[0]].round_name.as_str())
            .collect();
        assert_eq!(
            round_names,
            vec![
                "Round of 32",
                "Winner Round 2",
                "Winner Quarterfinals",
                "Winner Semifinals",
                "Winner Finals"
            ]
        );
        assert_eq!(plan.loser_round_count(), 8);
        assert_eq!(
            plan.matches[plan.loser_round(8)[0]].round_name,
            "Loser Finals"
        );
    }

    #[test]
    fn test_links_point_forward() {
        for size in SUPPORTED_BRACKET_SIZES {
            let plan = BracketPlan::build(size).unwrap();
            for (index, m) in plan.matches.iter().enumerate() {
                for target in [m.advance_winner_to, m.advance_loser_to].into_iter().flatten() {
                    assert!(target > index, "size {}: {} -> {}", size, index, target);
                }
            }
        }
    }

    #[test]
    fn test_out_of_range_round_is_empty() {
        let plan = BracketPlan::build(4).unwrap();
        assert!(plan.winner_round(0).is_empty());
        assert!(plan.winner_round(3).is_empty());
        assert_eq!(plan.loser_round(1).len(), 1);
    }
}
