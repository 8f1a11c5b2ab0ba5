//! Progression engine: moves the winner and loser of a decided match along
//! its advancement links.
//!
//! One call to [`ProgressionEngine::progress`] runs in one store
//! transaction:
//!
//! 1. validate the match (decided, winner sits in it, opponent present) and
//!    rewrite it, so two progressions of the same match cannot both commit
//! 2. place the winner in `advance_winner_to` and the loser (a competitor or
//!    a bye) in `advance_loser_to`
//! 3. in grand finals, open the bracket reset when the loser-bracket
//!    finalist won, or report the champion otherwise
//! 4. settle every destination that now faces a bye, cascading
//! 5. lock every touched bracket in id order and recompute `is_complete`
//!
//! A concurrent write to any of the rows involved surfaces as a version
//! conflict; the whole operation is then rerun from a fresh transaction.

use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap, VecDeque};

use super::config::EngineConfig;
use super::errors::{BracketError, BracketResult};
use super::models::{
    Bracket, BracketId, BracketKind, CompetitorId, Feed, GRAND_FINALS_RESET_NAME, Match,
    MatchId, MatchStatus, NewMatch, Occupant, ProgressionResult, Slot, SlotSide,
};
use crate::db::{SharedStore, StoreTransaction};

/// Place `occupant` in the first empty slot of `m`
///
/// `slot_a` is always filled before `slot_b`.
///
/// # Errors
///
/// * `BracketError::AlreadyAdvanced` - the competitor already sits in `m`
/// * `BracketError::SlotsFull` - neither slot is empty
pub fn assign_slot(m: &mut Match, occupant: Occupant, feed: Feed) -> BracketResult<SlotSide> {
    if let Occupant::Competitor(competitor) = occupant {
        if m.side_of(competitor).is_some() {
            return Err(BracketError::AlreadyAdvanced {
                match_id: m.id,
                competitor,
            });
        }
    }

    let side = if m.slot_a.is_empty() {
        SlotSide::A
    } else if m.slot_b.is_empty() {
        SlotSide::B
    } else {
        return Err(BracketError::SlotsFull(m.id));
    };

    let slot = occupant.into_slot(feed);
    match side {
        SlotSide::A => m.slot_a = slot,
        SlotSide::B => m.slot_b = slot,
    }
    Ok(side)
}

/// Winner of a decided match and the side it played on
///
/// # Errors
///
/// * `BracketError::MatchNotCompleted` - status is not completed or forfeit
/// * `BracketError::MissingWinner` - no winner recorded
/// * `BracketError::WinnerNotInMatch` - the winner occupies neither slot
/// * `BracketError::MissingOpponent` - the other slot is still empty
pub(crate) fn decided_winner(m: &Match) -> BracketResult<(CompetitorId, SlotSide)> {
    if !m.status.is_decided() {
        return Err(BracketError::MatchNotCompleted {
            match_id: m.id,
            status: m.status,
        });
    }

    let winner = m.winner.ok_or(BracketError::MissingWinner(m.id))?;
    let side = m.side_of(winner).ok_or(BracketError::WinnerNotInMatch {
        match_id: m.id,
        winner,
    })?;

    if m.slot(other_side(side)).is_empty() {
        return Err(BracketError::MissingOpponent(m.id));
    }

    Ok((winner, side))
}

pub(crate) fn other_side(side: SlotSide) -> SlotSide {
    match side {
        SlotSide::A => SlotSide::B,
        SlotSide::B => SlotSide::A,
    }
}

/// Applies advancement inside one open transaction.
///
/// Keeps a cache of the brackets it has seen, a worklist of matches that
/// became bye-settleable, and the set of brackets whose completion flag has
/// to be recomputed.
pub(crate) struct Advancer {
    tx: Box<dyn StoreTransaction>,
    brackets: HashMap<BracketId, Bracket>,
    pending: VecDeque<MatchId>,
    touched: BTreeSet<BracketId>,
    byes_settled: usize,
    champion: Option<CompetitorId>,
}

impl Advancer {
    pub(crate) fn new(tx: Box<dyn StoreTransaction>) -> Self {
        Self {
            tx,
            brackets: HashMap::new(),
            pending: VecDeque::new(),
            touched: BTreeSet::new(),
            byes_settled: 0,
            champion: None,
        }
    }

    pub(crate) async fn bracket(&mut self, bracket_id: BracketId) -> BracketResult<Bracket> {
        if let Some(bracket) = self.brackets.get(&bracket_id) {
            return Ok(bracket.clone());
        }

        let bracket = self
            .tx
            .get_bracket(bracket_id)
            .await?
            .ok_or(BracketError::BracketNotFound(bracket_id))?;
        self.brackets.insert(bracket_id, bracket.clone());
        Ok(bracket)
    }

    pub(crate) async fn load_match(&mut self, match_id: MatchId) -> BracketResult<Match> {
        self.tx
            .get_match(match_id)
            .await?
            .ok_or(BracketError::MatchNotFound(match_id))
    }

    pub(crate) async fn save_match(&mut self, m: &mut Match) -> BracketResult<()> {
        self.tx.update_match(m).await?;
        self.touched.insert(m.bracket_id);
        Ok(())
    }

    /// Queue a match for bye settlement if it is settleable
    pub(crate) fn consider(&mut self, m: &Match) {
        if m.is_bye_settleable() {
            self.pending.push_back(m.id);
        }
    }

    pub(crate) fn touch(&mut self, bracket_id: BracketId) {
        self.touched.insert(bracket_id);
    }

    /// Send the winner and loser of `m` along its links
    ///
    /// Returns the destinations that were written.
    pub(crate) async fn advance(
        &mut self,
        m: &Match,
        winner: Occupant,
        loser: Occupant,
    ) -> BracketResult<(Option<MatchId>, Option<MatchId>)> {
        let feed = Feed::from_kind(self.bracket(m.bracket_id).await?.kind);

        let winner_to = match m.advance_winner_to {
            Some(dest) => Some(self.place(dest, winner, feed).await?),
            None => None,
        };
        let loser_to = match m.advance_loser_to {
            Some(dest) => Some(self.place(dest, loser, feed).await?),
            None => None,
        };

        Ok((winner_to, loser_to))
    }

    async fn place(&mut self, dest: MatchId, occupant: Occupant, feed: Feed) -> BracketResult<MatchId> {
        let mut target = self.load_match(dest).await?;
        let side = assign_slot(&mut target, occupant, feed)?;
        self.save_match(&mut target).await?;
        debug!(
            "Placed {:?} in slot {:?} of match {} ({})",
            occupant, side, target.id, target.round_name
        );
        self.consider(&target);
        Ok(dest)
    }

    /// Open the bracket reset for a grand finals match
    pub(crate) async fn create_reset(&mut self, grand_finals: &Match) -> BracketResult<MatchId> {
        let existing = self.tx.list_matches_by_bracket(grand_finals.bracket_id).await?;
        if existing.iter().any(|m| m.is_bracket_reset) {
            return Err(BracketError::ResetAlreadyExists(grand_finals.bracket_id));
        }

        let carry = |slot: &Slot| match slot.occupant() {
            Some(occupant) => occupant.into_slot(Feed::GrandFinals),
            None => Slot::Empty,
        };

        let reset = self
            .tx
            .create_match(&NewMatch {
                bracket_id: grand_finals.bracket_id,
                round: grand_finals.round + 1,
                position: 0,
                round_name: GRAND_FINALS_RESET_NAME.to_string(),
                slot_a: carry(&grand_finals.slot_a),
                slot_b: carry(&grand_finals.slot_b),
                status: MatchStatus::Scheduled,
                advance_winner_to: None,
                advance_loser_to: None,
                is_bracket_reset: true,
            })
            .await?;

        self.touched.insert(grand_finals.bracket_id);
        info!(
            "Bracket reset {} opened in bracket {}",
            reset.id, grand_finals.bracket_id
        );
        Ok(reset.id)
    }

    pub(crate) fn crown(&mut self, champion: CompetitorId) {
        info!("Competitor {} won the stage", champion);
        self.champion = Some(champion);
    }

    /// Resolve every queued bye match, following the cascade
    pub(crate) async fn settle_pending(&mut self) -> BracketResult<()> {
        while let Some(match_id) = self.pending.pop_front() {
            let mut m = self.load_match(match_id).await?;
            if !m.is_bye_settleable() {
                continue;
            }

            let (winner, loser) = match (m.slot_a.occupant(), m.slot_b.occupant()) {
                (Some(Occupant::Competitor(c)), _) | (_, Some(Occupant::Competitor(c))) => {
                    m.status = MatchStatus::Completed;
                    m.winner = Some(c);
                    (Occupant::Competitor(c), Occupant::Bye)
                }
                _ => {
                    m.status = MatchStatus::Cancelled;
                    (Occupant::Bye, Occupant::Bye)
                }
            };

            self.save_match(&mut m).await?;
            self.byes_settled += 1;
            debug!("Settled bye match {} ({})", m.id, m.round_name);

            self.advance(&m, winner, loser).await?;

            if let Occupant::Competitor(c) = winner {
                if self.bracket(m.bracket_id).await?.kind == BracketKind::GrandFinals {
                    self.crown(c);
                }
            }
        }

        Ok(())
    }

    /// Recompute `is_complete` for every bracket written so far
    ///
    /// Brackets are locked in ascending id order, and the flag is computed
    /// from matches read under the lock.
    pub(crate) async fn refresh_completion(&mut self) -> BracketResult<()> {
        let touched: Vec<BracketId> = self.touched.iter().copied().collect();

        for bracket_id in touched {
            let mut bracket = self
                .tx
                .lock_bracket(bracket_id)
                .await?
                .ok_or(BracketError::BracketNotFound(bracket_id))?;
            let matches = self.tx.list_matches_by_bracket(bracket_id).await?;
            let complete = !matches.is_empty() && matches.iter().all(|m| m.status.is_terminal());

            if bracket.is_complete != complete {
                bracket.is_complete = complete;
                self.tx.update_bracket(&bracket).await?;
                self.brackets.insert(bracket_id, bracket.clone());
                if complete {
                    info!("{} (bracket {}) is complete", bracket.name, bracket_id);
                }
            }
        }

        Ok(())
    }

    pub(crate) fn byes_settled(&self) -> usize {
        self.byes_settled
    }

    pub(crate) fn champion(&self) -> Option<CompetitorId> {
        self.champion
    }

    pub(crate) async fn commit(self) -> BracketResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

/// Progression engine
#[derive(Clone)]
pub struct ProgressionEngine {
    store: SharedStore,
    config: EngineConfig,
}

impl ProgressionEngine {
    /// Create a new progression engine
    pub fn new(store: SharedStore, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Advance the winner and loser of a completed match
    ///
    /// Retried from the top on a concurrent write, up to
    /// `EngineConfig::max_progress_attempts` times.
    ///
    /// # Errors
    ///
    /// * `BracketError::MatchNotFound` - no such match
    /// * `BracketError::MatchNotCompleted` / `MissingWinner` /
    ///   `WinnerNotInMatch` / `MissingOpponent` - the match cannot be progressed
    /// * `BracketError::SlotsFull` / `AlreadyAdvanced` - a destination does not
    ///   accept the competitor; nothing is written
    /// * `BracketError::ResetAlreadyExists` - grand finals already reset
    /// * `BracketError::Store` - storage failure, or conflicts on every attempt
    pub async fn progress(&self, match_id: MatchId) -> BracketResult<ProgressionResult> {
        let attempts = self.config.max_progress_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.progress_once(match_id).await {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        "Progression of match {} conflicted (attempt {}/{}): {}",
                        match_id, attempt, attempts, e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.config.retry_backoff()).await;
                }
                other => return other,
            }
        }
    }

    async fn progress_once(&self, match_id: MatchId) -> BracketResult<ProgressionResult> {
        let mut advancer = Advancer::new(self.store.begin().await?);

        let mut m = advancer.load_match(match_id).await?;
        let (winner, winner_side) = decided_winner(&m)?;
        let loser = m
            .slot(other_side(winner_side))
            .occupant()
            .ok_or(BracketError::MissingOpponent(m.id))?;

        // Rewrite the source row so concurrent progressions of this match
        // conflict even when it has no destinations
        advancer.save_match(&mut m).await?;

        let mut result = ProgressionResult::default();
        let (winner_to, loser_to) = advancer
            .advance(&m, Occupant::Competitor(winner), loser)
            .await?;
        result.winner_advanced_to = winner_to;
        result.loser_advanced_to = loser_to;

        let bracket = advancer.bracket(m.bracket_id).await?;
        if bracket.kind == BracketKind::GrandFinals {
            let winner_feed = m.slot(winner_side).feed();
            if !m.is_bracket_reset && winner_feed == Some(Feed::LoserBracket) {
                let reset_id = advancer.create_reset(&m).await?;
                result.bracket_reset_created = true;
                result.bracket_reset_match_id = Some(reset_id);
            } else {
                advancer.crown(winner);
            }
        }

        advancer.touch(m.bracket_id);
        advancer.settle_pending().await?;
        advancer.refresh_completion().await?;

        result.byes_settled = advancer.byes_settled();
        result.champion = advancer.champion();
        advancer.commit().await?;

        info!(
            "Progressed match {} ({}): winner {} -> {:?}, loser -> {:?}",
            m.id, m.round_name, winner, result.winner_advanced_to, result.loser_advanced_to
        );
        Ok(result)
    }
}
