//! Bracket manager: the entry point callers use to run a stage.

use log::{info, warn};

use super::config::EngineConfig;
use super::errors::{BracketError, BracketResult};
use super::generator::BracketGenerator;
use super::models::{
    BracketKind, BracketOverview, CompetitorId, Feed, GenerateSummary, Match, MatchId,
    MatchStatus, ProgressionResult, StageId,
};
use super::progression::ProgressionEngine;
use crate::db::SharedStore;

/// Bracket manager
#[derive(Clone)]
pub struct BracketManager {
    store: SharedStore,
    generator: BracketGenerator,
    engine: ProgressionEngine,
}

impl BracketManager {
    /// Create a new bracket manager
    pub fn new(store: SharedStore, config: EngineConfig) -> Self {
        Self {
            generator: BracketGenerator::new(store.clone()),
            engine: ProgressionEngine::new(store.clone(), config),
            store,
        }
    }

    /// Replace the brackets of a stage
    pub async fn generate(
        &self,
        stage_id: StageId,
        competitors: &[CompetitorId],
        bracket_size: u32,
    ) -> BracketResult<GenerateSummary> {
        self.generator
            .generate(stage_id, competitors, bracket_size)
            .await
    }

    /// Progress a match that already carries its result
    pub async fn progress(&self, match_id: MatchId) -> BracketResult<ProgressionResult> {
        self.engine.progress(match_id).await
    }

    /// Record the result of a match and progress it
    ///
    /// The result is committed before progression starts. If progression
    /// then fails the match stays completed and `progress` can be called
    /// again once the cause is fixed.
    ///
    /// # Errors
    ///
    /// * `BracketError::MatchNotFound` - no such match
    /// * `BracketError::AlreadyCompleted` - the match already has a result
    /// * `BracketError::MissingOpponent` - a slot is still empty
    /// * `BracketError::WinnerNotInMatch` - `winner` does not play in the match
    /// * any error of [`ProgressionEngine::progress`]
    pub async fn report_result(
        &self,
        match_id: MatchId,
        score_a: i32,
        score_b: i32,
        winner: CompetitorId,
    ) -> BracketResult<ProgressionResult> {
        self.decide(match_id, MatchStatus::Completed, winner, Some((score_a, score_b)))
            .await?;
        info!(
            "Match {} reported {}-{}, winner {}",
            match_id, score_a, score_b, winner
        );
        self.engine.progress(match_id).await
    }

    /// Award a match by forfeit and progress it
    pub async fn record_forfeit(
        &self,
        match_id: MatchId,
        winner: CompetitorId,
    ) -> BracketResult<ProgressionResult> {
        self.decide(match_id, MatchStatus::Forfeit, winner, None).await?;
        info!("Match {} forfeited, winner {}", match_id, winner);
        self.engine.progress(match_id).await
    }

    async fn decide(
        &self,
        match_id: MatchId,
        status: MatchStatus,
        winner: CompetitorId,
        scores: Option<(i32, i32)>,
    ) -> BracketResult<()> {
        let mut tx = self.store.begin().await?;
        let mut m = tx
            .get_match(match_id)
            .await?
            .ok_or(BracketError::MatchNotFound(match_id))?;

        if m.status.is_terminal() {
            return Err(BracketError::AlreadyCompleted(match_id));
        }
        if m.slot_a.is_empty() || m.slot_b.is_empty() {
            return Err(BracketError::MissingOpponent(match_id));
        }
        if m.side_of(winner).is_none() {
            return Err(BracketError::WinnerNotInMatch { match_id, winner });
        }

        if let Some((score_a, score_b)) = scores {
            m.score_a = Some(score_a);
            m.score_b = Some(score_b);
        }
        m.winner = Some(winner);
        m.status = status;

        tx.update_match(&mut m).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Move a match to `in_progress` or `cancelled`
    ///
    /// Results go through [`report_result`](Self::report_result) and
    /// [`record_forfeit`](Self::record_forfeit) instead.
    ///
    /// # Errors
    ///
    /// * `BracketError::InvalidStatusChange` - transition not allowed
    pub async fn set_status(&self, match_id: MatchId, status: MatchStatus) -> BracketResult<Match> {
        let mut tx = self.store.begin().await?;
        let mut m = tx
            .get_match(match_id)
            .await?
            .ok_or(BracketError::MatchNotFound(match_id))?;

        let allowed = match (m.status, status) {
            (MatchStatus::Scheduled, MatchStatus::InProgress) => true,
            (MatchStatus::Scheduled | MatchStatus::InProgress, MatchStatus::Cancelled) => true,
            _ => false,
        };
        if !allowed {
            return Err(BracketError::InvalidStatusChange {
                match_id,
                from: m.status,
                to: status,
            });
        }

        if status == MatchStatus::Cancelled {
            warn!(
                "Match {} cancelled; its competitors will not advance",
                match_id
            );
        }

        m.status = status;
        tx.update_match(&mut m).await?;
        tx.commit().await?;
        Ok(m)
    }

    /// Every bracket of a stage with its matches
    pub async fn stage_overview(&self, stage_id: StageId) -> BracketResult<Vec<BracketOverview>> {
        let mut tx = self.store.begin().await?;
        let mut overview = Vec::new();

        for bracket in tx.list_brackets(stage_id).await? {
            let matches = tx.list_matches_by_bracket(bracket.id).await?;
            let completed_matches = matches.iter().filter(|m| m.status.is_terminal()).count();
            overview.push(BracketOverview {
                total_matches: matches.len(),
                completed_matches,
                bracket,
                matches,
            });
        }

        Ok(overview)
    }

    /// Matches of a stage ready to be played
    pub async fn playable_matches(&self, stage_id: StageId) -> BracketResult<Vec<Match>> {
        Ok(self
            .stage_overview(stage_id)
            .await?
            .into_iter()
            .flat_map(|b| b.matches)
            .filter(Match::is_playable)
            .collect())
    }

    /// Winner of the stage, once grand finals are decided
    pub async fn champion(&self, stage_id: StageId) -> BracketResult<Option<CompetitorId>> {
        let overview = self.stage_overview(stage_id).await?;
        let Some(grand_finals) = overview
            .into_iter()
            .find(|b| b.bracket.kind == BracketKind::GrandFinals)
        else {
            return Ok(None);
        };

        if let Some(reset) = grand_finals.matches.iter().find(|m| m.is_bracket_reset) {
            return Ok(reset.status.is_decided().then_some(reset.winner).flatten());
        }

        Ok(grand_finals
            .matches
            .iter()
            .filter(|m| m.status.is_decided())
            .find_map(|m| {
                let winner = m.winner?;
                let side = m.side_of(winner)?;
                (m.slot(side).feed() == Some(Feed::WinnerBracket)).then_some(winner)
            }))
    }

    /// Remove every bracket of a stage, returning how many were deleted
    pub async fn delete_stage(&self, stage_id: StageId) -> BracketResult<usize> {
        let mut tx = self.store.begin().await?;
        tx.lock_stage(stage_id).await?;

        let brackets = tx.list_brackets(stage_id).await?;
        for bracket in &brackets {
            tx.delete_matches_by_bracket(bracket.id).await?;
            tx.delete_bracket(bracket.id).await?;
        }
        tx.commit().await?;

        info!("Stage {}: deleted {} brackets", stage_id, brackets.len());
        Ok(brackets.len())
    }
}
