//! Shared helpers for the bracket integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bracket_engine::bracket::{
    Bracket, BracketId, BracketKind, BracketManager, BracketOverview, CompetitorId, EngineConfig,
    Feed, Match, MatchId, StageId,
};
use bracket_engine::bracket::models::{NewBracket, NewMatch};
use bracket_engine::db::{
    BracketStore, MemoryBracketStore, StoreError, StoreResult, StoreTransaction,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Manager over a fresh in-memory store
pub fn memory_manager() -> (BracketManager, MemoryBracketStore) {
    let store = MemoryBracketStore::new();
    let manager = BracketManager::new(Arc::new(store.clone()), fast_retries(3));
    (manager, store)
}

pub fn fast_retries(max_progress_attempts: u32) -> EngineConfig {
    EngineConfig {
        max_progress_attempts,
        retry_backoff_ms: 1,
    }
}

/// Seeds `1..=n`, seed number doubling as competitor id
pub fn seeds(n: usize) -> Vec<CompetitorId> {
    (1..=n as CompetitorId).collect()
}

pub async fn bracket_of(
    manager: &BracketManager,
    stage_id: StageId,
    kind: BracketKind,
) -> BracketOverview {
    manager
        .stage_overview(stage_id)
        .await
        .expect("stage overview")
        .into_iter()
        .find(|b| b.bracket.kind == kind)
        .expect("bracket of kind")
}

/// Match of a bracket by round name and position inside that round
pub fn find_match<'a>(overview: &'a BracketOverview, round_name: &str, position: u32) -> &'a Match {
    overview
        .matches
        .iter()
        .find(|m| m.round_name == round_name && m.position == position)
        .unwrap_or_else(|| panic!("no match {} #{}", round_name, position))
}

pub async fn load_match(store: &MemoryBracketStore, match_id: MatchId) -> Match {
    store.match_snapshot(match_id).await.expect("match exists")
}

/// The better seed (lower id) wins
pub fn top_seed(m: &Match) -> CompetitorId {
    let a = m.slot_a.competitor().expect("slot a filled");
    let b = m.slot_b.competitor().expect("slot b filled");
    a.min(b)
}

/// Top seed wins, except the loser-bracket finalist takes the first grand finals
pub fn loser_side_takes_grand_finals(m: &Match) -> CompetitorId {
    if m.round_name == "Grand Finals" {
        for slot in [m.slot_a, m.slot_b] {
            if slot.feed() == Some(Feed::LoserBracket) {
                return slot.competitor().expect("filled slot");
            }
        }
    }
    top_seed(m)
}

/// Report every playable match until nothing is left to play
///
/// Returns the number of matches reported.
pub async fn play_out<F>(manager: &BracketManager, stage_id: StageId, pick: F) -> usize
where
    F: Fn(&Match) -> CompetitorId,
{
    let mut reported = 0;
    loop {
        let playable = manager.playable_matches(stage_id).await.expect("playable");
        if playable.is_empty() {
            return reported;
        }
        for m in playable {
            let winner = pick(&m);
            let (score_a, score_b) = if m.slot_a.competitor() == Some(winner) {
                (2, 1)
            } else {
                (1, 2)
            };
            manager
                .report_result(m.id, score_a, score_b, winner)
                .await
                .expect("report result");
            reported += 1;
        }
    }
}

/// Store wrapper whose next commits can be made to fail with a version conflict
#[derive(Clone)]
pub struct FlakyStore {
    inner: MemoryBracketStore,
    failing_commits: Arc<AtomicU32>,
    commits_attempted: Arc<AtomicU32>,
}

impl FlakyStore {
    pub fn new(inner: MemoryBracketStore) -> Self {
        Self {
            inner,
            failing_commits: Arc::new(AtomicU32::new(0)),
            commits_attempted: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn fail_next_commits(&self, n: u32) {
        self.failing_commits.store(n, Ordering::SeqCst);
        self.commits_attempted.store(0, Ordering::SeqCst);
    }

    pub fn commits_attempted(&self) -> u32 {
        self.commits_attempted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BracketStore for FlakyStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        Ok(Box::new(FlakyTransaction {
            inner: self.inner.begin().await?,
            failing_commits: self.failing_commits.clone(),
            commits_attempted: self.commits_attempted.clone(),
        }))
    }
}

struct FlakyTransaction {
    inner: Box<dyn StoreTransaction>,
    failing_commits: Arc<AtomicU32>,
    commits_attempted: Arc<AtomicU32>,
}

#[async_trait]
impl StoreTransaction for FlakyTransaction {
    async fn lock_stage(&mut self, stage_id: StageId) -> StoreResult<()> {
        self.inner.lock_stage(stage_id).await
    }

    async fn list_brackets(&mut self, stage_id: StageId) -> StoreResult<Vec<Bracket>> {
        self.inner.list_brackets(stage_id).await
    }

    async fn get_bracket(&mut self, bracket_id: BracketId) -> StoreResult<Option<Bracket>> {
        self.inner.get_bracket(bracket_id).await
    }

    async fn lock_bracket(&mut self, bracket_id: BracketId) -> StoreResult<Option<Bracket>> {
        self.inner.lock_bracket(bracket_id).await
    }

    async fn create_bracket(&mut self, bracket: &NewBracket) -> StoreResult<Bracket> {
        self.inner.create_bracket(bracket).await
    }

    async fn update_bracket(&mut self, bracket: &Bracket) -> StoreResult<()> {
        self.inner.update_bracket(bracket).await
    }

    async fn delete_bracket(&mut self, bracket_id: BracketId) -> StoreResult<()> {
        self.inner.delete_bracket(bracket_id).await
    }

    async fn get_match(&mut self, match_id: MatchId) -> StoreResult<Option<Match>> {
        self.inner.get_match(match_id).await
    }

    async fn list_matches_by_bracket(&mut self, bracket_id: BracketId) -> StoreResult<Vec<Match>> {
        self.inner.list_matches_by_bracket(bracket_id).await
    }

    async fn create_match(&mut self, new_match: &NewMatch) -> StoreResult<Match> {
        self.inner.create_match(new_match).await
    }

    async fn update_match(&mut self, m: &mut Match) -> StoreResult<()> {
        self.inner.update_match(m).await
    }

    async fn delete_matches_by_bracket(&mut self, bracket_id: BracketId) -> StoreResult<u64> {
        self.inner.delete_matches_by_bracket(bracket_id).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.commits_attempted.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(StoreError::VersionConflict {
                match_id: 0,
                expected: 0,
            });
        }

        self.inner.commit().await
    }
}
