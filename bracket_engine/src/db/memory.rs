//! In-process bracket store.
//!
//! Each transaction works on a private snapshot of the committed state and
//! publishes its changes at commit. Matches updated by the transaction are
//! validated against the committed versions first, so two transactions that
//! both wrote the same match cannot both commit. Stage and bracket locks are
//! async mutexes whose guards live as long as the transaction.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::errors::{StoreError, StoreResult};
use super::repository::{BracketStore, StoreTransaction};
use crate::bracket::models::{
    Bracket, BracketId, Match, MatchId, MatchStatus, NewBracket, NewMatch, StageId,
};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    brackets: BTreeMap<BracketId, Bracket>,
    matches: BTreeMap<MatchId, Match>,
}

/// Bracket store kept in memory
#[derive(Clone)]
pub struct MemoryBracketStore {
    state: Arc<Mutex<MemoryState>>,
    next_id: Arc<AtomicI64>,
    stage_locks: LockTable,
    bracket_locks: LockTable,
}

type LockTable = Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>;

async fn lock_entry(table: &LockTable, key: i64) -> Arc<Mutex<()>> {
    table.lock().await.entry(key).or_default().clone()
}

impl Default for MemoryBracketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBracketStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            next_id: Arc::new(AtomicI64::new(1)),
            stage_locks: Arc::new(Mutex::new(HashMap::new())),
            bracket_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Committed copy of a match, outside any transaction
    pub async fn match_snapshot(&self, match_id: MatchId) -> Option<Match> {
        self.state.lock().await.matches.get(&match_id).cloned()
    }

    /// Number of committed matches
    pub async fn match_count(&self) -> usize {
        self.state.lock().await.matches.len()
    }

    /// Number of committed brackets
    pub async fn bracket_count(&self) -> usize {
        self.state.lock().await.brackets.len()
    }
}

#[async_trait]
impl BracketStore for MemoryBracketStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let working = self.state.lock().await.clone();

        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            working,
            base_versions: HashMap::new(),
            dirty_brackets: BTreeSet::new(),
            dirty_matches: BTreeSet::new(),
            deleted_brackets: BTreeSet::new(),
            deleted_matches: BTreeSet::new(),
            guards: Vec::new(),
            locked_brackets: BTreeSet::new(),
        }))
    }
}

/// Open in-memory transaction
pub struct MemoryTransaction {
    store: MemoryBracketStore,
    working: MemoryState,
    /// Committed version of each pre-existing match this transaction updated
    base_versions: HashMap<MatchId, i64>,
    dirty_brackets: BTreeSet<BracketId>,
    dirty_matches: BTreeSet<MatchId>,
    deleted_brackets: BTreeSet<BracketId>,
    deleted_matches: BTreeSet<MatchId>,
    /// Stage and bracket locks, released when the transaction ends
    guards: Vec<OwnedMutexGuard<()>>,
    locked_brackets: BTreeSet<BracketId>,
}

impl MemoryTransaction {
    fn allocate_id(&self) -> i64 {
        self.store.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn remove_match(&mut self, match_id: MatchId) {
        self.working.matches.remove(&match_id);
        self.dirty_matches.remove(&match_id);
        self.deleted_matches.insert(match_id);

        // Mirrors ON DELETE SET NULL on the advancement links
        for m in self.working.matches.values_mut() {
            let mut touched = false;
            if m.advance_winner_to == Some(match_id) {
                m.advance_winner_to = None;
                touched = true;
            }
            if m.advance_loser_to == Some(match_id) {
                m.advance_loser_to = None;
                touched = true;
            }
            if touched {
                self.dirty_matches.insert(m.id);
            }
        }
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_stage(&mut self, stage_id: StageId) -> StoreResult<()> {
        let lock = lock_entry(&self.store.stage_locks, stage_id).await;
        self.guards.push(lock.lock_owned().await);

        // Anything committed while waiting for the lock must be visible
        let committed = self.store.state.lock().await.clone();
        for (id, bracket) in committed.brackets {
            if !self.deleted_brackets.contains(&id) && !self.dirty_brackets.contains(&id) {
                self.working.brackets.insert(id, bracket);
            }
        }
        for (id, m) in committed.matches {
            if !self.deleted_matches.contains(&id) && !self.dirty_matches.contains(&id) {
                self.working.matches.insert(id, m);
            }
        }
        Ok(())
    }

    async fn list_brackets(&mut self, stage_id: StageId) -> StoreResult<Vec<Bracket>> {
        let mut brackets: Vec<Bracket> = self
            .working
            .brackets
            .values()
            .filter(|b| b.stage_id == stage_id)
            .cloned()
            .collect();
        brackets.sort_by_key(|b| b.display_order);
        Ok(brackets)
    }

    async fn get_bracket(&mut self, bracket_id: BracketId) -> StoreResult<Option<Bracket>> {
        Ok(self.working.brackets.get(&bracket_id).cloned())
    }

    async fn lock_bracket(&mut self, bracket_id: BracketId) -> StoreResult<Option<Bracket>> {
        if self.locked_brackets.insert(bracket_id) {
            let lock = lock_entry(&self.store.bracket_locks, bracket_id).await;
            self.guards.push(lock.lock_owned().await);
        }

        // Pick up what earlier holders of the lock committed
        let committed = self.store.state.lock().await.clone();
        if !self.dirty_brackets.contains(&bracket_id) && !self.deleted_brackets.contains(&bracket_id) {
            match committed.brackets.get(&bracket_id) {
                Some(bracket) => {
                    self.working.brackets.insert(bracket_id, bracket.clone());
                }
                None => {
                    self.working.brackets.remove(&bracket_id);
                }
            }
        }
        for (id, m) in committed.matches {
            if m.bracket_id == bracket_id
                && !self.dirty_matches.contains(&id)
                && !self.deleted_matches.contains(&id)
            {
                self.working.matches.insert(id, m);
            }
        }

        Ok(self.working.brackets.get(&bracket_id).cloned())
    }

    async fn create_bracket(&mut self, bracket: &NewBracket) -> StoreResult<Bracket> {
        let created = Bracket {
            id: self.allocate_id(),
            stage_id: bracket.stage_id,
            kind: bracket.kind,
            name: bracket.name.clone(),
            size: bracket.size,
            display_order: bracket.display_order,
            is_complete: false,
            created_at: Utc::now(),
        };

        self.working.brackets.insert(created.id, created.clone());
        self.dirty_brackets.insert(created.id);
        Ok(created)
    }

    async fn update_bracket(&mut self, bracket: &Bracket) -> StoreResult<()> {
        if let Some(stored) = self.working.brackets.get_mut(&bracket.id) {
            stored.name = bracket.name.clone();
            stored.is_complete = bracket.is_complete;
            self.dirty_brackets.insert(bracket.id);
        }
        Ok(())
    }

    async fn delete_bracket(&mut self, bracket_id: BracketId) -> StoreResult<()> {
        let owned: Vec<MatchId> = self
            .working
            .matches
            .values()
            .filter(|m| m.bracket_id == bracket_id)
            .map(|m| m.id)
            .collect();
        for match_id in owned {
            self.remove_match(match_id);
        }

        self.working.brackets.remove(&bracket_id);
        self.dirty_brackets.remove(&bracket_id);
        self.deleted_brackets.insert(bracket_id);
        Ok(())
    }

    async fn get_match(&mut self, match_id: MatchId) -> StoreResult<Option<Match>> {
        Ok(self.working.matches.get(&match_id).cloned())
    }

    async fn list_matches_by_bracket(&mut self, bracket_id: BracketId) -> StoreResult<Vec<Match>> {
        let mut matches: Vec<Match> = self
            .working
            .matches
            .values()
            .filter(|m| m.bracket_id == bracket_id)
            .cloned()
            .collect();
        matches.sort_by_key(|m| (m.round, m.position, m.id));
        Ok(matches)
    }

    async fn create_match(&mut self, new_match: &NewMatch) -> StoreResult<Match> {
        let now = Utc::now();
        let created = Match {
            id: self.allocate_id(),
            bracket_id: new_match.bracket_id,
            round: new_match.round,
            position: new_match.position,
            round_name: new_match.round_name.clone(),
            slot_a: new_match.slot_a,
            slot_b: new_match.slot_b,
            score_a: None,
            score_b: None,
            winner: None,
            status: new_match.status,
            advance_winner_to: new_match.advance_winner_to,
            advance_loser_to: new_match.advance_loser_to,
            is_bracket_reset: new_match.is_bracket_reset,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        self.working.matches.insert(created.id, created.clone());
        self.dirty_matches.insert(created.id);
        Ok(created)
    }

    async fn update_match(&mut self, m: &mut Match) -> StoreResult<()> {
        let conflict = StoreError::VersionConflict {
            match_id: m.id,
            expected: m.version,
        };

        let Some(stored) = self.working.matches.get_mut(&m.id) else {
            return Err(conflict);
        };
        if stored.version != m.version {
            return Err(conflict);
        }

        self.base_versions.entry(m.id).or_insert(stored.version);

        m.version += 1;
        m.updated_at = Utc::now();
        *stored = m.clone();
        self.dirty_matches.insert(m.id);
        Ok(())
    }

    async fn delete_matches_by_bracket(&mut self, bracket_id: BracketId) -> StoreResult<u64> {
        let owned: Vec<MatchId> = self
            .working
            .matches
            .values()
            .filter(|m| m.bracket_id == bracket_id)
            .map(|m| m.id)
            .collect();
        let removed = owned.len() as u64;
        for match_id in owned {
            self.remove_match(match_id);
        }
        Ok(removed)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut committed = self.store.state.lock().await;

        for (&match_id, &expected) in &self.base_versions {
            if self.deleted_matches.contains(&match_id) {
                continue;
            }
            let current = committed.matches.get(&match_id).map(|m| m.version);
            if current != Some(expected) {
                return Err(StoreError::VersionConflict { match_id, expected });
            }
        }

        // Same rule as the unique reset index of the SQL schema
        for match_id in &self.dirty_matches {
            let Some(m) = self.working.matches.get(match_id) else {
                continue;
            };
            if !m.is_bracket_reset || committed.matches.contains_key(match_id) {
                continue;
            }
            let duplicate = committed.matches.values().any(|other| {
                other.is_bracket_reset
                    && other.bracket_id == m.bracket_id
                    && !self.deleted_matches.contains(&other.id)
            });
            if duplicate {
                return Err(StoreError::DuplicateRow {
                    constraint: "ux_matches_bracket_reset".to_string(),
                });
            }
        }

        for match_id in &self.deleted_matches {
            committed.matches.remove(match_id);
        }
        for bracket_id in &self.deleted_brackets {
            committed.brackets.remove(bracket_id);
        }
        for bracket_id in &self.dirty_brackets {
            if let Some(bracket) = self.working.brackets.get(bracket_id) {
                committed.brackets.insert(*bracket_id, bracket.clone());
            }
        }
        for match_id in &self.dirty_matches {
            if let Some(m) = self.working.matches.get(match_id) {
                committed.matches.insert(*match_id, m.clone());
            }
        }

        Ok(())
    }
}
