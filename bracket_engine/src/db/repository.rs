//! Store contract for brackets and matches, plus the PostgreSQL implementation.
//!
//! The engine never talks to a connection directly: it opens a
//! [`StoreTransaction`] through [`BracketStore::begin`], performs every read
//! and write of one operation on it, and commits. Dropping a transaction
//! without committing rolls it back, so an error propagated with `?` leaves
//! nothing behind.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use log::debug;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;

use super::errors::{StoreError, StoreResult};
use super::timeouts::{with_default_timeout, with_long_timeout, with_transaction_timeout};
use crate::bracket::models::{
    Bracket, BracketId, BracketKind, Entrant, Feed, Match, MatchId, MatchStatus, NewBracket,
    NewMatch, Slot, StageId,
};

/// Shared handle to a store
pub type SharedStore = Arc<dyn BracketStore>;

/// Entry point of a bracket store
#[async_trait]
pub trait BracketStore: Send + Sync {
    /// Open a transaction; all engine operations run inside one
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;
}

/// Unit of work over brackets and matches
#[async_trait]
pub trait StoreTransaction: Send {
    /// Exclusive lock on a tournament stage, held until commit or rollback
    async fn lock_stage(&mut self, stage_id: StageId) -> StoreResult<()>;

    /// Brackets of a stage ordered by display order
    async fn list_brackets(&mut self, stage_id: StageId) -> StoreResult<Vec<Bracket>>;

    async fn get_bracket(&mut self, bracket_id: BracketId) -> StoreResult<Option<Bracket>>;

    /// Exclusive lock on a bracket, held until commit or rollback
    ///
    /// Returns the bracket as last committed. Reads of its matches made
    /// after this call see every write committed by earlier holders of the
    /// lock, so a completion flag computed under it is never stale.
    async fn lock_bracket(&mut self, bracket_id: BracketId) -> StoreResult<Option<Bracket>>;

    async fn create_bracket(&mut self, bracket: &NewBracket) -> StoreResult<Bracket>;

    /// Persist the mutable bracket fields (name, completion flag)
    async fn update_bracket(&mut self, bracket: &Bracket) -> StoreResult<()>;

    /// Delete a bracket; its matches go with it
    async fn delete_bracket(&mut self, bracket_id: BracketId) -> StoreResult<()>;

    async fn get_match(&mut self, match_id: MatchId) -> StoreResult<Option<Match>>;

    /// Matches of a bracket ordered by round then position
    async fn list_matches_by_bracket(&mut self, bracket_id: BracketId) -> StoreResult<Vec<Match>>;

    /// Insert a match
    ///
    /// # Errors
    ///
    /// * `StoreError::DuplicateRow` - a concurrent writer already inserted
    ///   the bracket reset this match would duplicate
    async fn create_match(&mut self, new_match: &NewMatch) -> StoreResult<Match>;

    /// Write every mutable field of `m`
    ///
    /// The write only succeeds if the stored version still equals
    /// `m.version`; on success `m.version` is bumped to the new value.
    ///
    /// # Errors
    ///
    /// * `StoreError::VersionConflict` - the row changed since it was read
    async fn update_match(&mut self, m: &mut Match) -> StoreResult<()>;

    /// Delete all matches of a bracket, returning how many were removed
    async fn delete_matches_by_bracket(&mut self, bracket_id: BracketId) -> StoreResult<u64>;

    /// Make every write of this transaction visible
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

macro_rules! match_columns {
    () => {
        "id, bracket_id, round, position, round_name, \
         slot_a_state, slot_a_competitor, slot_a_feed, \
         slot_b_state, slot_b_competitor, slot_b_feed, \
         score_a, score_b, winner, status, advance_winner_to, advance_loser_to, \
         is_bracket_reset, version, created_at, updated_at"
    };
}

macro_rules! bracket_columns {
    () => {
        "id, stage_id, kind, name, size, display_order, is_complete, created_at"
    };
}

/// Unique index allowing a single reset match per grand finals bracket
const RESET_UNIQUE_INDEX: &str = "ux_matches_bracket_reset";

/// PostgreSQL implementation of `BracketStore`
#[derive(Clone)]
pub struct PgBracketStore {
    pool: Arc<PgPool>,
}

impl PgBracketStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BracketStore for PgBracketStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let tx = with_transaction_timeout(self.pool.begin()).await?;
        Ok(Box::new(PgStoreTransaction { tx }))
    }
}

/// Open PostgreSQL transaction
pub struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn lock_stage(&mut self, stage_id: StageId) -> StoreResult<()> {
        with_long_timeout(
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(stage_id)
                .execute(&mut *self.tx),
        )
        .await?;
        debug!("Acquired lock on stage {}", stage_id);
        Ok(())
    }

    async fn list_brackets(&mut self, stage_id: StageId) -> StoreResult<Vec<Bracket>> {
        let rows = with_default_timeout(
            sqlx::query(concat!(
                "SELECT ",
                bracket_columns!(),
                " FROM brackets WHERE stage_id = $1 ORDER BY display_order"
            ))
            .bind(stage_id)
            .fetch_all(&mut *self.tx),
        )
        .await?;

        rows.iter().map(bracket_from_row).collect()
    }

    async fn get_bracket(&mut self, bracket_id: BracketId) -> StoreResult<Option<Bracket>> {
        let row = with_default_timeout(
            sqlx::query(concat!(
                "SELECT ",
                bracket_columns!(),
                " FROM brackets WHERE id = $1"
            ))
            .bind(bracket_id)
            .fetch_optional(&mut *self.tx),
        )
        .await?;

        row.as_ref().map(bracket_from_row).transpose()
    }

    async fn lock_bracket(&mut self, bracket_id: BracketId) -> StoreResult<Option<Bracket>> {
        let row = with_long_timeout(
            sqlx::query(concat!(
                "SELECT ",
                bracket_columns!(),
                " FROM brackets WHERE id = $1 FOR UPDATE"
            ))
            .bind(bracket_id)
            .fetch_optional(&mut *self.tx),
        )
        .await?;

        row.as_ref().map(bracket_from_row).transpose()
    }

    async fn create_bracket(&mut self, bracket: &NewBracket) -> StoreResult<Bracket> {
        let row = with_default_timeout(
            sqlx::query(concat!(
                "INSERT INTO brackets (stage_id, kind, name, size, display_order) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING ",
                bracket_columns!()
            ))
            .bind(bracket.stage_id)
            .bind(bracket.kind.as_str())
            .bind(&bracket.name)
            .bind(to_i32("size", bracket.size)?)
            .bind(bracket.display_order)
            .fetch_one(&mut *self.tx),
        )
        .await?;

        bracket_from_row(&row)
    }

    async fn update_bracket(&mut self, bracket: &Bracket) -> StoreResult<()> {
        with_default_timeout(
            sqlx::query("UPDATE brackets SET name = $1, is_complete = $2 WHERE id = $3")
                .bind(&bracket.name)
                .bind(bracket.is_complete)
                .bind(bracket.id)
                .execute(&mut *self.tx),
        )
        .await?;
        Ok(())
    }

    async fn delete_bracket(&mut self, bracket_id: BracketId) -> StoreResult<()> {
        with_long_timeout(
            sqlx::query("DELETE FROM brackets WHERE id = $1")
                .bind(bracket_id)
                .execute(&mut *self.tx),
        )
        .await?;
        Ok(())
    }

    async fn get_match(&mut self, match_id: MatchId) -> StoreResult<Option<Match>> {
        let row = with_default_timeout(
            sqlx::query(concat!(
                "SELECT ",
                match_columns!(),
                " FROM matches WHERE id = $1"
            ))
            .bind(match_id)
            .fetch_optional(&mut *self.tx),
        )
        .await?;

        row.as_ref().map(match_from_row).transpose()
    }

    async fn list_matches_by_bracket(&mut self, bracket_id: BracketId) -> StoreResult<Vec<Match>> {
        let rows = with_default_timeout(
            sqlx::query(concat!(
                "SELECT ",
                match_columns!(),
                " FROM matches WHERE bracket_id = $1 ORDER BY round, position, id"
            ))
            .bind(bracket_id)
            .fetch_all(&mut *self.tx),
        )
        .await?;

        rows.iter().map(match_from_row).collect()
    }

    async fn create_match(&mut self, new_match: &NewMatch) -> StoreResult<Match> {
        let (a_state, a_competitor, a_feed) = slot_columns(&new_match.slot_a);
        let (b_state, b_competitor, b_feed) = slot_columns(&new_match.slot_b);

        let row = with_default_timeout(
            sqlx::query(concat!(
                "INSERT INTO matches (bracket_id, round, position, round_name, \
                 slot_a_state, slot_a_competitor, slot_a_feed, \
                 slot_b_state, slot_b_competitor, slot_b_feed, \
                 status, advance_winner_to, advance_loser_to, is_bracket_reset) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
                 RETURNING ",
                match_columns!()
            ))
            .bind(new_match.bracket_id)
            .bind(to_i32("round", new_match.round)?)
            .bind(to_i32("position", new_match.position)?)
            .bind(&new_match.round_name)
            .bind(a_state)
            .bind(a_competitor)
            .bind(a_feed)
            .bind(b_state)
            .bind(b_competitor)
            .bind(b_feed)
            .bind(new_match.status.as_str())
            .bind(new_match.advance_winner_to)
            .bind(new_match.advance_loser_to)
            .bind(new_match.is_bracket_reset)
            .fetch_one(&mut *self.tx),
        )
        .await
        .map_err(|e| lost_insert_race(e.into()))?;

        match_from_row(&row)
    }

    async fn update_match(&mut self, m: &mut Match) -> StoreResult<()> {
        let (a_state, a_competitor, a_feed) = slot_columns(&m.slot_a);
        let (b_state, b_competitor, b_feed) = slot_columns(&m.slot_b);

        let row = with_default_timeout(
            sqlx::query(
                r#"
                UPDATE matches
                SET slot_a_state = $1, slot_a_competitor = $2, slot_a_feed = $3,
                    slot_b_state = $4, slot_b_competitor = $5, slot_b_feed = $6,
                    score_a = $7, score_b = $8, winner = $9, status = $10,
                    round_name = $11, advance_winner_to = $12, advance_loser_to = $13,
                    version = version + 1, updated_at = NOW()
                WHERE id = $14 AND version = $15
                RETURNING version, updated_at
                "#,
            )
            .bind(a_state)
            .bind(a_competitor)
            .bind(a_feed)
            .bind(b_state)
            .bind(b_competitor)
            .bind(b_feed)
            .bind(m.score_a)
            .bind(m.score_b)
            .bind(m.winner)
            .bind(m.status.as_str())
            .bind(&m.round_name)
            .bind(m.advance_winner_to)
            .bind(m.advance_loser_to)
            .bind(m.id)
            .bind(m.version)
            .fetch_optional(&mut *self.tx),
        )
        .await?;

        // No row means the match is gone or another writer bumped the version
        let row = row.ok_or(StoreError::VersionConflict {
            match_id: m.id,
            expected: m.version,
        })?;

        m.version = row.try_get("version")?;
        m.updated_at = row.try_get::<NaiveDateTime, _>("updated_at")?.and_utc();
        Ok(())
    }

    async fn delete_matches_by_bracket(&mut self, bracket_id: BracketId) -> StoreResult<u64> {
        let result = with_long_timeout(
            sqlx::query("DELETE FROM matches WHERE bracket_id = $1")
                .bind(bracket_id)
                .execute(&mut *self.tx),
        )
        .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        with_transaction_timeout(self.tx.commit()).await?;
        Ok(())
    }
}

/// Map a unique violation that only a concurrent insert can cause onto a
/// retryable error
fn lost_insert_race(err: StoreError) -> StoreError {
    if let StoreError::Database(sqlx::Error::Database(db_err)) = &err {
        if db_err.constraint() == Some(RESET_UNIQUE_INDEX) {
            return StoreError::DuplicateRow {
                constraint: RESET_UNIQUE_INDEX.to_string(),
            };
        }
    }
    err
}

fn to_i32(column: &str, value: u32) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| StoreError::Decode(format!("{column} {value} out of range")))
}

fn to_u32(column: &str, value: i32) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Decode(format!("{column} {value} is negative")))
}

/// Column values for a slot: (state, competitor, feed)
fn slot_columns(slot: &Slot) -> (&'static str, Option<i64>, Option<&'static str>) {
    match slot {
        Slot::Empty => ("empty", None, None),
        Slot::Bye => ("bye", None, None),
        Slot::Filled(entrant) => ("filled", Some(entrant.competitor), Some(entrant.feed.as_str())),
    }
}

fn slot_from_row(row: &PgRow, prefix: &str) -> StoreResult<Slot> {
    let state: String = row.try_get(format!("{prefix}_state").as_str())?;

    match state.as_str() {
        "empty" => Ok(Slot::Empty),
        "bye" => Ok(Slot::Bye),
        "filled" => {
            let competitor: Option<i64> = row.try_get(format!("{prefix}_competitor").as_str())?;
            let feed: Option<String> = row.try_get(format!("{prefix}_feed").as_str())?;

            let competitor = competitor
                .ok_or_else(|| StoreError::Decode(format!("{prefix} is filled without competitor")))?;
            let feed = feed
                .as_deref()
                .and_then(Feed::parse)
                .ok_or_else(|| StoreError::Decode(format!("{prefix} has no valid feed")))?;

            Ok(Slot::Filled(Entrant::new(competitor, feed)))
        }
        other => Err(StoreError::Decode(format!("unknown slot state '{other}'"))),
    }
}

fn bracket_from_row(row: &PgRow) -> StoreResult<Bracket> {
    let kind: String = row.try_get("kind")?;

    Ok(Bracket {
        id: row.try_get("id")?,
        stage_id: row.try_get("stage_id")?,
        kind: BracketKind::parse(&kind)
            .ok_or_else(|| StoreError::Decode(format!("unknown bracket kind '{kind}'")))?,
        name: row.try_get("name")?,
        size: to_u32("size", row.try_get("size")?)?,
        display_order: row.try_get("display_order")?,
        is_complete: row.try_get("is_complete")?,
        created_at: row.try_get::<NaiveDateTime, _>("created_at")?.and_utc(),
    })
}

fn match_from_row(row: &PgRow) -> StoreResult<Match> {
    let status: String = row.try_get("status")?;

    Ok(Match {
        id: row.try_get("id")?,
        bracket_id: row.try_get("bracket_id")?,
        round: to_u32("round", row.try_get("round")?)?,
        position: to_u32("position", row.try_get("position")?)?,
        round_name: row.try_get("round_name")?,
        slot_a: slot_from_row(row, "slot_a")?,
        slot_b: slot_from_row(row, "slot_b")?,
        score_a: row.try_get("score_a")?,
        score_b: row.try_get("score_b")?,
        winner: row.try_get("winner")?,
        status: MatchStatus::parse(&status)
            .ok_or_else(|| StoreError::Decode(format!("unknown match status '{status}'")))?,
        advance_winner_to: row.try_get("advance_winner_to")?,
        advance_loser_to: row.try_get("advance_loser_to")?,
        is_bracket_reset: row.try_get("is_bracket_reset")?,
        version: row.try_get("version")?,
        created_at: row.try_get::<NaiveDateTime, _>("created_at")?.and_utc(),
        updated_at: row.try_get::<NaiveDateTime, _>("updated_at")?.and_utc(),
    })
}
