//! Double-elimination brackets for tournament stages.
//!
//! This module provides:
//! - Standard seeding (1 vs n, 2 vs n-1, ...)
//! - Generation of the winner, loser and grand finals brackets with every
//!   advancement link in place
//! - Progression of decided matches, including byes and the bracket reset
//! - Score reporting and stage overviews
//!
//! ## Example
//!
//! ```no_run
//! use bracket_engine::bracket::{BracketManager, EngineConfig};
//! use bracket_engine::db::Database;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(&Default::default()).await?;
//!     db.apply_schema().await?;
//!     let manager = BracketManager::new(Arc::new(db.store()), EngineConfig::from_env());
//!
//!     // Eight seeded competitors, stage 1
//!     let summary = manager.generate(1, &[10, 11, 12, 13, 14, 15, 16, 17], 8).await?;
//!     println!("Created {} matches", summary.match_count);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod errors;
pub mod generator;
pub mod manager;
pub mod models;
pub mod progression;
pub mod seeding;

pub use config::EngineConfig;
pub use errors::{BracketError, BracketResult, ErrorKind};
pub use generator::{BracketGenerator, BracketPlan, PlannedMatch};
pub use manager::BracketManager;
pub use models::{
    Bracket, BracketId, BracketKind, BracketOverview, CompetitorId, Entrant, Feed,
    GRAND_FINALS_RESET_NAME, GenerateSummary, Match, MatchId, MatchStatus, Occupant,
    ProgressionResult, SUPPORTED_BRACKET_SIZES, Slot, SlotSide, StageId,
};
pub use progression::{ProgressionEngine, assign_slot};
pub use seeding::{seed_competitors, seed_pairs};
