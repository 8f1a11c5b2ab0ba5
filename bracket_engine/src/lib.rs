//! # Bracket Engine
//!
//! Double-elimination tournament brackets: seeding, generation of the
//! winner/loser/grand finals structure, and progression of results through
//! it, persisted in PostgreSQL or kept in memory.
//!
//! ## Core Modules
//!
//! - [`bracket`]: Models, generator, progression engine and manager
//! - [`db`]: Store contract, PostgreSQL and in-memory stores
//!
//! ## Example
//!
//! ```
//! use bracket_engine::{BracketKind, BracketPlan};
//!
//! let plan = BracketPlan::build(8).unwrap();
//! assert_eq!(plan.matches.len(), 14);
//! assert_eq!(plan.matches_of(BracketKind::Loser).count(), 6);
//! ```

/// Brackets, matches and the engine that drives them.
pub mod bracket;
pub use bracket::{
    BracketError, BracketGenerator, BracketKind, BracketManager, BracketPlan, BracketResult,
    EngineConfig, Match, MatchStatus, ProgressionEngine, Slot,
};

/// Persistence for brackets and matches.
pub mod db;
