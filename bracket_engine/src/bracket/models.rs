//! Bracket and match data models for double-elimination tournaments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tournament stage ID type
pub type StageId = i64;

/// Bracket ID type
pub type BracketId = i64;

/// Match ID type
pub type MatchId = i64;

/// Competitor ID type
pub type CompetitorId = i64;

/// Bracket sizes the generator accepts
pub const SUPPORTED_BRACKET_SIZES: [u32; 4] = [4, 8, 16, 32];

/// Capacity of the grand finals bracket
pub const GRAND_FINALS_SIZE: u32 = 2;

/// Round name of the synthetic second grand finals match
pub const GRAND_FINALS_RESET_NAME: &str = "Grand Finals Reset";

/// Which part of the double-elimination structure a bracket represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BracketKind {
    /// Undefeated competitors
    Winner,
    /// Competitors with exactly one loss
    Loser,
    /// Winner-bracket champion against loser-bracket champion
    GrandFinals,
}

impl BracketKind {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            BracketKind::Winner => "winner",
            BracketKind::Loser => "loser",
            BracketKind::GrandFinals => "grandfinals",
        }
    }

    /// Parse the storage representation
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "winner" => Some(BracketKind::Winner),
            "loser" => Some(BracketKind::Loser),
            "grandfinals" => Some(BracketKind::GrandFinals),
            _ => None,
        }
    }

    /// Conventional presentation order (winner=1, loser=2, grandfinals=3)
    pub fn display_order(&self) -> i32 {
        match self {
            BracketKind::Winner => 1,
            BracketKind::Loser => 2,
            BracketKind::GrandFinals => 3,
        }
    }

    /// Human-facing bracket name
    pub fn display_name(&self) -> &'static str {
        match self {
            BracketKind::Winner => "Winner Bracket",
            BracketKind::Loser => "Loser Bracket",
            BracketKind::GrandFinals => "Grand Finals",
        }
    }
}

impl fmt::Display for BracketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Match lifecycle.
///
/// `Scheduled -> InProgress -> Completed`, with `Cancelled` and `Forfeit`
/// as absorbing side branches a caller may set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Forfeit,
}

impl MatchStatus {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::InProgress => "in_progress",
            MatchStatus::Completed => "completed",
            MatchStatus::Cancelled => "cancelled",
            MatchStatus::Forfeit => "forfeit",
        }
    }

    /// Parse the storage representation
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(MatchStatus::Scheduled),
            "in_progress" => Some(MatchStatus::InProgress),
            "completed" => Some(MatchStatus::Completed),
            "cancelled" => Some(MatchStatus::Cancelled),
            "forfeit" => Some(MatchStatus::Forfeit),
            _ => None,
        }
    }

    /// No further play happens in this match
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MatchStatus::Completed | MatchStatus::Cancelled | MatchStatus::Forfeit
        )
    }

    /// A result exists that progression may act on
    pub fn is_decided(&self) -> bool {
        matches!(self, MatchStatus::Completed | MatchStatus::Forfeit)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a competitor arrived in a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feed {
    /// Placed by the seeding at generation time
    Seeded,
    /// Sent by a winner-bracket match
    WinnerBracket,
    /// Sent by a loser-bracket match
    LoserBracket,
    /// Carried over from the first grand finals into the reset
    GrandFinals,
}

impl Feed {
    /// Provenance recorded for anyone leaving a match of the given bracket
    pub fn from_kind(kind: BracketKind) -> Self {
        match kind {
            BracketKind::Winner => Feed::WinnerBracket,
            BracketKind::Loser => Feed::LoserBracket,
            BracketKind::GrandFinals => Feed::GrandFinals,
        }
    }

    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Feed::Seeded => "seeded",
            Feed::WinnerBracket => "winner_bracket",
            Feed::LoserBracket => "loser_bracket",
            Feed::GrandFinals => "grand_finals",
        }
    }

    /// Parse the storage representation
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "seeded" => Some(Feed::Seeded),
            "winner_bracket" => Some(Feed::WinnerBracket),
            "loser_bracket" => Some(Feed::LoserBracket),
            "grand_finals" => Some(Feed::GrandFinals),
            _ => None,
        }
    }
}

/// A competitor sitting in a slot, with provenance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entrant {
    pub competitor: CompetitorId,
    pub feed: Feed,
}

impl Entrant {
    pub fn new(competitor: CompetitorId, feed: Feed) -> Self {
        Self { competitor, feed }
    }
}

/// One of the two competitor positions in a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Slot {
    /// Nobody has been assigned yet
    #[default]
    Empty,
    /// Declared bye; no competitor will ever take this position
    Bye,
    /// Occupied by a competitor
    Filled(Entrant),
}

impl Slot {
    /// Seeded competitor slot
    pub fn seeded(competitor: CompetitorId) -> Self {
        Slot::Filled(Entrant::new(competitor, Feed::Seeded))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }

    pub fn is_bye(&self) -> bool {
        matches!(self, Slot::Bye)
    }

    /// Competitor in this slot, if any
    pub fn competitor(&self) -> Option<CompetitorId> {
        match self {
            Slot::Filled(entrant) => Some(entrant.competitor),
            _ => None,
        }
    }

    /// Provenance of the occupant, if any
    pub fn feed(&self) -> Option<Feed> {
        match self {
            Slot::Filled(entrant) => Some(entrant.feed),
            _ => None,
        }
    }

    /// What leaves this slot when the match is decided
    pub fn occupant(&self) -> Option<Occupant> {
        match self {
            Slot::Empty => None,
            Slot::Bye => Some(Occupant::Bye),
            Slot::Filled(entrant) => Some(Occupant::Competitor(entrant.competitor)),
        }
    }
}

/// Something that moves along an advancement link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Occupant {
    Competitor(CompetitorId),
    Bye,
}

impl Occupant {
    /// Slot value for this occupant arriving through `feed`
    pub fn into_slot(self, feed: Feed) -> Slot {
        match self {
            Occupant::Competitor(competitor) => Slot::Filled(Entrant::new(competitor, feed)),
            Occupant::Bye => Slot::Bye,
        }
    }
}

/// Which slot of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotSide {
    A,
    B,
}

/// Persisted bracket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bracket {
    pub id: BracketId,
    pub stage_id: StageId,
    pub kind: BracketKind,
    pub name: String,
    /// Power-of-two capacity (2 for grand finals)
    pub size: u32,
    pub display_order: i32,
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
}

/// Bracket about to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBracket {
    pub stage_id: StageId,
    pub kind: BracketKind,
    pub name: String,
    pub size: u32,
    pub display_order: i32,
}

impl NewBracket {
    /// Bracket of the given kind using the conventional name and order
    pub fn conventional(stage_id: StageId, kind: BracketKind, size: u32) -> Self {
        let size = match kind {
            BracketKind::GrandFinals => GRAND_FINALS_SIZE,
            _ => size,
        };

        Self {
            stage_id,
            kind,
            name: kind.display_name().to_string(),
            size,
            display_order: kind.display_order(),
        }
    }
}

/// Persisted match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub bracket_id: BracketId,
    /// 1-based round inside the owning bracket
    pub round: u32,
    /// 0-based index inside the round
    pub position: u32,
    pub round_name: String,
    pub slot_a: Slot,
    pub slot_b: Slot,
    pub score_a: Option<i32>,
    pub score_b: Option<i32>,
    pub winner: Option<CompetitorId>,
    pub status: MatchStatus,
    pub advance_winner_to: Option<MatchId>,
    pub advance_loser_to: Option<MatchId>,
    pub is_bracket_reset: bool,
    /// Optimistic concurrency counter, bumped by every store update
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    /// Slot holding the given competitor
    pub fn side_of(&self, competitor: CompetitorId) -> Option<SlotSide> {
        if self.slot_a.competitor() == Some(competitor) {
            Some(SlotSide::A)
        } else if self.slot_b.competitor() == Some(competitor) {
            Some(SlotSide::B)
        } else {
            None
        }
    }

    pub fn slot(&self, side: SlotSide) -> &Slot {
        match side {
            SlotSide::A => &self.slot_a,
            SlotSide::B => &self.slot_b,
        }
    }

    /// Both slots hold real competitors and no result is in yet
    pub fn is_playable(&self) -> bool {
        matches!(self.slot_a, Slot::Filled(_))
            && matches!(self.slot_b, Slot::Filled(_))
            && matches!(self.status, MatchStatus::Scheduled | MatchStatus::InProgress)
    }

    /// Both slots are occupied and at least one of them is a bye
    pub fn is_bye_settleable(&self) -> bool {
        self.status == MatchStatus::Scheduled
            && !self.slot_a.is_empty()
            && !self.slot_b.is_empty()
            && (self.slot_a.is_bye() || self.slot_b.is_bye())
    }
}

/// Match about to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMatch {
    pub bracket_id: BracketId,
    pub round: u32,
    pub position: u32,
    pub round_name: String,
    pub slot_a: Slot,
    pub slot_b: Slot,
    pub status: MatchStatus,
    pub advance_winner_to: Option<MatchId>,
    pub advance_loser_to: Option<MatchId>,
    pub is_bracket_reset: bool,
}

/// Outcome of a full bracket generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateSummary {
    pub stage_id: StageId,
    pub winner_bracket_id: BracketId,
    pub loser_bracket_id: BracketId,
    pub grandfinals_bracket_id: BracketId,
    /// Matches created, including bye matches
    pub match_count: usize,
    /// Competitors actually seeded (at most the bracket size)
    pub seeded: usize,
    /// Matches resolved automatically because of byes
    pub byes_settled: usize,
}

/// Outcome of progressing one completed match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionResult {
    pub winner_advanced_to: Option<MatchId>,
    pub loser_advanced_to: Option<MatchId>,
    pub bracket_reset_created: bool,
    pub bracket_reset_match_id: Option<MatchId>,
    /// Downstream matches resolved automatically because of byes
    pub byes_settled: usize,
    /// Set once the tournament stage has a final winner
    pub champion: Option<CompetitorId>,
}

/// A bracket with its matches, ordered by round then position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketOverview {
    pub bracket: Bracket,
    pub matches: Vec<Match>,
    pub completed_matches: usize,
    pub total_matches: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_match(slot_a: Slot, slot_b: Slot, status: MatchStatus) -> Match {
        let now = Utc::now();
        Match {
            id: 1,
            bracket_id: 1,
            round: 1,
            position: 0,
            round_name: "Round of 8".to_string(),
            slot_a,
            slot_b,
            score_a: None,
            score_b: None,
            winner: None,
            status,
            advance_winner_to: None,
            advance_loser_to: None,
            is_bracket_reset: false,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_kind_round_trips_through_storage_names() {
        for kind in [BracketKind::Winner, BracketKind::Loser, BracketKind::GrandFinals] {
            assert_eq!(BracketKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(BracketKind::parse("swiss"), None);
    }

    #[test]
    fn test_conventional_display_order() {
        assert_eq!(BracketKind::Winner.display_order(), 1);
        assert_eq!(BracketKind::Loser.display_order(), 2);
        assert_eq!(BracketKind::GrandFinals.display_order(), 3);
    }

    #[test]
    fn test_grand_finals_bracket_is_always_size_two() {
        let bracket = NewBracket::conventional(7, BracketKind::GrandFinals, 32);
        assert_eq!(bracket.size, 2);
        assert_eq!(bracket.name, "Grand Finals");

        let winner = NewBracket::conventional(7, BracketKind::Winner, 32);
        assert_eq!(winner.size, 32);
    }

    #[test]
    fn test_status_classification() {
        assert!(!MatchStatus::Scheduled.is_terminal());
        assert!(!MatchStatus::InProgress.is_terminal());
        assert!(MatchStatus::Completed.is_terminal());
        assert!(MatchStatus::Cancelled.is_terminal());
        assert!(MatchStatus::Forfeit.is_terminal());

        assert!(MatchStatus::Completed.is_decided());
        assert!(MatchStatus::Forfeit.is_decided());
        assert!(!MatchStatus::Cancelled.is_decided());
    }

    #[test]
    fn test_empty_slot_is_not_a_competitor() {
        assert_eq!(Slot::Empty.competitor(), None);
        assert_eq!(Slot::Bye.competitor(), None);
        assert_eq!(Slot::seeded(0).competitor(), Some(0));
        assert_ne!(Slot::Empty, Slot::seeded(0));
    }

    #[test]
    fn test_side_of() {
        let m = sample_match(Slot::seeded(3), Slot::seeded(9), MatchStatus::Scheduled);
        assert_eq!(m.side_of(3), Some(SlotSide::A));
        assert_eq!(m.side_of(9), Some(SlotSide::B));
        assert_eq!(m.side_of(4), None);
    }

    #[test]
    fn test_bye_settleable() {
        let m = sample_match(Slot::seeded(1), Slot::Bye, MatchStatus::Scheduled);
        assert!(m.is_bye_settleable());

        let m = sample_match(Slot::Empty, Slot::Bye, MatchStatus::Scheduled);
        assert!(!m.is_bye_settleable());

        let m = sample_match(Slot::seeded(1), Slot::seeded(2), MatchStatus::Scheduled);
        assert!(!m.is_bye_settleable());
        assert!(m.is_playable());
    }

    #[test]
    fn test_slot_serializes_with_state_tag() {
        let json = serde_json::to_value(Slot::Filled(Entrant::new(5, Feed::LoserBracket)))
            .expect("serialize slot");
        assert_eq!(json["state"], "filled");
        assert_eq!(json["competitor"], 5);
        assert_eq!(json["feed"], "loser_bracket");
    }
}
