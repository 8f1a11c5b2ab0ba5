//! Standard tournament seeding.
//!
//! Seed 1 meets seed n, seed 2 meets seed n-1, and so on, which keeps the
//! top seeds apart for as long as possible.

use super::errors::{BracketError, BracketResult};
use super::models::{CompetitorId, Slot};

/// First-round pairings for a field of `n` positions
///
/// Returns `(low, high)` index pairs where index `i` in the first half is
/// paired with `n - 1 - i`.
///
/// # Errors
///
/// * `BracketError::InvalidFieldSize` - `n` is below 2 or not a power of two
pub fn seed_pairs(n: usize) -> BracketResult<Vec<(usize, usize)>> {
    if n < 2 || !n.is_power_of_two() {
        return Err(BracketError::InvalidFieldSize(n));
    }

    Ok((0..n / 2).map(|i| (i, n - 1 - i)).collect())
}

/// Round-one slots for a seed-ordered roster
///
/// Positions beyond the roster become byes. The roster must not be longer
/// than `n`; callers truncate to the top `n` seeds first.
pub fn seed_competitors(competitors: &[CompetitorId], n: usize) -> BracketResult<Vec<(Slot, Slot)>> {
    if competitors.len() > n {
        return Err(BracketError::InvalidFieldSize(competitors.len()));
    }

    let slot_at = |index: usize| {
        competitors
            .get(index)
            .map_or(Slot::Bye, |&competitor| Slot::seeded(competitor))
    };

    Ok(seed_pairs(n)?
        .into_iter()
        .map(|(low, high)| (slot_at(low), slot_at(high)))
        .collect())
}
