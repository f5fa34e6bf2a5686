//! Snapshot change detection.
//!
//! Gates how often the downstream diff/execute cycle runs: an unchanged
//! snapshot suppresses listener notifications entirely.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::models::AccountSnapshot;

/// Relative size delta that counts as a change (1%).
const SIZE_DELTA_PCT: Decimal = dec!(0.01);

/// Absolute size-delta floor, guards against false positives on tiny holdings.
const SIZE_DELTA_FLOOR: Decimal = Decimal::ONE;

/// Relative total-value delta that counts as a change (1%).
const VALUE_DELTA_PCT: Decimal = dec!(0.01);

/// Minimum divisor when comparing total value, avoids division by zero.
const VALUE_MIN_DIVISOR: Decimal = dec!(0.01);

/// Compare a fresh snapshot against the previously accepted one.
///
/// Reports a change when:
/// - the position count differs,
/// - a current position id is absent from the prior snapshot,
/// - a matched position's size moved by more than `max(1, 1% of prior)`,
/// - the total value moved by more than 1% relative to the prior value.
pub fn snapshot_changed(prior: &AccountSnapshot, current: &AccountSnapshot) -> bool {
    if current.position_count() != prior.position_count() {
        return true;
    }

    for position in &current.positions {
        let Some(previous) = prior.position(&position.id) else {
            // Same count but a new id: a position was replaced.
            return true;
        };

        let threshold = SIZE_DELTA_FLOOR.max(previous.size * SIZE_DELTA_PCT);
        if (position.size - previous.size).abs() > threshold {
            return true;
        }
    }

    let divisor = prior.total_value.max(VALUE_MIN_DIVISOR);
    let value_delta = (current.total_value - prior.total_value).abs() / divisor;
    value_delta > VALUE_DELTA_PCT
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use crate::models::Position;

    fn position(id: &str, size: Decimal) -> Position {
        Position {
            id: id.to_string(),
            market_id: "0xabc".to_string(),
            market_title: String::new(),
            outcome: "Yes".to_string(),
            size,
            price: dec!(0.5),
        }
    }

    fn snapshot(positions: Vec<Position>, total_value: Decimal) -> AccountSnapshot {
        AccountSnapshot {
            address: "0x123".to_string(),
            positions,
            total_value,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_count_difference_is_always_a_change() {
        let prior = snapshot(vec![position("a", dec!(10))], dec!(5));
        let current = snapshot(
            vec![position("a", dec!(10)), position("b", dec!(1))],
            dec!(5),
        );

        assert!(snapshot_changed(&prior, &current));
        assert!(snapshot_changed(&current, &prior));
    }

    #[test]
    fn test_new_id_with_same_count_is_a_change() {
        let prior = snapshot(vec![position("a", dec!(10))], dec!(5));
        let current = snapshot(vec![position("b", dec!(10))], dec!(5));

        assert!(snapshot_changed(&prior, &current));
    }

    #[test]
    fn test_identical_snapshots_are_unchanged() {
        let prior = snapshot(vec![position("a", dec!(10))], dec!(5));
        let current = snapshot(vec![position("a", dec!(10))], dec!(5));

        assert!(!snapshot_changed(&prior, &current));
    }

    #[test]
    fn test_size_delta_floor_boundary() {
        // Prior size 10: 1% is 0.1, so the floor of 1 unit applies.
        let prior = snapshot(vec![position("a", dec!(10))], dec!(5));

        let at_floor = snapshot(vec![position("a", dec!(11))], dec!(5));
        assert!(!snapshot_changed(&prior, &at_floor));

        let over_floor = snapshot(vec![position("a", dec!(11.01))], dec!(5));
        assert!(snapshot_changed(&prior, &over_floor));
    }

    #[test]
    fn test_size_delta_percentage_boundary() {
        // Prior size 1000: 1% is 10, which beats the 1-unit floor.
        let prior = snapshot(vec![position("a", dec!(1000))], dec!(500));

        let below = snapshot(vec![position("a", dec!(1009))], dec!(500));
        assert!(!snapshot_changed(&prior, &below));

        let at_threshold = snapshot(vec![position("a", dec!(1010))], dec!(500));
        assert!(!snapshot_changed(&prior, &at_threshold));

        let above = snapshot(vec![position("a", dec!(1010.5))], dec!(500));
        assert!(snapshot_changed(&prior, &above));
    }

    #[test]
    fn test_total_value_delta() {
        let prior = snapshot(vec![position("a", dec!(10))], dec!(100));

        let small_move = snapshot(vec![position("a", dec!(10))], dec!(100.9));
        assert!(!snapshot_changed(&prior, &small_move));

        let big_move = snapshot(vec![position("a", dec!(10))], dec!(102));
        assert!(snapshot_changed(&prior, &big_move));
    }

    #[test]
    fn test_zero_prior_value_does_not_divide_by_zero() {
        let prior = snapshot(vec![position("a", dec!(10))], dec!(0));
        let current = snapshot(vec![position("a", dec!(10))], dec!(0.001));

        // 0.001 against the 0.01 floor divisor is a 10% move.
        assert!(snapshot_changed(&prior, &current));
    }
}
