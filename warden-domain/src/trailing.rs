//! Stop/Target Geometry and Trailing Logic (Pure Functions)
//!
//! All functions are deterministic and have no side effects.
//!
//! # Trailing Stop Algorithm (distance + step)
//!
//! ```text
//! favorable = (price - entry) · sign
//! if favorable > distance + step:
//!     candidate = price ∓ distance
//!     move stop to candidate if it improves the stop by at least `step`
//! ```
//!
//! Key invariants:
//! - Stop is monotonic (never moves against the position)
//! - Moves smaller than `step` are suppressed, so noise does not churn orders

use crate::value_objects::Side;
use rust_decimal::Decimal;

/// Result of a trailing stop update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingStopUpdate {
    /// Stop before the update (None if no stop was set)
    pub previous_stop: Option<Decimal>,
    /// New trailing stop price
    pub new_stop: Decimal,
}

/// Signed move from `entry` to `price`, positive when in the position's favor
pub fn favorable_move(side: Side, entry: Decimal, price: Decimal) -> Decimal {
    (price - entry) * side.sign()
}

/// Level `distance` away from `reference` on the loss side
///
/// Long → below, Short → above
pub fn stop_from(side: Side, reference: Decimal, distance: Decimal) -> Decimal {
    reference - distance * side.sign()
}

/// Level `distance` away from `reference` on the profit side
///
/// Long → above, Short → below
pub fn target_from(side: Side, reference: Decimal, distance: Decimal) -> Decimal {
    reference + distance * side.sign()
}

/// True if `candidate` is strictly better than `current` for a stop on `side`
pub fn is_more_favorable(side: Side, candidate: Decimal, current: Decimal) -> bool {
    (candidate - current) * side.sign() > Decimal::ZERO
}

/// Check whether a bar's range reached a stop level
///
/// Long stops trigger on the bar low, short stops on the bar high.
/// With `inclusive` a touch counts; otherwise the level must be traded through.
///
/// # Examples
///
/// ```
/// # use warden_domain::trailing::is_stop_hit;
/// # use warden_domain::value_objects::Side;
/// # use rust_decimal_macros::dec;
/// assert!(is_stop_hit(Side::Long, dec!(95), dec!(101), dec!(95), true));
/// assert!(!is_stop_hit(Side::Long, dec!(95), dec!(101), dec!(95), false));
/// assert!(is_stop_hit(Side::Short, dec!(99), dec!(105.5), dec!(105), false));
/// ```
pub fn is_stop_hit(side: Side, low: Decimal, high: Decimal, stop: Decimal, inclusive: bool) -> bool {
    match side {
        Side::Long => reached_downward(low, stop, inclusive),
        Side::Short => reached_upward(high, stop, inclusive),
    }
}

/// Check whether a bar's range reached a profit-side level
///
/// Long targets trigger on the bar high, short targets on the bar low.
pub fn is_target_hit(
    side: Side,
    low: Decimal,
    high: Decimal,
    target: Decimal,
    inclusive: bool,
) -> bool {
    match side {
        Side::Long => reached_upward(high, target, inclusive),
        Side::Short => reached_downward(low, target, inclusive),
    }
}

fn reached_upward(price: Decimal, level: Decimal, inclusive: bool) -> bool {
    if inclusive {
        price >= level
    } else {
        price > level
    }
}

fn reached_downward(price: Decimal, level: Decimal, inclusive: bool) -> bool {
    if inclusive {
        price <= level
    } else {
        price < level
    }
}

/// Update a trailing stop using the distance + step rule
///
/// # Arguments
///
/// * `side` - Position side
/// * `entry` - Average entry price
/// * `current_price` - Price the trail is measured from
/// * `current_stop` - Current stop, if any
/// * `distance` - Trail distance behind price
/// * `step` - Minimum improvement before the stop moves
///
/// # Returns
///
/// * `Some(TrailingStopUpdate)` - Stop should move
/// * `None` - Not enough favorable movement, or improvement below `step`
///
/// # Examples
///
/// ```
/// # use warden_domain::trailing::update_trailing_stop_stepped;
/// # use warden_domain::value_objects::Side;
/// # use rust_decimal_macros::dec;
/// // LONG entry 100, stop 95, trail 3 with step 1
/// let update = update_trailing_stop_stepped(
///     Side::Long, dec!(100), dec!(105), Some(dec!(95)), dec!(3), dec!(1),
/// ).unwrap();
/// assert_eq!(update.new_stop, dec!(102));
///
/// // Half a point higher: improvement 0.5 < step, stop stays
/// assert!(update_trailing_stop_stepped(
///     Side::Long, dec!(100), dec!(105.5), Some(update.new_stop), dec!(3), dec!(1),
/// ).is_none());
/// ```
pub fn update_trailing_stop_stepped(
    side: Side,
    entry: Decimal,
    current_price: Decimal,
    current_stop: Option<Decimal>,
    distance: Decimal,
    step: Decimal,
) -> Option<TrailingStopUpdate> {
    if favorable_move(side, entry, current_price) <= distance + step {
        return None;
    }

    let candidate = stop_from(side, current_price, distance);

    match current_stop {
        None => Some(TrailingStopUpdate {
            previous_stop: None,
            new_stop: candidate,
        }),
        Some(stop) => {
            let improvement = (candidate - stop) * side.sign();
            if improvement > Decimal::ZERO && improvement >= step {
                Some(TrailingStopUpdate {
                    previous_stop: Some(stop),
                    new_stop: candidate,
                })
            } else {
                None
            }
        },
    }
}

// =============================================================================
// Tests
// =============================================================================
