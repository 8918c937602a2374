//! Property tests for domain invariants.
//!
//! Uses proptest to verify:
//! 1. Average price - weighted mean while adding, fill price after a flip
//! 2. Trailing monotonicity - stops only move in the position's favor
//! 3. Martingale bound - multiplier stays in [1, cap], profit resets it
//! 4. Tier idempotence - each tier fires at most once per lifecycle

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use warden_domain::{
    Distance, OrderSide, PositionTracker, ProtectiveConfig, ProtectiveLevels, Side, SizingConfig,
    SizingPolicy, TierConfig,
};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = Decimal> {
    (1_000i64..50_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn arb_volume() -> impl Strategy<Value = Decimal> {
    (1i64..1_000).prop_map(|hundredths| Decimal::new(hundredths, 2))
}

fn arb_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Long), Just(Side::Short)]
}

fn close_enough(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() < dec!(0.0000001)
}

// ── 1. Average price ─────────────────────────────────────────────────

proptest! {
    /// Adding in one direction keeps the volume-weighted mean.
    #[test]
    fn average_price_is_weighted_mean(
        side in arb_side(),
        fills in prop::collection::vec((arb_price(), arb_volume()), 1..20),
    ) {
        let mut tracker = PositionTracker::new();
        let mut notional = Decimal::ZERO;
        let mut total = Decimal::ZERO;

        for (price, volume) in &fills {
            tracker.on_fill(side.entry_action(), *price, *volume);
            notional += *price * *volume;
            total += *volume;
        }

        prop_assert_eq!(tracker.net_volume(), side.sign() * total);
        let average = tracker.average_price().unwrap();
        prop_assert!(close_enough(average, notional / total));
    }

    /// Crossing zero opens the excess at the fill price.
    #[test]
    fn flip_resets_average_to_fill_price(
        entry in arb_price(),
        held in arb_volume(),
        extra in arb_volume(),
        flip_price in arb_price(),
    ) {
        let mut tracker = PositionTracker::new();
        tracker.on_fill(OrderSide::Buy, entry, held);
        let outcome = tracker.on_fill(OrderSide::Sell, flip_price, held + extra);

        prop_assert!(outcome.flipped());
        prop_assert_eq!(tracker.net_volume(), -extra);
        prop_assert_eq!(tracker.average_price(), Some(flip_price));
        prop_assert_eq!(outcome.closed.unwrap().realized_pnl, (flip_price - entry) * held);
    }
}

// ── 2. Trailing monotonicity ─────────────────────────────────────────

proptest! {
    /// Whatever the price path, the trailing stop never moves against the position.
    #[test]
    fn trailing_stop_is_monotonic(
        side in arb_side(),
        path in prop::collection::vec(arb_price(), 1..60),
        distance in 1i64..50,
        step in 1i64..10,
    ) {
        let entry = dec!(250);
        let mut levels = ProtectiveLevels::initialize(entry, side, Some(dec!(20)), None);
        let mut previous = levels.stop_price.unwrap();

        for price in path {
            levels.apply_trailing(price, Decimal::from(distance), Decimal::from(step));
            let stop = levels.stop_price.unwrap();
            prop_assert!((stop - previous) * side.sign() >= Decimal::ZERO);
            previous = stop;
        }
    }
}

// ── 3. Martingale bound ──────────────────────────────────────────────

proptest! {
    /// The multiplier stays within [1, cap]; any profit resets it to exactly 1.
    #[test]
    fn martingale_multiplier_bounded(
        factor in 1i64..40,
        cap in 1i64..20,
        pnls in prop::collection::vec(-100i64..100, 1..50),
    ) {
        let config = SizingConfig {
            escalation_factor: Decimal::new(factor, 1),
            multiplier_cap: Decimal::from(cap),
            ..SizingConfig::fixed(dec!(0.1))
        };
        let mut policy = SizingPolicy::new(config).unwrap();

        for pnl in pnls {
            let multiplier = policy.on_position_closed(Decimal::from(pnl));
            prop_assert!(multiplier >= Decimal::ONE);
            prop_assert!(multiplier <= Decimal::from(cap));
            if pnl > 0 {
                prop_assert_eq!(multiplier, Decimal::ONE);
            }
        }
    }
}

// ── 4. Tier idempotence ──────────────────────────────────────────────

proptest! {
    /// Touching the same tier range on many bars fires each tier once.
    #[test]
    fn tiers_fire_at_most_once(
        side in arb_side(),
        bars in prop::collection::vec((arb_price(), arb_price()), 1..40),
    ) {
        let config = ProtectiveConfig {
            tiers: vec![
                TierConfig { distance: Distance::Percent(dec!(5)), close_fraction: dec!(0.5) },
                TierConfig { distance: Distance::Percent(dec!(15)), close_fraction: dec!(0.5) },
                TierConfig { distance: Distance::Percent(dec!(30)), close_fraction: dec!(1) },
            ],
            inclusive: true,
            ..ProtectiveConfig::default()
        };
        let mut levels = ProtectiveLevels::from_config(dec!(250), side, &config, dec!(0.01));
        let mut fired = [0usize; 3];
        let mut volume = dec!(8);

        for (a, b) in bars {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            for exit in levels.evaluate_tiers(high, low, volume) {
                fired[exit.index] += 1;
                volume -= exit.volume;
            }
        }

        prop_assert!(fired.iter().all(|count| *count <= 1));
        prop_assert!(volume >= Decimal::ZERO);
    }
}
