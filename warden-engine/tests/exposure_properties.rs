//! Property tests for the exposure coordinator and engine lifecycle.
//!
//! 1. Exposure cap - granted plus filled volume never exceeds the cap
//! 2. Lifecycle - arbitrary bar sequences never leave an order in flight
//!    once every order has been filled

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use warden_domain::{
    Candle, Distance, InstrumentSpec, LegId, LifecycleState, OrderSide, OrderType, OrderUpdate,
    ProtectiveConfig, Side, SignalIntent, Symbol,
};
use warden_engine::{Engine, EngineDecision, ExposureCoordinator, RiskSettings};

// ── Strategies (proptest) ────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Open { leg: usize, side: Side, volume: Decimal },
    Fill { leg: usize, fraction: Decimal },
    Release { leg: usize, side: Side },
    Close { leg: usize },
}

fn arb_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Long), Just(Side::Short)]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..3, arb_side(), 1i64..300)
            .prop_map(|(leg, side, v)| Op::Open { leg, side, volume: Decimal::new(v, 2) }),
        (0usize..3, 1i64..=10).prop_map(|(leg, f)| Op::Fill { leg, fraction: Decimal::new(f, 1) }),
        (0usize..3, arb_side()).prop_map(|(leg, side)| Op::Release { leg, side }),
        (0usize..3).prop_map(|leg| Op::Close { leg }),
    ]
}

fn leg_ids() -> Vec<LegId> {
    vec![LegId::new("leg-0"), LegId::new("leg-1"), LegId::new("leg-2")]
}

fn coordinator(cap: Decimal) -> ExposureCoordinator {
    let mut coordinator =
        ExposureCoordinator::new(cap, ProtectiveConfig::default(), InstrumentSpec::default())
            .unwrap();
    for (i, id) in leg_ids().into_iter().enumerate() {
        coordinator
            .register_leg(id, Symbol::new(format!("SYM{}", i)).unwrap())
            .unwrap();
    }
    coordinator
}

// ── 1. Exposure cap ──────────────────────────────────────────────────

proptest! {
    /// Whatever the order of grants, fills, releases and closes, neither
    /// direction ever exceeds the cap.
    #[test]
    fn exposure_never_exceeds_cap(
        cap in (10i64..500).prop_map(|c| Decimal::new(c, 2)),
        ops in prop::collection::vec(arb_op(), 1..60),
    ) {
        let ids = leg_ids();
        let mut c = coordinator(cap);

        for op in ops {
            match op {
                Op::Open { leg, side, volume } => {
                    let granted = c.try_open_leg(&ids[leg], side, volume).unwrap();
                    prop_assert!(granted <= volume);
                }
                Op::Fill { leg, fraction } => {
                    let snapshot = c.leg(&ids[leg]).unwrap().clone();
                    for side in [Side::Long, Side::Short] {
                        let reserved = snapshot.reserved(side);
                        let volume = (reserved * fraction).round_dp(2);
                        if volume > Decimal::ZERO && volume <= reserved {
                            c.on_fill(&ids[leg], side.entry_action(), dec!(100), volume).unwrap();
                        }
                    }
                }
                Op::Release { leg, side } => {
                    let reserved = c.leg(&ids[leg]).unwrap().reserved(side);
                    c.release(&ids[leg], side, reserved).unwrap();
                }
                Op::Close { leg } => {
                    let request = c
                        .close_all_legs()
                        .into_iter()
                        .find(|(id, _)| *id == ids[leg]);
                    if let Some((id, request)) = request {
                        c.on_fill(&id, request.side, dec!(100), request.volume.as_decimal()).unwrap();
                    }
                }
            }

            prop_assert!(c.exposure(Side::Long) <= cap);
            prop_assert!(c.exposure(Side::Short) <= cap);
        }
    }
}

// ── 2. Lifecycle ─────────────────────────────────────────────────────

fn fill_all(engine: &mut Engine, decision: &EngineDecision, price: Decimal) {
    let orders: Vec<_> = decision
        .orders()
        .filter(|o| o.order_type == OrderType::Market)
        .cloned()
        .collect();
    for order in orders {
        engine.on_order_update(OrderUpdate::fill(order.id, order.volume.as_decimal(), price, true));
    }
}

proptest! {
    /// With immediate fills the engine always settles to Flat or Open, and
    /// a flat tracker always means no protective levels.
    #[test]
    fn engine_settles_between_events(
        bars in prop::collection::vec((9_000i64..11_000, 0i64..400, 0i64..400), 1..40),
        flip_every in 2usize..7,
    ) {
        let settings = RiskSettings {
            protective: ProtectiveConfig {
                stop_distance: Some(Distance::Absolute(dec!(3))),
                take_distance: Some(Distance::Absolute(dec!(6))),
                ..ProtectiveConfig::default()
            },
            ..RiskSettings::fixed(dec!(1))
        };
        let symbol = Symbol::new("BTCUSDT").unwrap();
        let mut engine = Engine::new(symbol.clone(), settings).unwrap();

        for (i, (mid, down, up)) in bars.into_iter().enumerate() {
            let close = Decimal::new(mid, 2);
            let low = close - Decimal::new(down, 2);
            let high = close + Decimal::new(up, 2);

            if i % flip_every == 0 {
                let intent = if (i / flip_every) % 2 == 0 {
                    SignalIntent::EnterLong
                } else {
                    SignalIntent::EnterShort
                };
                let decision = engine.on_signal(intent, close);
                fill_all(&mut engine, &decision, close);
            }

            let candle = Candle::new(symbol.clone(), chrono::Utc::now(), close, high, low, close);
            let decision = engine.on_candle(&candle);
            let exit_price = decision
                .orders()
                .next()
                .map(|o| if o.side == OrderSide::Sell { low.max(dec!(1)) } else { high })
                .unwrap_or(close);
            fill_all(&mut engine, &decision, exit_price);

            let state = engine.state();
            prop_assert!(matches!(state, LifecycleState::Flat | LifecycleState::Open));
            prop_assert_eq!(engine.tracker().is_flat(), state == LifecycleState::Flat);
            prop_assert_eq!(engine.tracker().is_flat(), engine.levels().is_none());
            prop_assert!(engine.sizing().effective_multiplier() >= Decimal::ONE);
        }
    }
}
