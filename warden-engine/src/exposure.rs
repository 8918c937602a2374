//! Exposure coordinator: aggregate per-direction volume cap across legs.
//!
//! Each leg (one side of a pair or hedge, possibly on its own instrument)
//! has its own tracker and protective levels. The coordinator grants
//! volume so that, per direction, filled volume plus granted-but-unfilled
//! reservations never exceeds the cap.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use warden_domain::{
    Candle, ExitSignal, FillOutcome, InstrumentSpec, LegId, OrderRequest, OrderSide,
    PositionTracker, ProtectiveConfig, ProtectiveLevels, Side, Symbol, Volume,
};

use crate::error::{EngineError, EngineResult};
use crate::settings::RiskSettings;

/// One coordinated leg
#[derive(Debug, Clone)]
pub struct Leg {
    /// Leg identifier
    pub id: LegId,
    /// Instrument traded by this leg
    pub symbol: Symbol,
    /// Filled position
    pub tracker: PositionTracker,
    /// Protective levels while the leg is open
    pub levels: Option<ProtectiveLevels>,
    reserved: HashMap<Side, Decimal>,
}

impl Leg {
    fn new(id: LegId, symbol: Symbol) -> Self {
        Self {
            id,
            symbol,
            tracker: PositionTracker::new(),
            levels: None,
            reserved: HashMap::new(),
        }
    }

    /// Granted volume not filled yet
    pub fn reserved(&self, side: Side) -> Decimal {
        self.reserved.get(&side).copied().unwrap_or_default()
    }

    /// Filled volume held in `side`'s direction
    pub fn filled(&self, side: Side) -> Decimal {
        directional(self.tracker.net_volume(), side)
    }

    fn exposure(&self, side: Side) -> Decimal {
        self.filled(side) + self.reserved(side)
    }

    fn consume(&mut self, side: Side, volume: Decimal) {
        let entry = self.reserved.entry(side).or_default();
        *entry = (*entry - volume).max(Decimal::ZERO);
    }
}

fn directional(net_volume: Decimal, side: Side) -> Decimal {
    (net_volume * side.sign()).max(Decimal::ZERO)
}

/// Multi-leg exposure coordinator
#[derive(Debug, Clone)]
pub struct ExposureCoordinator {
    cap: Decimal,
    protective: ProtectiveConfig,
    instrument: InstrumentSpec,
    legs: BTreeMap<LegId, Leg>,
}

impl ExposureCoordinator {
    /// Create a coordinator
    ///
    /// # Errors
    /// Returns `EngineError::InvalidSettings` for a non-positive cap and
    /// `EngineError::Domain` for invalid protective or instrument settings.
    pub fn new(
        cap: Decimal,
        protective: ProtectiveConfig,
        instrument: InstrumentSpec,
    ) -> EngineResult<Self> {
        if cap <= Decimal::ZERO {
            return Err(EngineError::InvalidSettings(format!(
                "exposure_cap must be positive, got {}",
                cap
            )));
        }
        protective.validate()?;
        instrument.validate()?;

        Ok(Self {
            cap,
            protective,
            instrument,
            legs: BTreeMap::new(),
        })
    }

    /// Build from risk settings; `sizing.exposure_cap` is required
    ///
    /// # Errors
    /// Returns `EngineError::InvalidSettings` when no cap is configured.
    pub fn from_settings(settings: &RiskSettings) -> EngineResult<Self> {
        let cap = settings.sizing.exposure_cap.ok_or_else(|| {
            EngineError::InvalidSettings("exposure coordination requires exposure_cap".to_string())
        })?;
        Self::new(cap, settings.protective.clone(), *settings.instrument())
    }

    /// Per-direction cap
    pub fn cap(&self) -> Decimal {
        self.cap
    }

    /// Register a new leg
    ///
    /// # Errors
    /// Returns `EngineError::DuplicateLeg` if the id is taken.
    pub fn register_leg(&mut self, id: LegId, symbol: Symbol) -> EngineResult<()> {
        if self.legs.contains_key(&id) {
            return Err(EngineError::DuplicateLeg(id));
        }
        debug!(leg = %id, %symbol, "Leg registered");
        self.legs.insert(id.clone(), Leg::new(id, symbol));
        Ok(())
    }

    /// Look up a leg
    pub fn leg(&self, id: &LegId) -> Option<&Leg> {
        self.legs.get(id)
    }

    /// All legs, ordered by id
    pub fn legs(&self) -> impl Iterator<Item = &Leg> {
        self.legs.values()
    }

    fn leg_mut(&mut self, id: &LegId) -> EngineResult<&mut Leg> {
        self.legs.get_mut(id).ok_or_else(|| EngineError::UnknownLeg(id.clone()))
    }

    /// Aggregate exposure in one direction (filled plus reserved)
    pub fn exposure(&self, side: Side) -> Decimal {
        self.legs.values().map(|leg| leg.exposure(side)).sum()
    }

    /// Capacity left in one direction
    pub fn headroom(&self, side: Side) -> Decimal {
        (self.cap - self.exposure(side)).max(Decimal::ZERO)
    }

    /// Grant up to `requested` volume for a leg in `side`'s direction
    ///
    /// The grant is floored to the volume step and reserved until filled
    /// or released. Zero means the caller must not submit anything.
    ///
    /// # Errors
    /// Returns `EngineError::UnknownLeg` for an unregistered leg.
    pub fn try_open_leg(&mut self, id: &LegId, side: Side, requested: Decimal) -> EngineResult<Decimal> {
        let headroom = self.headroom(side);
        let granted = self.instrument.normalize_volume(requested.min(headroom));
        let cap = self.cap;

        let leg = self.leg_mut(id)?;
        if granted.is_zero() {
            debug!(leg = %id, %side, %requested, %headroom, "No exposure headroom, leg not opened");
            return Ok(Decimal::ZERO);
        }

        *leg.reserved.entry(side).or_default() += granted;
        info!(leg = %id, %side, %requested, %granted, %cap, "Leg volume granted");
        Ok(granted)
    }

    /// Apply a fill to a leg
    ///
    /// The part of the fill that grows the leg's exposure consumes its
    /// reservation. Levels are armed when the leg opens or flips and
    /// dropped when it goes flat.
    ///
    /// # Errors
    /// Returns `EngineError::UnknownLeg` for an unregistered leg.
    pub fn on_fill(
        &mut self,
        id: &LegId,
        side: OrderSide,
        price: Decimal,
        volume: Decimal,
    ) -> EngineResult<FillOutcome> {
        let protective = self.protective.clone();
        let price_step = self.instrument.price_step;
        let leg = self.leg_mut(id)?;

        let direction = side.opens();
        let before = leg.filled(direction);
        let outcome = leg.tracker.on_fill(side, price, volume);
        if outcome.ignored {
            warn!(leg = %id, %side, %price, %volume, "Invalid leg fill ignored");
            return Ok(outcome);
        }
        let growth = (leg.filled(direction) - before).max(Decimal::ZERO);
        leg.consume(direction, growth);

        if outcome.closed.is_some() {
            leg.levels = None;
        }
        if let (Some(opened), Some(entry)) = (outcome.opened, leg.tracker.average_price()) {
            leg.levels = Some(ProtectiveLevels::from_config(entry, opened, &protective, price_step));
        }

        debug!(leg = %id, %side, %price, %volume, net = %leg.tracker.net_volume(), "Leg fill applied");
        Ok(outcome)
    }

    /// Return unfilled reservation (rejected or cancelled leg order)
    ///
    /// # Errors
    /// Returns `EngineError::UnknownLeg` for an unregistered leg.
    pub fn release(&mut self, id: &LegId, side: Side, volume: Decimal) -> EngineResult<()> {
        let leg = self.leg_mut(id)?;
        leg.consume(side, volume);
        debug!(leg = %id, %side, %volume, remaining = %leg.reserved(side), "Leg reservation released");
        Ok(())
    }

    /// Check a leg's stop/take against a finished bar, then advance its
    /// break-even and trailing rules on the close
    ///
    /// # Errors
    /// Returns `EngineError::UnknownLeg` for an unregistered leg.
    pub fn evaluate_leg(&mut self, id: &LegId, candle: &Candle) -> EngineResult<Option<ExitSignal>> {
        let leg = self.leg_mut(id)?;
        if candle.symbol != leg.symbol || !candle.is_final {
            return Ok(None);
        }
        let Some(levels) = leg.levels.as_mut() else {
            return Ok(None);
        };

        if let Some(exit) = levels.evaluate(candle.low, candle.high, candle.close) {
            info!(leg = %id, reason = ?exit.reason, level = %exit.level, "Leg exit triggered");
            return Ok(Some(exit));
        }
        levels.apply_rules(candle.close);
        Ok(None)
    }

    /// One market closing request per non-flat leg
    pub fn close_all_legs(&self) -> Vec<(LegId, OrderRequest)> {
        let requests: Vec<(LegId, OrderRequest)> = self
            .legs
            .values()
            .filter_map(|leg| {
                let side = leg.tracker.side()?;
                let volume = Volume::new(leg.tracker.abs_volume()).ok()?;
                Some((
                    leg.id.clone(),
                    OrderRequest::market(leg.symbol.clone(), side.exit_action(), volume),
                ))
            })
            .collect();

        info!(legs = requests.len(), "Closing all legs");
        requests
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use warden_domain::{Distance, ExitReason};

    fn coordinator(cap: Decimal) -> ExposureCoordinator {
        let protective = ProtectiveConfig {
            stop_distance: Some(Distance::Absolute(dec!(5))),
            ..ProtectiveConfig::default()
        };
        let mut coordinator =
            ExposureCoordinator::new(cap, protective, InstrumentSpec::default()).unwrap();
        coordinator
            .register_leg(LegId::new("a"), Symbol::new("EURUSD").unwrap())
            .unwrap();
        coordinator
            .register_leg(LegId::new("b"), Symbol::new("GBPUSD").unwrap())
            .unwrap();
        coordinator
    }

    #[test]
    fn test_grant_clamped_by_cap() {
        let mut c = coordinator(dec!(1));
        let (a, b) = (LegId::new("a"), LegId::new("b"));

        assert_eq!(c.try_open_leg(&a, Side::Long, dec!(0.7)).unwrap(), dec!(0.7));
        assert_eq!(c.try_open_leg(&b, Side::Long, dec!(0.7)).unwrap(), dec!(0.3));
        assert_eq!(c.try_open_leg(&b, Side::Long, dec!(0.1)).unwrap(), dec!(0));
        assert_eq!(c.exposure(Side::Long), dec!(1));

        // Other direction is independent
        assert_eq!(c.try_open_leg(&b, Side::Short, dec!(0.5)).unwrap(), dec!(0.5));
    }

    #[test]
    fn test_fill_consumes_reservation() {
        let mut c = coordinator(dec!(1));
        let a = LegId::new("a");

        c.try_open_leg(&a, Side::Long, dec!(0.6)).unwrap();
        c.on_fill(&a, OrderSide::Buy, dec!(1.10), dec!(0.6)).unwrap();

        let leg = c.leg(&a).unwrap();
        assert_eq!(leg.reserved(Side::Long), dec!(0));
        assert_eq!(leg.filled(Side::Long), dec!(0.6));
        assert_eq!(c.exposure(Side::Long), dec!(0.6));
        assert!(leg.levels.is_some());
    }

    #[test]
    fn test_release_returns_headroom() {
        let mut c = coordinator(dec!(1));
        let a = LegId::new("a");

        c.try_open_leg(&a, Side::Short, dec!(1)).unwrap();
        assert_eq!(c.headroom(Side::Short), dec!(0));

        c.release(&a, Side::Short, dec!(1)).unwrap();
        assert_eq!(c.headroom(Side::Short), dec!(1));
    }

    #[test]
    fn test_close_all_legs() {
        let mut c = coordinator(dec!(2));
        let (a, b) = (LegId::new("a"), LegId::new("b"));

        c.try_open_leg(&a, Side::Long, dec!(1)).unwrap();
        c.on_fill(&a, OrderSide::Buy, dec!(1.10), dec!(1)).unwrap();
        c.try_open_leg(&b, Side::Short, dec!(0.5)).unwrap();
        c.on_fill(&b, OrderSide::Sell, dec!(1.25), dec!(0.5)).unwrap();

        let requests = c.close_all_legs();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].0, a);
        assert_eq!(requests[0].1.side, OrderSide::Sell);
        assert_eq!(requests[1].1.side, OrderSide::Buy);
        assert_eq!(requests[1].1.volume.as_decimal(), dec!(0.5));

        c.on_fill(&a, OrderSide::Sell, dec!(1.12), dec!(1)).unwrap();
        assert!(c.leg(&a).unwrap().levels.is_none());
        assert_eq!(c.close_all_legs().len(), 1);
    }

    #[test]
    fn test_leg_stop_evaluation() {
        let mut c = coordinator(dec!(2));
        let a = LegId::new("a");
        c.try_open_leg(&a, Side::Long, dec!(1)).unwrap();
        c.on_fill(&a, OrderSide::Buy, dec!(100), dec!(1)).unwrap();

        let candle = Candle::new(
            Symbol::new("EURUSD").unwrap(),
            chrono::Utc::now(),
            dec!(99),
            dec!(100),
            dec!(94),
            dec!(96),
        );
        let exit = c.evaluate_leg(&a, &candle).unwrap().unwrap();
        assert_eq!(exit.reason, ExitReason::StopLoss);
        assert_eq!(exit.level, dec!(95));
    }

    #[test]
    fn test_unknown_and_duplicate_legs() {
        let mut c = coordinator(dec!(1));
        assert!(matches!(
            c.try_open_leg(&LegId::new("zz"), Side::Long, dec!(1)),
            Err(EngineError::UnknownLeg(_))
        ));
        assert!(matches!(
            c.register_leg(LegId::new("a"), Symbol::new("EURUSD").unwrap()),
            Err(EngineError::DuplicateLeg(_))
        ));
    }

    #[test]
    fn test_from_settings_requires_cap() {
        let settings = RiskSettings::fixed(dec!(1));
        assert!(ExposureCoordinator::from_settings(&settings).is_err());

        let mut capped = settings;
        capped.sizing.exposure_cap = Some(dec!(3));
        assert_eq!(ExposureCoordinator::from_settings(&capped).unwrap().cap(), dec!(3));
    }
}
