use std::collections::HashMap;

use crate::types::{MarketKey, Period};

/// Price a normal market starts from when nothing else seeded it.
pub const DEFAULT_INITIAL_PRICE: f64 = 1.0;

/// Denominator floor for relative excess demand.
const RELATIVE_EXCESS_FLOOR: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MarketType {
    #[default]
    Normal,
    /// Synthetic constraint market. Its demand is a fixed target and survives
    /// the per-period reset of supplies and demands.
    Calibration,
}

/// One market's per-period price, supply, demand and solve flags.
#[derive(Debug, Clone)]
pub struct Market {
    pub key: MarketKey,
    pub market_type: MarketType,
    prices: Vec<f64>,
    supplies: Vec<f64>,
    demands: Vec<f64>,
    solvable: Vec<bool>,
}

impl Market {
    fn new(key: MarketKey, market_type: MarketType, max_period: usize) -> Self {
        Self {
            key,
            market_type,
            prices: vec![0.0; max_period],
            supplies: vec![0.0; max_period],
            demands: vec![0.0; max_period],
            solvable: vec![false; max_period],
        }
    }

    pub fn price(&self, period: Period) -> f64 {
        self.prices[period]
    }

    pub fn supply(&self, period: Period) -> f64 {
        self.supplies[period]
    }

    pub fn demand(&self, period: Period) -> f64 {
        self.demands[period]
    }

    pub fn is_solvable(&self, period: Period) -> bool {
        self.solvable[period]
    }

    pub fn excess_demand(&self, period: Period) -> f64 {
        self.demands[period] - self.supplies[period]
    }

    /// Excess demand relative to demand, floored to avoid dividing by zero.
    pub fn relative_excess_demand(&self, period: Period) -> f64 {
        let scale = self.demands[period].abs().max(RELATIVE_EXCESS_FLOOR);
        self.excess_demand(period) / scale
    }

    fn null_supply_and_demand(&mut self, period: Period) {
        self.supplies[period] = 0.0;
        if self.market_type != MarketType::Calibration {
            self.demands[period] = 0.0;
        }
    }
}

/// Registry of markets keyed by (region, kind).
///
/// Markets iterate in creation order so solvers visit them deterministically.
#[derive(Debug, Clone)]
pub struct Marketplace {
    max_period: usize,
    markets: Vec<Market>,
    index: HashMap<MarketKey, usize>,
}

impl Marketplace {
    pub fn new(max_period: usize) -> Self {
        Self {
            max_period,
            markets: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn max_period(&self) -> usize {
        self.max_period
    }

    // === Registry ===

    /// Register a market. Returns false if the key already existed.
    pub fn create_market(&mut self, key: MarketKey, market_type: MarketType) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.markets.len());
        self.markets
            .push(Market::new(key, market_type, self.max_period));
        true
    }

    pub fn contains(&self, key: MarketKey) -> bool {
        self.index.contains_key(&key)
    }

    pub fn market(&self, key: MarketKey) -> Option<&Market> {
        self.index.get(&key).map(|&i| &self.markets[i])
    }

    fn market_mut(&mut self, key: MarketKey) -> Option<&mut Market> {
        match self.index.get(&key) {
            Some(&i) => Some(&mut self.markets[i]),
            None => {
                tracing::warn!(target: "market", market = %key, "market is not registered");
                None
            }
        }
    }

    pub fn markets(&self) -> impl Iterator<Item = &Market> {
        self.markets.iter()
    }

    // === Prices ===

    pub fn price(&self, key: MarketKey, period: Period) -> Option<f64> {
        self.market(key).map(|m| m.price(period))
    }

    pub fn set_price(&mut self, key: MarketKey, period: Period, price: f64) {
        if let Some(market) = self.market_mut(key) {
            market.prices[period] = price;
        }
    }

    /// Overwrite prices from period 0 onward with `prices`.
    pub fn set_price_vector(&mut self, key: MarketKey, prices: &[f64]) {
        if let Some(market) = self.market_mut(key) {
            for (slot, price) in market.prices.iter_mut().zip(prices) {
                *slot = *price;
            }
        }
    }

    /// Give unseeded normal markets a starting price in the first period.
    pub fn init_prices(&mut self) {
        for market in &mut self.markets {
            if market.market_type != MarketType::Normal {
                continue;
            }
            if let Some(first) = market.prices.first_mut() {
                if *first == 0.0 {
                    *first = DEFAULT_INITIAL_PRICE;
                }
            }
        }
    }

    /// Seed unset prices in `period` from the previous period.
    pub fn init_to_last(&mut self, period: Period) {
        if period == 0 {
            return;
        }
        for market in &mut self.markets {
            if market.prices[period] == 0.0 {
                market.prices[period] = market.prices[period - 1];
            }
        }
    }

    // === Supplies & demands ===

    pub fn add_to_demand(&mut self, key: MarketKey, amount: f64, period: Period) {
        if let Some(market) = self.market_mut(key) {
            market.demands[period] += amount;
        }
    }

    pub fn add_to_supply(&mut self, key: MarketKey, amount: f64, period: Period) {
        if let Some(market) = self.market_mut(key) {
            market.supplies[period] += amount;
        }
    }

    pub fn demand(&self, key: MarketKey, period: Period) -> Option<f64> {
        self.market(key).map(|m| m.demand(period))
    }

    pub fn supply(&self, key: MarketKey, period: Period) -> Option<f64> {
        self.market(key).map(|m| m.supply(period))
    }

    /// Clear supplies and demands for `period`. Calibration demand is kept.
    pub fn null_supplies_and_demands(&mut self, period: Period) {
        for market in &mut self.markets {
            market.null_supply_and_demand(period);
        }
    }

    // === Solving ===

    pub fn set_market_to_solve(&mut self, key: MarketKey, period: Period) {
        if let Some(market) = self.market_mut(key) {
            market.solvable[period] = true;
        }
    }

    pub fn is_market_to_solve(&self, key: MarketKey, period: Period) -> bool {
        self.market(key).is_some_and(|m| m.is_solvable(period))
    }

    pub fn markets_to_solve(&self, period: Period) -> Vec<MarketKey> {
        self.markets
            .iter()
            .filter(|m| m.is_solvable(period))
            .map(|m| m.key)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;
    use crate::types::{MarketKind, RegionId};

    fn two_regions() -> (RegionId, RegionId) {
        let mut keys: SlotMap<RegionId, ()> = SlotMap::with_key();
        (keys.insert(()), keys.insert(()))
    }

    #[test]
    fn test_create_market_once_per_key() {
        let (usa, _) = two_regions();
        let mut marketplace = Marketplace::new(3);

        assert!(marketplace.create_market(MarketKey::gdp(usa), MarketType::Calibration));
        assert!(!marketplace.create_market(MarketKey::gdp(usa), MarketType::Calibration));
        assert!(marketplace.contains(MarketKey::new(usa, MarketKind::Gdp)));
    }

    #[test]
    fn test_keys_do_not_collide_across_regions() {
        let (usa, china) = two_regions();
        let mut marketplace = Marketplace::new(2);
        marketplace.create_market(MarketKey::gdp(usa), MarketType::Calibration);

        assert!(!marketplace.contains(MarketKey::gdp(china)));
        marketplace.add_to_demand(MarketKey::gdp(china), 10.0, 1);
        assert_eq!(marketplace.demand(MarketKey::gdp(usa), 1), Some(0.0));
    }

    #[test]
    fn test_null_keeps_calibration_demand() {
        let (usa, china) = two_regions();
        let mut marketplace = Marketplace::new(2);
        marketplace.create_market(MarketKey::gdp(usa), MarketType::Calibration);
        marketplace.create_market(MarketKey::gdp(china), MarketType::Normal);

        for key in [MarketKey::gdp(usa), MarketKey::gdp(china)] {
            marketplace.add_to_demand(key, 100.0, 1);
            marketplace.add_to_supply(key, 40.0, 1);
        }
        marketplace.null_supplies_and_demands(1);

        assert_eq!(marketplace.demand(MarketKey::gdp(usa), 1), Some(100.0));
        assert_eq!(marketplace.supply(MarketKey::gdp(usa), 1), Some(0.0));
        assert_eq!(marketplace.demand(MarketKey::gdp(china), 1), Some(0.0));
    }

    #[test]
    fn test_init_to_last_only_fills_unset_prices() {
        let (usa, china) = two_regions();
        let mut marketplace = Marketplace::new(3);
        marketplace.create_market(MarketKey::gdp(usa), MarketType::Normal);
        marketplace.create_market(MarketKey::gdp(china), MarketType::Calibration);
        marketplace.init_prices();
        marketplace.set_price_vector(MarketKey::gdp(china), &[1.1, 1.2, 1.3]);

        marketplace.init_to_last(1);

        assert_eq!(marketplace.price(MarketKey::gdp(usa), 1), Some(1.0));
        assert_eq!(marketplace.price(MarketKey::gdp(china), 1), Some(1.2));
    }

    #[test]
    fn test_relative_excess_demand() {
        let (usa, _) = two_regions();
        let mut marketplace = Marketplace::new(1);
        let key = MarketKey::gdp(usa);
        marketplace.create_market(key, MarketType::Calibration);
        marketplace.add_to_demand(key, 200.0, 0);
        marketplace.add_to_supply(key, 150.0, 0);

        let market = marketplace.market(key).unwrap();
        assert_eq!(market.excess_demand(0), 50.0);
        assert!((market.relative_excess_demand(0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_markets_to_solve() {
        let (usa, china) = two_regions();
        let mut marketplace = Marketplace::new(3);
        marketplace.create_market(MarketKey::gdp(usa), MarketType::Calibration);
        marketplace.create_market(MarketKey::gdp(china), MarketType::Calibration);
        marketplace.set_market_to_solve(MarketKey::gdp(china), 2);

        assert!(marketplace.markets_to_solve(1).is_empty());
        assert_eq!(marketplace.markets_to_solve(2), vec![MarketKey::gdp(china)]);
        assert!(marketplace.is_market_to_solve(MarketKey::gdp(china), 2));
        assert!(!marketplace.is_market_to_solve(MarketKey::gdp(usa), 2));
    }
}
