// Regions and the economy interface driven by the scenario loop

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use tsify_next::Tsify;

use crate::context::SimContext;
use crate::gdp::{GdpError, GdpTrajectory};
use crate::scenario::ScenarioError;
use crate::types::{MarketKey, Period, RegionId};

/// Sub-model hooks the scenario loop and the solver call, in loop order.
pub trait Economy {
    /// One-time setup after configuration: register markets, derive initial data.
    fn complete_init(&mut self, ctx: &mut SimContext) -> Result<(), ScenarioError>;

    /// Non-equilibrium pass before solving.
    fn init_calc(&mut self, ctx: &mut SimContext, period: Period);

    /// Equilibrium pass. Called once before the solver and again for every
    /// trial price the solver evaluates.
    fn calc(&mut self, ctx: &mut SimContext, period: Period);

    fn finalize_period(&mut self, ctx: &mut SimContext, period: Period);

    fn update_summary(&self, ctx: &SimContext, period: Period) -> Vec<RegionSummary>;
}

// === REGION ===

#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    /// Exogenous population per period.
    pub population: Vec<f64>,
    pub gdp: GdpTrajectory,
    /// GDP targets per period; zero means uncalibrated.
    pub calibration_gdps: Vec<f64>,
    /// Energy service price relative to the base period.
    pub energy_price_ratio: Vec<f64>,
}

impl Region {
    /// A region with no calibration targets and constant energy prices.
    pub fn new(name: impl Into<String>, population: Vec<f64>, gdp: GdpTrajectory) -> Self {
        let max_period = gdp.max_period();
        Self {
            name: name.into(),
            population,
            gdp,
            calibration_gdps: vec![0.0; max_period],
            energy_price_ratio: vec![1.0; max_period],
        }
    }

    pub fn with_calibration_gdps(mut self, targets: Vec<f64>) -> Self {
        self.calibration_gdps = targets;
        self
    }

    pub fn with_energy_price_ratio(mut self, ratios: Vec<f64>) -> Self {
        self.energy_price_ratio = ratios;
        self
    }

    fn validate(&self) -> Result<(), GdpError> {
        let expected = self.gdp.max_period();
        for (series, values) in [
            ("population", &self.population),
            ("calibration_gdp", &self.calibration_gdps),
            ("energy_price_ratio", &self.energy_price_ratio),
        ] {
            if values.len() != expected {
                return Err(GdpError::SeriesLength {
                    series,
                    expected,
                    actual: values.len(),
                });
            }
        }
        Ok(())
    }

    fn calc(&mut self, ctx: &mut SimContext, id: RegionId, period: Period) {
        let key = MarketKey::gdp(id);
        let calibrating = ctx.marketplace.is_market_to_solve(key, period);

        if calibrating {
            self.gdp
                .write_back_calibrated_values(&ctx.time, &ctx.marketplace, id, period);
        }

        if let Err(err) = self
            .gdp
            .initial_gdp_calc(&ctx.time, period, self.population[period])
        {
            tracing::error!(target: "gdp", region = %self.name, period, error = %err, "initial GDP calculation failed");
            return;
        }

        // Faults are logged inside adjust_gdp; the defaulted value stands.
        self.gdp.adjust_gdp(period, self.energy_price_ratio[period]);

        if calibrating {
            ctx.marketplace
                .add_to_supply(key, self.gdp.gdp(period), period);
        }
    }

    pub fn summary(&self, period: Period) -> RegionSummary {
        let gdp = &self.gdp;
        RegionSummary {
            region: self.name.clone(),
            population: self.population[period],
            labor_force: gdp.labor_force(period),
            labor_productivity_growth: gdp.labor_productivity_growth(period),
            energy_price_ratio: self.energy_price_ratio[period],
            gdp: gdp.gdp(period),
            gdp_not_adjusted: gdp.gdp_not_adjusted(period),
            gdp_per_cap: gdp.gdp_per_cap(period),
            ppp_gdp_per_cap: gdp.ppp_gdp_per_cap(period),
            adjusted: gdp.is_adjusted(period),
        }
    }
}

/// End-of-period snapshot of one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct RegionSummary {
    pub region: String,
    pub population: f64,
    pub labor_force: f64,
    pub labor_productivity_growth: f64,
    pub energy_price_ratio: f64,
    pub gdp: f64,
    pub gdp_not_adjusted: f64,
    pub gdp_per_cap: f64,
    pub ppp_gdp_per_cap: f64,
    pub adjusted: bool,
}

// === WORLD ===

/// All regions of a scenario.
#[derive(Debug, Clone, Default)]
pub struct World {
    pub regions: SlotMap<RegionId, Region>,
    finalized_through: Option<Period>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a region after checking its series cover the whole horizon.
    pub fn add_region(&mut self, region: Region) -> Result<RegionId, GdpError> {
        region.validate()?;
        Ok(self.regions.insert(region))
    }

    pub fn get_region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id)
    }

    pub fn get_region_mut(&mut self, id: RegionId) -> Option<&mut Region> {
        self.regions.get_mut(id)
    }

    pub fn region_by_name(&self, name: &str) -> Option<(RegionId, &Region)> {
        self.regions.iter().find(|(_, r)| r.name == name)
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Last period that went through `finalize_period`.
    pub fn finalized_through(&self) -> Option<Period> {
        self.finalized_through
    }
}

impl Economy for World {
    fn complete_init(&mut self, ctx: &mut SimContext) -> Result<(), ScenarioError> {
        if self.regions.is_empty() {
            return Err(ScenarioError::NoRegions);
        }

        for (id, region) in self.regions.iter_mut() {
            // Calibration may replace the base GDP, so it precedes init_data.
            region.gdp.setup_calibration_markets(
                &ctx.time,
                &mut ctx.marketplace,
                id,
                &region.name,
                &region.calibration_gdps,
            )?;
            region.gdp.init_data(&ctx.time, &region.population)?;
            tracing::debug!(target: "scenario", region = %region.name, base_gdp = region.gdp.base_gdp(), "region initialized");
        }

        ctx.marketplace.init_prices();
        Ok(())
    }

    fn init_calc(&mut self, ctx: &mut SimContext, period: Period) {
        for region in self.regions.values_mut() {
            if let Err(err) = region
                .gdp
                .initial_gdp_calc(&ctx.time, period, region.population[period])
            {
                tracing::error!(target: "gdp", region = %region.name, period, error = %err, "approximate GDP calculation failed");
            }
        }
    }

    fn calc(&mut self, ctx: &mut SimContext, period: Period) {
        for (id, region) in self.regions.iter_mut() {
            region.calc(ctx, id, period);
        }
    }

    fn finalize_period(&mut self, _ctx: &mut SimContext, period: Period) {
        for region in self.regions.values() {
            if !region.gdp.is_adjusted(period) {
                tracing::warn!(target: "gdp", region = %region.name, period, "period finalized without adjusted GDP");
            }
        }
        self.finalized_through = Some(period);
    }

    fn update_summary(&self, _ctx: &SimContext, period: Period) -> Vec<RegionSummary> {
        self.regions.values().map(|r| r.summary(period)).collect()
    }
}
