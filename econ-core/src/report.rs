// Serializable views of a finished run for the WASM boundary and JSON export

use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::scenario::{PeriodSummary, RunOutcome};
use crate::time::ModelTime;
use crate::types::Period;
use crate::world::{Region, RegionSummary};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct PeriodReport {
    pub period: Period,
    pub year: i32,
    pub solved: bool,
    pub regions: Vec<RegionSummary>,
}

impl From<&PeriodSummary> for PeriodReport {
    fn from(summary: &PeriodSummary) -> Self {
        Self {
            period: summary.period,
            year: summary.year,
            solved: summary.solved,
            regions: summary.regions.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct RunReport {
    pub scenario: String,
    pub solved: bool,
    pub unsolved_periods: Vec<Period>,
    pub unsolved_years: Vec<i32>,
    pub periods: Vec<PeriodReport>,
}

impl RunReport {
    pub fn new(outcome: &RunOutcome, time: &ModelTime, summaries: &[PeriodSummary]) -> Self {
        Self {
            scenario: outcome.scenario.clone(),
            solved: outcome.is_solved(),
            unsolved_periods: outcome.unsolved_periods.clone(),
            unsolved_years: outcome
                .unsolved_periods
                .iter()
                .map(|&p| time.year_for_period(p))
                .collect(),
            periods: summaries.iter().map(PeriodReport::from).collect(),
        }
    }
}

/// Full per-period series of one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct TrajectoryReport {
    pub region: String,
    pub years: Vec<i32>,
    pub population: Vec<f64>,
    pub labor_force: Vec<f64>,
    pub labor_productivity_growth: Vec<f64>,
    pub gdp: Vec<f64>,
    pub gdp_not_adjusted: Vec<f64>,
    pub gdp_per_cap: Vec<f64>,
    pub ppp_gdp_per_cap: Vec<f64>,
    pub best_scaled_gdp_per_cap: Vec<f64>,
}

impl TrajectoryReport {
    pub fn from_region(region: &Region, time: &ModelTime) -> Self {
        let gdp = &region.gdp;
        let periods = 0..time.max_period();
        let collect = |f: &dyn Fn(Period) -> f64| periods.clone().map(f).collect::<Vec<_>>();

        Self {
            region: region.name.clone(),
            years: time.years().to_vec(),
            population: region.population.clone(),
            labor_force: collect(&|p| gdp.labor_force(p)),
            labor_productivity_growth: collect(&|p| gdp.labor_productivity_growth(p)),
            gdp: collect(&|p| gdp.gdp(p)),
            gdp_not_adjusted: collect(&|p| gdp.gdp_not_adjusted(p)),
            gdp_per_cap: collect(&|p| gdp.gdp_per_cap(p)),
            ppp_gdp_per_cap: collect(&|p| gdp.ppp_gdp_per_cap(p)),
            best_scaled_gdp_per_cap: collect(&|p| gdp.best_scaled_gdp_per_cap(p)),
        }
    }
}
