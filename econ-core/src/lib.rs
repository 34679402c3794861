use wasm_bindgen::prelude::*;

pub mod config;
pub mod context;
pub mod gdp;
pub mod market;
pub mod numeric;
pub mod report;
pub mod scenario;
pub mod solver;
pub mod time;
pub mod types;
pub mod world;

pub use config::{ConfigError, ScenarioConfig};
pub use context::SimContext;
pub use gdp::{CalibrationYears, GdpConfig, GdpError, GdpTrajectory, PppExponent};
pub use market::{Market, MarketType, Marketplace};
pub use numeric::{Computed, NumericFault};
pub use report::{PeriodReport, RunReport, TrajectoryReport};
pub use scenario::{PeriodSummary, RunOutcome, Scenario, ScenarioError};
pub use solver::{BisectionSolver, SolveOutcome, Solver, SolverConfig};
pub use time::{ModelTime, ModelTimeConfig, TimeError, TimeSegment};
pub use types::*;
pub use world::{Economy, Region, RegionSummary, World};

#[cfg(feature = "instrument")]
pub use instrument;

// ============================================================================
// WASM API - Simulation
// ============================================================================

fn js_error(err: impl std::fmt::Display) -> JsValue {
    js_sys::Error::new(&err.to_string()).into()
}

#[wasm_bindgen]
pub struct Simulation {
    scenario: Scenario<World>,
    outcome: Option<RunOutcome>,
}

#[wasm_bindgen]
impl Simulation {
    /// Build a simulation from a JSON scenario document.
    #[wasm_bindgen(constructor)]
    pub fn new(json: &str) -> Result<Simulation, JsValue> {
        // Better panic messages in browser console
        console_error_panic_hook::set_once();
        Self::from_json(json).map_err(js_error)
    }

    /// The bundled three-region reference scenario.
    #[wasm_bindgen]
    pub fn with_reference_scenario() -> Result<Simulation, JsValue> {
        console_error_panic_hook::set_once();
        Self::from_config(ScenarioConfig::builtin().map_err(js_error)?).map_err(js_error)
    }

    /// Run every period and return the run report.
    #[wasm_bindgen]
    pub fn run(&mut self) -> Result<RunReport, JsValue> {
        self.run_native().map_err(js_error)
    }

    /// Per-period series of one region, or an error if the region is unknown.
    #[wasm_bindgen]
    pub fn trajectory(&self, region: &str) -> Result<JsValue, JsValue> {
        let report = self
            .trajectory_report(region)
            .ok_or_else(|| js_error(format!("unknown region: {region}")))?;
        serde_wasm_bindgen::to_value(&report).map_err(js_error)
    }

    #[wasm_bindgen]
    pub fn years(&self) -> Vec<i32> {
        self.scenario.time().years().to_vec()
    }

    #[wasm_bindgen]
    pub fn region_names(&self) -> Vec<String> {
        self.scenario
            .economy()
            .map(|world| world.regions.values().map(|r| r.name.clone()).collect())
            .unwrap_or_default()
    }

    #[wasm_bindgen]
    pub fn scenario_name(&self) -> String {
        self.scenario.name().to_string()
    }
}

// Native entry points, shared with the WASM wrappers above.
impl Simulation {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Self::from_config(ScenarioConfig::from_json_str(json)?)
    }

    pub fn from_config(config: ScenarioConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            scenario: config.into_scenario()?,
            outcome: None,
        })
    }

    pub fn run_native(&mut self) -> Result<RunReport, ScenarioError> {
        let outcome = self.scenario.run()?;
        let report = RunReport::new(
            &outcome,
            self.scenario.time(),
            self.scenario.period_summaries(),
        );
        self.outcome = Some(outcome);
        Ok(report)
    }

    pub fn trajectory_report(&self, region: &str) -> Option<TrajectoryReport> {
        let (_, region) = self.scenario.economy()?.region_by_name(region)?;
        Some(TrajectoryReport::from_region(region, self.scenario.time()))
    }

    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }

    pub fn scenario(&self) -> &Scenario<World> {
        &self.scenario
    }
}
