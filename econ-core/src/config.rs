// JSON scenario configuration and conversion into a runnable Scenario

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gdp::{CalibrationYears, GdpConfig, GdpError, GdpTrajectory};
use crate::scenario::Scenario;
use crate::solver::{BisectionSolver, SolverConfig};
use crate::time::{ModelTime, ModelTimeConfig, TimeError};
use crate::world::{Region, World};

pub const BUILTIN_REFERENCE_SCENARIO: &str = include_str!("data/reference_scenario.json");

/// Values keyed by calendar year. Every key must be a period boundary.
pub type YearSeries = BTreeMap<i32, f64>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse scenario: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read scenario file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("region {region}: {source}")]
    Series {
        region: String,
        #[source]
        source: TimeError,
    },

    #[error(transparent)]
    Time(#[from] TimeError),

    #[error("duplicate region name: {name}")]
    DuplicateRegion { name: String },

    #[error("region {region}: {source}")]
    Gdp {
        region: String,
        #[source]
        source: GdpError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub model_time: ModelTimeConfig,
    #[serde(default)]
    pub calibration_years: CalibrationYears,
    #[serde(default)]
    pub solver: SolverConfig,
    /// Absent world data aborts the run at init.
    #[serde(default)]
    pub world: Option<WorldConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorldConfig {
    pub regions: Vec<RegionConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub name: String,
    pub population: YearSeries,
    pub gdp: GdpInput,
    #[serde(default)]
    pub calibration_gdp: YearSeries,
    /// Periods not listed use a ratio of 1.
    #[serde(default)]
    pub energy_price_ratio: YearSeries,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GdpInput {
    pub base_gdp: f64,
    #[serde(default)]
    pub energy_gdp_elasticity: f64,
    #[serde(default)]
    pub ppp_conversion: PppConversion,
    pub labor_productivity: YearSeries,
    pub labor_force_participation: YearSeries,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PppConversion {
    pub factor: f64,
    pub const_ratio: bool,
}

impl Default for PppConversion {
    fn default() -> Self {
        Self {
            factor: 1.0,
            const_ratio: false,
        }
    }
}

/// Expand a year-keyed series onto the period grid, filling gaps with `missing`.
pub fn expand_series(series: &YearSeries, time: &ModelTime, missing: f64) -> Result<Vec<f64>, TimeError> {
    let mut values = vec![missing; time.max_period()];
    for (&year, &value) in series {
        values[time.period_for_year(year)?] = value;
    }
    Ok(values)
}

impl ScenarioConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: ScenarioConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_json_str(BUILTIN_REFERENCE_SCENARIO)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let Some(world) = &self.world else {
            return Ok(());
        };
        let mut seen = HashSet::new();
        for region in &world.regions {
            if !seen.insert(region.name.as_str()) {
                return Err(ConfigError::DuplicateRegion {
                    name: region.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn model_time(&self) -> Result<ModelTime, ConfigError> {
        Ok(ModelTime::new(&self.model_time)?)
    }

    /// Build the world and wire up a bisection solver.
    pub fn into_scenario(self) -> Result<Scenario<World>, ConfigError> {
        let time = self.model_time()?;
        let world = match &self.world {
            Some(world) => Some(world.build(&time, self.calibration_years)?),
            None => None,
        };

        let mut scenario = Scenario::new(self.name, time, world)
            .with_solver(BisectionSolver::new(self.solver));
        if let Some(summary) = self.summary {
            scenario = scenario.with_summary(summary);
        }
        Ok(scenario)
    }
}

impl WorldConfig {
    pub fn build(&self, time: &ModelTime, years: CalibrationYears) -> Result<World, ConfigError> {
        let mut world = World::new();
        for region in &self.regions {
            let built = region.build(time, years)?;
            world.add_region(built).map_err(|source| ConfigError::Gdp {
                region: region.name.clone(),
                source,
            })?;
        }
        Ok(world)
    }
}

impl RegionConfig {
    fn build(&self, time: &ModelTime, years: CalibrationYears) -> Result<Region, ConfigError> {
        let series = |values: &YearSeries, missing: f64| {
            expand_series(values, time, missing).map_err(|source| ConfigError::Series {
                region: self.name.clone(),
                source,
            })
        };

        let gdp_config = GdpConfig {
            base_gdp: self.gdp.base_gdp,
            energy_gdp_elasticity: self.gdp.energy_gdp_elasticity,
            ppp_conversion_factor: self.gdp.ppp_conversion.factor,
            const_ratio: self.gdp.ppp_conversion.const_ratio,
            labor_productivity: series(&self.gdp.labor_productivity, 0.0)?,
            labor_force_participation: series(&self.gdp.labor_force_participation, 0.0)?,
        };
        let gdp = GdpTrajectory::new(&gdp_config, time, years).map_err(|source| ConfigError::Gdp {
            region: self.name.clone(),
            source,
        })?;

        Ok(Region::new(&self.name, series(&self.population, 0.0)?, gdp)
            .with_calibration_gdps(series(&self.calibration_gdp, 0.0)?)
            .with_energy_price_ratio(series(&self.energy_price_ratio, 1.0)?))
    }
}
