use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ppp::PppExponent;
use crate::numeric::{Computed, NumericFault, is_valid_number};
use crate::time::{BASE_PERIOD, ModelTime, TimeError};
use crate::types::Period;

/// Year from which PPP conversion data exist.
pub const DEFAULT_PPP_BASE_YEAR: i32 = 1990;
/// Last historical year; energy feedback only applies after it.
pub const DEFAULT_ADJUSTMENT_BEGIN_YEAR: i32 = 1990;

// === CONFIG ===

/// Calendar anchors for PPP convergence and energy feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationYears {
    /// Year in which the PPP convergence exponent is derived.
    pub ppp_base_year: i32,
    /// Periods up to and including this year are historical and never energy-adjusted.
    pub adjustment_begin_year: i32,
}

impl Default for CalibrationYears {
    fn default() -> Self {
        Self {
            ppp_base_year: DEFAULT_PPP_BASE_YEAR,
            adjustment_begin_year: DEFAULT_ADJUSTMENT_BEGIN_YEAR,
        }
    }
}

/// Per-region GDP inputs, one entry per period in each series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GdpConfig {
    pub base_gdp: f64,
    pub energy_gdp_elasticity: f64,
    /// PPP/MER ratio in the base PPP year. Values below 1 disable conversion.
    pub ppp_conversion_factor: f64,
    /// Hold the conversion factor constant instead of converging.
    pub const_ratio: bool,
    /// Annual labor productivity growth rate per period.
    pub labor_productivity: Vec<f64>,
    /// Fraction of population in the labor force per period.
    pub labor_force_participation: Vec<f64>,
}

impl Default for GdpConfig {
    fn default() -> Self {
        Self {
            base_gdp: 0.0,
            energy_gdp_elasticity: 0.0,
            ppp_conversion_factor: 1.0,
            const_ratio: false,
            labor_productivity: Vec::new(),
            labor_force_participation: Vec::new(),
        }
    }
}

impl GdpConfig {
    /// Constant growth and participation over `max_period` periods.
    pub fn constant(max_period: usize, base_gdp: f64, growth: f64, participation: f64) -> Self {
        Self {
            base_gdp,
            labor_productivity: vec![growth; max_period],
            labor_force_participation: vec![participation; max_period],
            ..Default::default()
        }
    }

    pub fn with_elasticity(mut self, elasticity: f64) -> Self {
        self.energy_gdp_elasticity = elasticity;
        self
    }

    pub fn with_ppp_conversion(mut self, factor: f64, const_ratio: bool) -> Self {
        self.ppp_conversion_factor = factor;
        self.const_ratio = const_ratio;
        self
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum GdpError {
    #[error("{series} has {actual} entries, expected one per period ({expected})")]
    SeriesLength {
        series: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("population must be positive in period {period}, got {population}")]
    NonPositivePopulation { period: Period, population: f64 },

    #[error("labor force participation must be positive in period {period}, got {participation}")]
    NonPositiveParticipation { period: Period, participation: f64 },

    #[error("labor force for period {period} has not been computed")]
    MissingLaborForce { period: Period },

    #[error(transparent)]
    Time(#[from] TimeError),
}

// === TRAJECTORY ===

/// Multi-period economic state of one region.
///
/// "Approximate" values are computed before the current period's energy
/// feedback, from the previous period's adjusted GDP. "Adjusted" values include
/// the feedback and are only meaningful once the period's adjusted flag is set.
/// "Not adjusted" snapshots are taken once at setup and never change.
#[derive(Debug, Clone)]
pub struct GdpTrajectory {
    pub(super) base_gdp: f64,
    pub(super) energy_gdp_elasticity: f64,
    pub(super) ppp_conversion_factor: f64,
    pub(super) const_ratio: bool,
    pub(super) ppp_exponent: PppExponent,
    pub(super) ppp_base_period: Period,
    /// Last historical period.
    pub(super) adjustment_period: Period,

    pub(super) labor_prod_growth_rate: Vec<f64>,
    pub(super) labor_force_participation: Vec<f64>,
    pub(super) labor_force: Vec<f64>,
    pub(super) gdp_value: Vec<f64>,
    pub(super) gdp_per_capita: Vec<f64>,
    pub(super) gdp_value_adjusted: Vec<f64>,
    pub(super) gdp_per_capita_adjusted: Vec<f64>,
    pub(super) gdp_per_capita_adjusted_ppp: Vec<f64>,
    pub(super) gdp_per_capita_approx_ppp: Vec<f64>,
    pub(super) gdp_value_not_adjusted: Vec<f64>,
    pub(super) gdp_per_capita_not_adjusted: Vec<f64>,
    pub(super) gdp_adjusted_flag: Vec<bool>,
}

fn check_len(series: &'static str, values: &[f64], expected: usize) -> Result<(), GdpError> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(GdpError::SeriesLength {
            series,
            expected,
            actual: values.len(),
        })
    }
}

impl GdpTrajectory {
    pub fn new(
        config: &GdpConfig,
        time: &ModelTime,
        years: CalibrationYears,
    ) -> Result<Self, GdpError> {
        let max_period = time.max_period();
        check_len("labor_productivity", &config.labor_productivity, max_period)?;
        check_len(
            "labor_force_participation",
            &config.labor_force_participation,
            max_period,
        )?;

        let ppp_base_period = time.period_for_year(years.ppp_base_year)?;
        let adjustment_period = time.period_for_year(years.adjustment_begin_year)?;

        Ok(Self {
            base_gdp: config.base_gdp,
            energy_gdp_elasticity: config.energy_gdp_elasticity,
            ppp_conversion_factor: config.ppp_conversion_factor,
            const_ratio: config.const_ratio,
            ppp_exponent: PppExponent::Pending,
            ppp_base_period,
            adjustment_period,
            labor_prod_growth_rate: config.labor_productivity.clone(),
            labor_force_participation: config.labor_force_participation.clone(),
            labor_force: vec![0.0; max_period],
            gdp_value: vec![0.0; max_period],
            gdp_per_capita: vec![0.0; max_period],
            gdp_value_adjusted: vec![0.0; max_period],
            gdp_per_capita_adjusted: vec![0.0; max_period],
            gdp_per_capita_adjusted_ppp: vec![0.0; max_period],
            gdp_per_capita_approx_ppp: vec![0.0; max_period],
            gdp_value_not_adjusted: vec![0.0; max_period],
            gdp_per_capita_not_adjusted: vec![0.0; max_period],
            gdp_adjusted_flag: vec![false; max_period],
        })
    }

    pub fn max_period(&self) -> usize {
        self.gdp_value.len()
    }

    fn check_period(&self, period: Period) -> Result<(), GdpError> {
        if period < self.max_period() {
            Ok(())
        } else {
            Err(TimeError::PeriodOutOfRange {
                period,
                max_period: self.max_period(),
            }
            .into())
        }
    }

    // === SETUP ===

    /// Labor force and unadjusted GDP for every period, plus the stable
    /// "not adjusted" snapshots.
    pub fn init_data(&mut self, time: &ModelTime, populations: &[f64]) -> Result<(), GdpError> {
        check_len("population", populations, self.max_period())?;

        for (period, &population) in populations.iter().enumerate() {
            self.compute_labor_force(period, population)?;
            self.initial_gdp_calc(time, period, population)?;
            self.gdp_value_not_adjusted[period] = self.gdp_value[period];
            self.gdp_per_capita_not_adjusted[period] = self.gdp_value[period] / population;
        }
        Ok(())
    }

    /// `labor_force[p] = population * participation[p]`.
    pub fn compute_labor_force(&mut self, period: Period, population: f64) -> Result<f64, GdpError> {
        self.check_period(period)?;
        // Negated comparisons also reject NaN.
        if !(population > 0.0) {
            return Err(GdpError::NonPositivePopulation { period, population });
        }
        let participation = self.labor_force_participation[period];
        if !(participation > 0.0) {
            return Err(GdpError::NonPositiveParticipation {
                period,
                participation,
            });
        }

        let labor_force = population * participation;
        self.labor_force[period] = labor_force;
        Ok(labor_force)
    }

    // === PER-PERIOD CALCULATION ===

    /// GDP before this period's energy feedback.
    ///
    /// The base period takes the configured base GDP. Later periods compound
    /// labor productivity over the period's timestep and scale by labor force
    /// growth, starting from the previous period's adjusted GDP. Adjusted values
    /// are set to the approximation as placeholders until `adjust_gdp` runs.
    pub fn initial_gdp_calc(
        &mut self,
        time: &ModelTime,
        period: Period,
        population: f64,
    ) -> Result<(), GdpError> {
        self.check_period(period)?;
        if !(population > 0.0) {
            return Err(GdpError::NonPositivePopulation { period, population });
        }

        let gdp = if period == BASE_PERIOD {
            self.base_gdp
        } else {
            let current_lf = self.labor_force[period];
            let last_lf = self.labor_force[period - 1];
            if !(last_lf > 0.0) {
                return Err(GdpError::MissingLaborForce { period: period - 1 });
            }
            if !(current_lf > 0.0) {
                return Err(GdpError::MissingLaborForce { period });
            }
            let tlab = self.total_labor_productivity(time, period);
            let gdp = self.gdp_value_adjusted[period - 1] * tlab * (current_lf / last_lf);
            if gdp == 0.0 {
                tracing::error!(
                    target: "gdp",
                    period,
                    current_lf,
                    last_lf,
                    tlab,
                    "GDP is zero in initial calculation"
                );
            }
            gdp
        };

        // Historical periods are never energy-adjusted.
        self.gdp_adjusted_flag[period] = period <= self.adjustment_period;

        self.gdp_value[period] = gdp;
        self.gdp_value_adjusted[period] = gdp;

        let per_capita = gdp / population;
        self.gdp_per_capita[period] = per_capita;
        self.gdp_per_capita_adjusted[period] = per_capita;
        self.gdp_per_capita_adjusted_ppp[period] = per_capita;
        self.gdp_per_capita_approx_ppp[period] =
            self.calculate_ppp_per_cap(period, per_capita).value();

        Ok(())
    }

    /// Apply energy price feedback `gdp * price_ratio^elasticity`, then derive
    /// exact PPP-based GDP per capita.
    ///
    /// Only periods after the last historical period are adjusted. An invalid
    /// result (NaN, infinite or negative) is discarded and the unadjusted GDP is
    /// kept. PPP per capita is refreshed for every period.
    ///
    /// Panics if `period` is outside the horizon.
    pub fn adjust_gdp(&mut self, period: Period, price_ratio: f64) -> Computed {
        let mut outcome = Computed::Normal(self.gdp_value_adjusted[period]);

        if period > self.adjustment_period {
            let gdp = self.gdp_value[period];
            let adjusted = gdp * price_ratio.powf(self.energy_gdp_elasticity);

            outcome = if is_valid_number(adjusted) && adjusted >= 0.0 {
                Computed::Normal(adjusted)
            } else {
                tracing::error!(
                    target: "gdp",
                    period,
                    price_ratio,
                    elasticity = self.energy_gdp_elasticity,
                    adjusted,
                    "invalid energy-adjusted GDP, keeping unadjusted value"
                );
                Computed::Defaulted {
                    value: gdp,
                    fault: NumericFault::InvalidAdjustment {
                        period,
                        value: adjusted,
                    },
                }
            };

            let adjusted = outcome.value();
            self.gdp_value_adjusted[period] = adjusted;
            self.gdp_per_capita_adjusted[period] = if gdp != 0.0 {
                self.gdp_per_capita[period] * adjusted / gdp
            } else {
                self.gdp_per_capita[period]
            };
            self.gdp_adjusted_flag[period] = true;
        }

        let per_capita = self.gdp_per_capita_adjusted[period];
        self.gdp_per_capita_adjusted_ppp[period] =
            self.calculate_ppp_per_cap(period, per_capita).value();

        outcome
    }

    // === INPUT ACCESSORS ===

    pub fn base_gdp(&self) -> f64 {
        self.base_gdp
    }

    pub fn energy_gdp_elasticity(&self) -> f64 {
        self.energy_gdp_elasticity
    }

    pub fn ppp_conversion_factor(&self) -> f64 {
        self.ppp_conversion_factor
    }

    pub fn is_const_ratio(&self) -> bool {
        self.const_ratio
    }

    pub fn labor_productivity_growth(&self, period: Period) -> f64 {
        self.labor_prod_growth_rate[period]
    }

    pub fn labor_force_participation(&self, period: Period) -> f64 {
        self.labor_force_participation[period]
    }

    pub fn labor_force(&self, period: Period) -> f64 {
        self.labor_force[period]
    }

    /// Productivity factor over the step into `period`: `(1 + g)^timestep`.
    pub fn total_labor_productivity(&self, time: &ModelTime, period: Period) -> f64 {
        let timestep = time.timestep_years(period) as i32;
        (1.0 + self.labor_prod_growth_rate[period]).powi(timestep)
    }

    pub fn is_adjusted(&self, period: Period) -> bool {
        self.gdp_adjusted_flag[period]
    }

    // === APPROXIMATE VALUES ===
    //
    // Usable before energy prices are known.

    pub fn approx_gdp(&self, period: Period) -> f64 {
        self.gdp_value[period]
    }

    pub fn approx_gdp_per_cap(&self, period: Period) -> f64 {
        self.gdp_per_capita[period]
    }

    pub fn approx_ppp_per_cap(&self, period: Period) -> f64 {
        self.gdp_per_capita_approx_ppp[period]
    }

    pub fn approx_scaled_gdp(&self, period: Period) -> f64 {
        scaled(self.gdp_value[period], self.gdp_value[BASE_PERIOD])
    }

    pub fn approx_scaled_gdp_per_cap(&self, period: Period) -> f64 {
        scaled(
            self.gdp_per_capita[period],
            self.gdp_per_capita[BASE_PERIOD],
        )
    }

    /// GDP without any energy price adjustment, fixed at setup.
    pub fn gdp_not_adjusted(&self, period: Period) -> f64 {
        self.gdp_value_not_adjusted[period]
    }

    pub fn gdp_per_capita_not_adjusted(&self, period: Period) -> f64 {
        self.gdp_per_capita_not_adjusted[period]
    }

    // === ADJUSTED VALUES ===
    //
    // Requesting these before `adjust_gdp` ran for the period logs a warning and
    // returns the placeholder (approximate) value.

    fn warn_if_stale(&self, period: Period, accessor: &'static str) {
        if !self.gdp_adjusted_flag[period] {
            tracing::warn!(
                target: "gdp",
                period,
                accessor,
                "adjusted GDP requested before it was calculated"
            );
        }
    }

    /// Market-exchange-rate GDP including energy feedback.
    pub fn gdp(&self, period: Period) -> f64 {
        self.warn_if_stale(period, "gdp");
        self.gdp_value_adjusted[period]
    }

    pub fn gdp_per_cap(&self, period: Period) -> f64 {
        self.warn_if_stale(period, "gdp_per_cap");
        self.gdp_per_capita_adjusted[period]
    }

    pub fn ppp_gdp_per_cap(&self, period: Period) -> f64 {
        self.warn_if_stale(period, "ppp_gdp_per_cap");
        self.gdp_per_capita_adjusted_ppp[period]
    }

    pub fn scaled_gdp_per_cap(&self, period: Period) -> f64 {
        self.warn_if_stale(period, "scaled_gdp_per_cap");
        scaled(
            self.gdp_per_capita_adjusted[period],
            self.gdp_per_capita_adjusted[BASE_PERIOD],
        )
    }

    /// Adjusted scaled GDP per capita if available, else the approximation.
    pub fn best_scaled_gdp_per_cap(&self, period: Period) -> f64 {
        if !self.gdp_adjusted_flag[period] {
            return self.approx_scaled_gdp_per_cap(period);
        }
        self.scaled_gdp_per_cap(period)
    }
}

/// Ratio to a base-period value; 0 if the base is not positive.
fn scaled(value: f64, base: f64) -> f64 {
    if base > 0.0 {
        value / base
    } else {
        tracing::warn!(target: "gdp", value, base, "base-period value is not positive, cannot scale");
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn five_year_time() -> ModelTime {
        ModelTime::from_years(&[1990, 1995, 2000, 2005]).unwrap()
    }

    fn trajectory(config: &GdpConfig, time: &ModelTime) -> GdpTrajectory {
        GdpTrajectory::new(config, time, CalibrationYears::default()).unwrap()
    }

    #[test]
    fn test_labor_force_is_population_times_participation() {
        let time = five_year_time();
        let mut gdp = trajectory(&GdpConfig::constant(4, 1000.0, 0.02, 0.45), &time);

        let lf = gdp.compute_labor_force(2, 200.0).unwrap();
        assert_eq!(lf, 200.0 * 0.45);
        assert_eq!(gdp.labor_force(2), 90.0);
    }

    #[test]
    fn test_labor_force_rejects_non_positive_inputs() {
        let time = five_year_time();
        let mut config = GdpConfig::constant(4, 1000.0, 0.02, 0.5);
        config.labor_force_participation[3] = 0.0;
        let mut gdp = trajectory(&config, &time);

        assert_eq!(
            gdp.compute_labor_force(1, 0.0),
            Err(GdpError::NonPositivePopulation {
                period: 1,
                population: 0.0
            })
        );
        assert_eq!(
            gdp.compute_labor_force(3, 10.0),
            Err(GdpError::NonPositiveParticipation {
                period: 3,
                participation: 0.0
            })
        );
        assert!(matches!(
            gdp.compute_labor_force(4, 10.0),
            Err(GdpError::Time(TimeError::PeriodOutOfRange { period: 4, .. }))
        ));
    }

    #[test]
    fn test_initial_gdp_compounds_over_timestep() {
        let time = ModelTime::from_years(&[1990, 1995]).unwrap();
        let mut gdp = trajectory(&GdpConfig::constant(2, 1000.0, 0.02, 0.5), &time);
        gdp.init_data(&time, &[100.0, 102.0]).unwrap();

        let expected = 1000.0 * 1.02f64.powi(5) * 1.02;
        assert!((gdp.approx_gdp(1) - expected).abs() < 1e-9);
        assert!((gdp.approx_gdp(1) - 1126.2).abs() < 0.1);
        assert_eq!(gdp.approx_gdp(0), 1000.0);
    }

    #[test]
    fn test_historical_periods_are_flagged_adjusted() {
        let time = ModelTime::from_years(&[1975, 1990, 2005, 2020]).unwrap();
        let mut gdp = trajectory(&GdpConfig::constant(4, 500.0, 0.01, 0.5), &time);
        gdp.init_data(&time, &[10.0; 4]).unwrap();

        assert!(gdp.is_adjusted(0));
        assert!(gdp.is_adjusted(1), "adjustment begin year itself is historical");
        assert!(!gdp.is_adjusted(2));
        assert!(!gdp.is_adjusted(3));
    }

    #[test]
    fn test_adjust_gdp_applies_elasticity() {
        let time = five_year_time();
        let config = GdpConfig::constant(4, 1000.0, 0.0, 0.5).with_elasticity(-0.5);
        let mut gdp = trajectory(&config, &time);
        gdp.init_data(&time, &[100.0; 4]).unwrap();

        let outcome = gdp.adjust_gdp(1, 4.0);
        assert_eq!(outcome, Computed::Normal(500.0));
        assert_eq!(gdp.gdp(1), 500.0);
        assert_eq!(gdp.gdp_per_cap(1), 5.0);
        assert_eq!(gdp.approx_gdp(1), 1000.0, "approximation untouched");
        assert!(gdp.is_adjusted(1));
    }

    #[test]
    fn test_adjust_gdp_skips_historical_periods() {
        let time = five_year_time();
        let config = GdpConfig::constant(4, 1000.0, 0.0, 0.5).with_elasticity(-0.5);
        let mut gdp = trajectory(&config, &time);
        gdp.init_data(&time, &[100.0; 4]).unwrap();

        gdp.adjust_gdp(0, 4.0);
        assert_eq!(gdp.gdp(0), 1000.0);
    }

    #[test]
    fn test_invalid_adjustment_keeps_unadjusted_value() {
        let time = five_year_time();
        let config = GdpConfig::constant(4, 1000.0, 0.0, 0.5).with_elasticity(0.5);
        let mut gdp = trajectory(&config, &time);
        gdp.init_data(&time, &[100.0; 4]).unwrap();

        let outcome = gdp.adjust_gdp(2, -1.0);
        assert!(outcome.is_defaulted());
        assert!(matches!(
            outcome.fault(),
            Some(NumericFault::InvalidAdjustment { period: 2, .. })
        ));
        assert_eq!(gdp.gdp(2), gdp.approx_gdp(2));
        assert!(gdp.gdp_per_cap(2).is_finite());
        assert!(gdp.ppp_gdp_per_cap(2).is_finite());
    }

    #[test]
    fn test_not_adjusted_snapshot_is_stable() {
        let time = five_year_time();
        let config = GdpConfig::constant(4, 1000.0, 0.02, 0.5).with_elasticity(-1.0);
        let mut gdp = trajectory(&config, &time);
        gdp.init_data(&time, &[100.0; 4]).unwrap();
        let snapshot = gdp.gdp_not_adjusted(2);

        gdp.adjust_gdp(1, 2.0);
        gdp.initial_gdp_calc(&time, 2, 100.0).unwrap();

        assert!(gdp.approx_gdp(2) < snapshot, "feedback lowered the approximation");
        assert_eq!(gdp.gdp_not_adjusted(2), snapshot);
        assert_eq!(gdp.gdp_per_capita_not_adjusted(2), snapshot / 100.0);
    }

    #[test]
    fn test_best_scaled_falls_back_to_approximation() {
        let time = five_year_time();
        let config = GdpConfig::constant(4, 1000.0, 0.02, 0.5).with_elasticity(-1.0);
        let mut gdp = trajectory(&config, &time);
        gdp.init_data(&time, &[100.0; 4]).unwrap();

        assert_eq!(gdp.best_scaled_gdp_per_cap(2), gdp.approx_scaled_gdp_per_cap(2));

        gdp.adjust_gdp(2, 2.0);
        assert_eq!(gdp.best_scaled_gdp_per_cap(2), gdp.scaled_gdp_per_cap(2));
        assert!(gdp.best_scaled_gdp_per_cap(2) < gdp.approx_scaled_gdp_per_cap(2));
    }

    #[test]
    fn test_series_length_is_validated() {
        let time = five_year_time();
        let config = GdpConfig::constant(3, 1000.0, 0.02, 0.5);
        assert_eq!(
            GdpTrajectory::new(&config, &time, CalibrationYears::default()).unwrap_err(),
            GdpError::SeriesLength {
                series: "labor_productivity",
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn test_calibration_years_must_be_boundaries() {
        let time = ModelTime::from_years(&[2000, 2010]).unwrap();
        let config = GdpConfig::constant(2, 1000.0, 0.02, 0.5);
        assert_eq!(
            GdpTrajectory::new(&config, &time, CalibrationYears::default()).unwrap_err(),
            GdpError::Time(TimeError::UnknownYear { year: 1990 })
        );
    }

    #[test]
    fn test_scaled_values_with_zero_base() {
        let time = five_year_time();
        let mut gdp = trajectory(&GdpConfig::constant(4, 0.0, 0.02, 0.5), &time);
        gdp.init_data(&time, &[100.0; 4]).unwrap();

        assert_eq!(gdp.approx_scaled_gdp(2), 0.0);
        assert_eq!(gdp.approx_gdp(2), 0.0);
    }
}
