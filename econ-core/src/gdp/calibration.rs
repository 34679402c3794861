// GDP calibration round trip through the marketplace.
//
// The compounded labor productivity factor of each period is published as the
// price of a calibration market. Where a GDP target exists the market gets a
// fixed demand, the solver adjusts the price until modeled GDP meets it, and the
// solved price is written back as a growth rate.

use super::trajectory::{GdpError, GdpTrajectory};
use crate::market::{MarketType, Marketplace};
use crate::time::{BASE_PERIOD, ModelTime};
use crate::types::{MarketKey, Period, RegionId};

/// Lowest annual growth rate written back from a solved price. Rates at or
/// below -1 would make the productivity factor undefined.
pub const MIN_GROWTH_RATE: f64 = -0.99;

impl GdpTrajectory {
    /// Register the region's GDP calibration market and its targets.
    ///
    /// `targets` holds one GDP target per period; zero or negative entries mean
    /// "not calibrated". A non-zero base-period target replaces the configured
    /// base GDP, so this must run before `init_data`.
    pub fn setup_calibration_markets(
        &mut self,
        time: &ModelTime,
        marketplace: &mut Marketplace,
        region: RegionId,
        region_name: &str,
        targets: &[f64],
    ) -> Result<(), GdpError> {
        if targets.len() != self.max_period() {
            return Err(GdpError::SeriesLength {
                series: "calibration_gdp",
                expected: self.max_period(),
                actual: targets.len(),
            });
        }

        // Targets are registered once, when the market is created.
        let key = MarketKey::gdp(region);
        if marketplace.create_market(key, MarketType::Calibration) {
            let factors: Vec<f64> = (0..self.max_period())
                .map(|period| self.total_labor_productivity(time, period))
                .collect();
            marketplace.set_price_vector(key, &factors);

            for (period, &target) in targets.iter().enumerate().skip(1) {
                if target > 0.0 {
                    marketplace.add_to_demand(key, target, period);
                    marketplace.set_market_to_solve(key, period);
                    tracing::debug!(target: "calibration", region = region_name, period, target, "GDP calibration target set");
                }
            }
        }

        let base_target = targets[BASE_PERIOD];
        if base_target != 0.0 {
            if self.base_gdp != 0.0 && self.base_gdp != base_target {
                tracing::info!(
                    target: "calibration",
                    region = region_name,
                    configured = self.base_gdp,
                    calibrated = base_target,
                    "base GDP overwritten with calibration value"
                );
            }
            self.base_gdp = base_target;
        }

        Ok(())
    }

    /// Turn the solved calibration price for `period` back into an annual
    /// growth rate: `price^(1 / timestep) - 1`, floored at [`MIN_GROWTH_RATE`].
    ///
    /// Returns the rate written, or `None` if the region has no GDP market.
    pub fn write_back_calibrated_values(
        &mut self,
        time: &ModelTime,
        marketplace: &Marketplace,
        region: RegionId,
        period: Period,
    ) -> Option<f64> {
        let total_labor_prod = marketplace.price(MarketKey::gdp(region), period)?;
        let timestep = f64::from(time.timestep_years(period));

        let mut rate = total_labor_prod.powf(1.0 / timestep) - 1.0;
        if !rate.is_finite() || rate <= -1.0 {
            tracing::error!(
                target: "calibration",
                period,
                rate,
                price = total_labor_prod,
                "labor productivity growth rate reset to floor"
            );
            rate = MIN_GROWTH_RATE;
        }

        self.labor_prod_growth_rate[period] = rate;
        Some(rate)
    }
}
