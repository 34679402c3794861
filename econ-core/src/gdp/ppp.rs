// PPP/MER convergence: the purchasing-power conversion factor shrinks toward 1
// as market GDP per capita grows toward the crossover point.

use super::trajectory::GdpTrajectory;
use crate::numeric::{Computed, NumericFault, is_valid_number};
use crate::types::Period;

/// GDP per capita (thousand base-year dollars) at which PPP and MER valuations meet.
pub const PPP_CROSSOVER_POINT: f64 = 15.0;

/// State of the convergence exponent over a run.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PppExponent {
    /// Base PPP period not reached yet.
    #[default]
    Pending,
    Derived(f64),
    /// Derivation produced a non-finite exponent. Later periods use a ratio of 1.
    Failed,
}

impl PppExponent {
    pub fn value(self) -> Option<f64> {
        match self {
            PppExponent::Derived(delta) => Some(delta),
            _ => None,
        }
    }
}

impl GdpTrajectory {
    /// PPP/MER conversion factor for `market_gdp_per_cap` in `period`.
    ///
    /// The configured factor is returned unchanged when the ratio is frozen,
    /// before the base PPP period, or when the factor is below 1. In the base
    /// PPP period the exponent `ln(factor) / ln(x / 15)` is derived and cached;
    /// later periods reuse it. Above the crossover point the ratio is 1.
    ///
    /// A base-period GDP per capita that is not positive, or that sits exactly
    /// on the crossover point, leaves the exponent undefined and the ratio
    /// defaults to 1 for the rest of the run.
    pub fn ppp_mer_ratio(&mut self, period: Period, market_gdp_per_cap: f64) -> Computed {
        let factor = self.ppp_conversion_factor;
        if self.const_ratio || period < self.ppp_base_period || factor < 1.0 {
            return Computed::Normal(factor);
        }

        let relative = market_gdp_per_cap / PPP_CROSSOVER_POINT;

        if period == self.ppp_base_period {
            // ln(x / 15) must be defined and non-zero.
            let delta = if relative > 0.0 && relative.is_finite() && relative != 1.0 {
                factor.ln() / relative.ln()
            } else {
                f64::NAN
            };
            self.ppp_exponent = if is_valid_number(delta) {
                tracing::debug!(target: "ppp", period, factor, market_gdp_per_cap, delta, "derived PPP convergence exponent");
                PppExponent::Derived(delta)
            } else {
                tracing::error!(
                    target: "ppp",
                    period,
                    factor,
                    market_gdp_per_cap,
                    "cannot derive PPP convergence exponent, conversion defaults to 1"
                );
                PppExponent::Failed
            };
        }

        if market_gdp_per_cap >= PPP_CROSSOVER_POINT {
            return Computed::Normal(1.0);
        }

        match self.ppp_exponent {
            PppExponent::Derived(_) if !(market_gdp_per_cap > 0.0) => {
                tracing::error!(target: "ppp", period, market_gdp_per_cap, "GDP per capita is not positive, using PPP/MER ratio of 1");
                Computed::Defaulted {
                    value: 1.0,
                    fault: NumericFault::NonPositiveGdpPerCapita {
                        period,
                        value: market_gdp_per_cap,
                    },
                }
            }
            PppExponent::Derived(delta) => {
                let ratio = relative.powf(delta);
                if is_valid_number(ratio) {
                    Computed::Normal(ratio)
                } else {
                    tracing::error!(target: "ppp", period, market_gdp_per_cap, delta, "invalid PPP/MER ratio, using 1");
                    Computed::Defaulted {
                        value: 1.0,
                        fault: NumericFault::InvalidConversion {
                            period,
                            value: ratio,
                        },
                    }
                }
            }
            PppExponent::Failed => Computed::Defaulted {
                value: 1.0,
                fault: NumericFault::InvalidExponent {
                    conversion_factor: factor,
                    gdp_per_capita: market_gdp_per_cap,
                },
            },
            PppExponent::Pending => {
                tracing::warn!(target: "ppp", period, "PPP exponent requested before the base PPP period was calculated");
                Computed::Defaulted {
                    value: 1.0,
                    fault: NumericFault::ExponentUnavailable { period },
                }
            }
        }
    }

    /// PPP-based GDP per capita: `ppp_mer_ratio × market GDP per capita`.
    pub fn calculate_ppp_per_cap(&mut self, period: Period, market_gdp_per_cap: f64) -> Computed {
        self.ppp_mer_ratio(period, market_gdp_per_cap)
            .map(|ratio| ratio * market_gdp_per_cap)
    }

    pub fn ppp_exponent(&self) -> PppExponent {
        self.ppp_exponent
    }
}
