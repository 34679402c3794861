// Outcome type for numerically risky computations.
//
// Logarithms, power-law conversions and elasticity feedback either compute
// normally or fall back to a safe default. Callers can tell the two apart.

use thiserror::Error;

use crate::types::Period;

/// Why a computation fell back to its default value.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum NumericFault {
    #[error("energy-adjusted GDP {value} in period {period} is not a finite non-negative number")]
    InvalidAdjustment { period: Period, value: f64 },

    #[error(
        "PPP convergence exponent is undefined (conversion factor {conversion_factor}, GDP per capita {gdp_per_capita})"
    )]
    InvalidExponent {
        conversion_factor: f64,
        gdp_per_capita: f64,
    },

    #[error("no PPP convergence exponent is available for period {period}")]
    ExponentUnavailable { period: Period },

    #[error("GDP per capita {value} in period {period} is not positive")]
    NonPositiveGdpPerCapita { period: Period, value: f64 },

    #[error("PPP/MER conversion {value} in period {period} is not a finite number")]
    InvalidConversion { period: Period, value: f64 },
}

/// Result of a computation that recovers from domain errors locally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Computed {
    Normal(f64),
    Defaulted { value: f64, fault: NumericFault },
}

impl Computed {
    pub fn value(&self) -> f64 {
        match self {
            Computed::Normal(value) => *value,
            Computed::Defaulted { value, .. } => *value,
        }
    }

    pub fn is_defaulted(&self) -> bool {
        matches!(self, Computed::Defaulted { .. })
    }

    pub fn fault(&self) -> Option<NumericFault> {
        match self {
            Computed::Normal(_) => None,
            Computed::Defaulted { fault, .. } => Some(*fault),
        }
    }

    /// Apply `f` to the value, keeping the fault if there was one.
    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
        match self {
            Computed::Normal(value) => Computed::Normal(f(value)),
            Computed::Defaulted { value, fault } => Computed::Defaulted {
                value: f(value),
                fault,
            },
        }
    }
}

/// Neither NaN nor infinite.
pub fn is_valid_number(value: f64) -> bool {
    value.is_finite()
}
