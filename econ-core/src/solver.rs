// Equilibrium solver interface and a reference bisection solver

use serde::{Deserialize, Serialize};

use crate::context::SimContext;
use crate::types::{MarketKey, Period};
use crate::world::Economy;

/// Result of solving one period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolveOutcome {
    Converged {
        iterations: usize,
    },
    Diverged {
        iterations: usize,
        worst_market: MarketKey,
        worst_relative_excess: f64,
    },
}

impl SolveOutcome {
    pub fn is_solved(&self) -> bool {
        matches!(self, SolveOutcome::Converged { .. })
    }
}

/// Drives every market marked to solve in `period` toward zero excess demand.
///
/// Implementations set trial prices in `ctx.marketplace` and re-run
/// `economy.calc` to observe supplies and demands. The state left behind when
/// `solve` returns is what the period finalizes with, converged or not.
pub trait Solver {
    fn solve(&mut self, ctx: &mut SimContext, economy: &mut dyn Economy, period: Period) -> SolveOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Largest accepted |excess demand / demand|.
    pub tolerance: f64,
    /// Evaluations per market per sweep, bracketing included.
    pub max_iterations: usize,
    /// Passes over all markets.
    pub max_sweeps: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 60,
            max_sweeps: 8,
        }
    }
}

// === BISECTION ===

/// One-market-at-a-time bisection on price, repeated in sweeps until all
/// markets clear together.
///
/// Assumes excess demand falls as price rises, which holds for the GDP
/// calibration market: a higher productivity factor raises supplied GDP
/// against a fixed target.
#[derive(Debug, Clone, Default)]
pub struct BisectionSolver {
    config: SolverConfig,
}

impl BisectionSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Set a trial price and re-run the economy. Returns relative excess demand.
    fn evaluate(
        ctx: &mut SimContext,
        economy: &mut dyn Economy,
        key: MarketKey,
        period: Period,
        price: f64,
    ) -> f64 {
        ctx.marketplace.set_price(key, period, price);
        ctx.marketplace.null_supplies_and_demands(period);
        economy.calc(ctx, period);
        ctx.marketplace
            .market(key)
            .map_or(0.0, |m| m.relative_excess_demand(period))
    }

    /// Clear one market. Returns the evaluations spent.
    fn solve_market(
        &self,
        ctx: &mut SimContext,
        economy: &mut dyn Economy,
        key: MarketKey,
        period: Period,
    ) -> usize {
        let tolerance = self.config.tolerance;
        let budget = self.config.max_iterations.max(1);

        let start = match ctx.marketplace.price(key, period) {
            Some(p) if p > 0.0 && p.is_finite() => p,
            _ => 1.0,
        };
        let mut evaluations = 1;
        let start_excess = Self::evaluate(ctx, economy, key, period, start);
        if start_excess.abs() < tolerance {
            return evaluations;
        }

        // Bracket: excess demand positive at `lo`, non-positive at `hi`.
        let (mut lo, mut hi) = (start, start);
        if start_excess > 0.0 {
            loop {
                hi *= 2.0;
                evaluations += 1;
                if Self::evaluate(ctx, economy, key, period, hi) <= 0.0 {
                    break;
                }
                lo = hi;
                if evaluations >= budget {
                    return evaluations;
                }
            }
        } else {
            loop {
                lo /= 2.0;
                evaluations += 1;
                if Self::evaluate(ctx, economy, key, period, lo) > 0.0 {
                    break;
                }
                hi = lo;
                if evaluations >= budget {
                    return evaluations;
                }
            }
        }

        while evaluations < budget {
            let mid = 0.5 * (lo + hi);
            evaluations += 1;
            let excess = Self::evaluate(ctx, economy, key, period, mid);
            if excess.abs() < tolerance {
                return evaluations;
            }
            if excess > 0.0 {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        // Budget spent: settle on the bracket midpoint so state matches the price.
        Self::evaluate(ctx, economy, key, period, 0.5 * (lo + hi));
        evaluations + 1
    }

    fn worst_market(ctx: &SimContext, keys: &[MarketKey], period: Period) -> Option<(MarketKey, f64)> {
        keys.iter()
            .filter_map(|&key| {
                ctx.marketplace
                    .market(key)
                    .map(|m| (key, m.relative_excess_demand(period)))
            })
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
    }
}

impl Solver for BisectionSolver {
    fn solve(&mut self, ctx: &mut SimContext, economy: &mut dyn Economy, period: Period) -> SolveOutcome {
        let keys = ctx.marketplace.markets_to_solve(period);
        if keys.is_empty() {
            return SolveOutcome::Converged { iterations: 0 };
        }

        let mut iterations = 0;
        for sweep in 0..self.config.max_sweeps.max(1) {
            for &key in &keys {
                iterations += self.solve_market(ctx, economy, key, period);
            }

            // Re-evaluate at the final prices so every market sees the same state.
            ctx.marketplace.null_supplies_and_demands(period);
            economy.calc(ctx, period);

            match Self::worst_market(ctx, &keys, period) {
                Some((_, excess)) if !(excess.abs() < self.config.tolerance) => {
                    tracing::debug!(target: "solver", period, sweep, worst_relative_excess = excess, "sweep did not clear all markets");
                }
                _ => {
                    tracing::debug!(target: "solver", period, sweep, iterations, "period solved");
                    return SolveOutcome::Converged { iterations };
                }
            }
        }

        match Self::worst_market(ctx, &keys, period) {
            Some((worst_market, worst_relative_excess)) => {
                tracing::warn!(
                    target: "solver",
                    period,
                    iterations,
                    market = %worst_market,
                    worst_relative_excess,
                    "solver did not converge"
                );
                SolveOutcome::Diverged {
                    iterations,
                    worst_market,
                    worst_relative_excess,
                }
            }
            None => SolveOutcome::Converged { iterations },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdp::{CalibrationYears, GdpConfig, GdpTrajectory};
    use crate::time::ModelTime;
    use crate::world::{Region, World};

    fn calibrated_world(target: f64) -> (SimContext, World, crate::types::RegionId) {
        let mut ctx = SimContext::new(ModelTime::from_years(&[1990, 1995, 2000]).unwrap());
        let gdp = GdpTrajectory::new(
            &GdpConfig::constant(3, 1000.0, 0.02, 0.5),
            &ctx.time,
            CalibrationYears::default(),
        )
        .unwrap();
        let mut world = World::new();
        let id = world
            .add_region(
                Region::new("USA", vec![100.0; 3], gdp).with_calibration_gdps(vec![0.0, target, 0.0]),
            )
            .unwrap();
        world.complete_init(&mut ctx).unwrap();
        (ctx, world, id)
    }

    #[test]
    fn test_nothing_to_solve_converges() {
        let (mut ctx, mut world, _) = calibrated_world(0.0);
        let outcome = BisectionSolver::default().solve(&mut ctx, &mut world, 1);
        assert_eq!(outcome, SolveOutcome::Converged { iterations: 0 });
    }

    #[test]
    fn test_calibrates_growth_to_target() {
        let (mut ctx, mut world, id) = calibrated_world(1200.0);
        world.init_calc(&mut ctx, 1);
        world.calc(&mut ctx, 1);

        let outcome = BisectionSolver::default().solve(&mut ctx, &mut world, 1);
        assert!(outcome.is_solved(), "{outcome:?}");

        let gdp = &world.get_region(id).unwrap().gdp;
        assert!((gdp.gdp(1) - 1200.0).abs() / 1200.0 < 1e-5);
        let implied = 1.2f64.powf(1.0 / 5.0) - 1.0;
        assert!((gdp.labor_productivity_growth(1) - implied).abs() < 1e-5);
    }

    #[test]
    fn test_tiny_budget_reports_worst_market() {
        let (mut ctx, mut world, id) = calibrated_world(5000.0);
        let mut solver = BisectionSolver::new(SolverConfig {
            tolerance: 1e-9,
            max_iterations: 2,
            max_sweeps: 1,
        });

        match solver.solve(&mut ctx, &mut world, 1) {
            SolveOutcome::Diverged { worst_market, .. } => {
                assert_eq!(worst_market, MarketKey::gdp(id));
            }
            other => panic!("expected divergence, got {other:?}"),
        }
    }
}
