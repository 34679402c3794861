// Scenario: owns the run context, the economy and the solver, and steps
// through model periods.

use thiserror::Error;

use crate::context::SimContext;
use crate::gdp::GdpError;
use crate::solver::{BisectionSolver, SolveOutcome, Solver};
use crate::time::ModelTime;
use crate::types::Period;
use crate::world::{Economy, RegionSummary, World};

pub const DEFAULT_SCENARIO_NAME: &str = "NoScenarioName";

#[derive(Debug, Error, PartialEq)]
pub enum ScenarioError {
    #[error("scenario has no world")]
    NoWorld,

    #[error("world has no regions")]
    NoRegions,

    #[error("scenario {scenario} has already been run")]
    AlreadyRun { scenario: String },

    #[error(transparent)]
    Economy(#[from] GdpError),
}

/// Summary of everything that happened in one period.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodSummary {
    pub period: Period,
    pub year: i32,
    pub solved: bool,
    pub regions: Vec<RegionSummary>,
}

/// Run-level outcome: success iff no period failed to solve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub scenario: String,
    pub periods: usize,
    pub unsolved_periods: Vec<Period>,
}

impl RunOutcome {
    pub fn is_solved(&self) -> bool {
        self.unsolved_periods.is_empty()
    }
}

pub struct Scenario<E: Economy = World> {
    name: String,
    summary: Option<String>,
    ctx: SimContext,
    economy: Option<E>,
    solver: Box<dyn Solver>,
    unsolved_periods: Vec<Period>,
    summaries: Vec<PeriodSummary>,
    initialized: bool,
    run_completed: bool,
}

impl<E: Economy> Scenario<E> {
    /// An empty name is replaced by [`DEFAULT_SCENARIO_NAME`] at `complete_init`.
    pub fn new(name: impl Into<String>, time: ModelTime, economy: Option<E>) -> Self {
        Self {
            name: name.into(),
            summary: None,
            ctx: SimContext::new(time),
            economy,
            solver: Box::new(BisectionSolver::default()),
            unsolved_periods: Vec::new(),
            summaries: Vec::new(),
            initialized: false,
            run_completed: false,
        }
    }

    pub fn with_solver(mut self, solver: impl Solver + 'static) -> Self {
        self.solver = Box::new(solver);
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn context(&self) -> &SimContext {
        &self.ctx
    }

    pub fn time(&self) -> &ModelTime {
        &self.ctx.time
    }

    pub fn economy(&self) -> Option<&E> {
        self.economy.as_ref()
    }

    pub fn economy_mut(&mut self) -> Option<&mut E> {
        self.economy.as_mut()
    }

    pub fn unsolved_periods(&self) -> &[Period] {
        &self.unsolved_periods
    }

    pub fn period_summaries(&self) -> &[PeriodSummary] {
        &self.summaries
    }

    /// Set once the final period has been finalized.
    pub fn run_completed(&self) -> bool {
        self.run_completed
    }

    /// Finish setup before the loop. Missing world data is fatal.
    pub fn complete_init(&mut self) -> Result<(), ScenarioError> {
        if self.name.is_empty() {
            tracing::warn!(target: "scenario", "no scenario name was set, using default");
            self.name = DEFAULT_SCENARIO_NAME.to_string();
        }

        let Some(economy) = self.economy.as_mut() else {
            tracing::error!(target: "scenario", scenario = %self.name, "no world was configured");
            return Err(ScenarioError::NoWorld);
        };
        economy.complete_init(&mut self.ctx)?;

        self.initialized = true;
        Ok(())
    }

    /// Run every period in order. Periods that fail to solve are recorded and
    /// the loop carries on from their unconverged state.
    ///
    /// A scenario runs once. Its economy carries solved prices and written-back
    /// growth rates afterwards, so a second call is refused.
    pub fn run(&mut self) -> Result<RunOutcome, ScenarioError> {
        if self.run_completed {
            tracing::error!(target: "scenario", scenario = %self.name, "scenario has already been run");
            return Err(ScenarioError::AlreadyRun {
                scenario: self.name.clone(),
            });
        }
        if !self.initialized {
            self.complete_init()?;
        }
        let economy = self.economy.as_mut().ok_or(ScenarioError::NoWorld)?;

        self.ctx.marketplace.init_prices();

        let max_period = self.ctx.max_period();
        tracing::info!(target: "scenario", scenario = %self.name, max_period, "starting run");

        for period in 0..max_period {
            let year = self.ctx.time.year_for_period(period);
            tracing::info!(target: "scenario", period, year, "period start");

            self.ctx.marketplace.null_supplies_and_demands(period);
            self.ctx.marketplace.init_to_last(period);
            economy.init_calc(&mut self.ctx, period);
            // No prior period exists; drop anything init_calc published.
            if period == 0 {
                self.ctx.marketplace.null_supplies_and_demands(period);
            }
            economy.calc(&mut self.ctx, period);

            let outcome = self.solver.solve(&mut self.ctx, economy, period);
            let solved = outcome.is_solved();
            if let SolveOutcome::Diverged {
                worst_market,
                worst_relative_excess,
                ..
            } = outcome
            {
                tracing::warn!(
                    target: "scenario",
                    period,
                    year,
                    market = %worst_market,
                    worst_relative_excess,
                    "model did not solve period"
                );
                self.unsolved_periods.push(period);
            }

            economy.finalize_period(&mut self.ctx, period);
            let regions = economy.update_summary(&self.ctx, period);

            #[cfg(feature = "instrument")]
            for row in &regions {
                tracing::info!(
                    target: "period_summary",
                    scenario = %self.name,
                    period,
                    year,
                    solved,
                    region = %row.region,
                    population = row.population,
                    labor_force = row.labor_force,
                    labor_productivity_growth = row.labor_productivity_growth,
                    energy_price_ratio = row.energy_price_ratio,
                    gdp = row.gdp,
                    gdp_not_adjusted = row.gdp_not_adjusted,
                    gdp_per_cap = row.gdp_per_cap,
                    ppp_gdp_per_cap = row.ppp_gdp_per_cap,
                );
            }

            self.summaries.push(PeriodSummary {
                period,
                year,
                solved,
                regions,
            });
        }

        self.run_completed = true;

        if self.unsolved_periods.is_empty() {
            tracing::info!(target: "scenario", scenario = %self.name, "all model periods solved correctly");
        } else {
            let years: Vec<i32> = self
                .unsolved_periods
                .iter()
                .map(|&p| self.ctx.time.year_for_period(p))
                .collect();
            tracing::warn!(
                target: "scenario",
                scenario = %self.name,
                unsolved_periods = ?self.unsolved_periods,
                unsolved_years = ?years,
                "model did not solve all periods"
            );
        }

        Ok(RunOutcome {
            scenario: self.name.clone(),
            periods: max_period,
            unsolved_periods: self.unsolved_periods.clone(),
        })
    }
}
