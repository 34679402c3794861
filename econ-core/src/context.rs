use crate::market::Marketplace;
use crate::time::ModelTime;

/// Run-wide state shared by the economy, the solver and the scenario loop.
///
/// Passed explicitly to every component that needs the period grid or the
/// markets.
#[derive(Debug, Clone)]
pub struct SimContext {
    pub time: ModelTime,
    pub marketplace: Marketplace,
}

impl SimContext {
    pub fn new(time: ModelTime) -> Self {
        let marketplace = Marketplace::new(time.max_period());
        Self { time, marketplace }
    }

    pub fn max_period(&self) -> usize {
        self.time.max_period()
    }
}
