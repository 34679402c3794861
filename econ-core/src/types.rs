use std::fmt;

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

// ============================================================================
// IDs
// ============================================================================

/// Index into the model's period grid, `0..max_period`.
pub type Period = usize;

new_key_type! {
    pub struct RegionId;
}

/// Trait for converting SlotMap keys to u64 for the WASM boundary and logs
pub trait KeyToU64 {
    fn to_u64(self) -> u64;
}

impl KeyToU64 for RegionId {
    fn to_u64(self) -> u64 {
        self.0.as_ffi()
    }
}

// ============================================================================
// Market registry keys
// ============================================================================

/// What a region-scoped market trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarketKind {
    /// GDP calibration constraint: price is the compounded labor productivity factor.
    Gdp,
}

impl MarketKind {
    pub fn good_name(self) -> &'static str {
        match self {
            MarketKind::Gdp => "GDP",
        }
    }
}

/// Typed registry entry for a market: one per (region, kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarketKey {
    pub region: RegionId,
    pub kind: MarketKind,
}

impl MarketKey {
    pub fn new(region: RegionId, kind: MarketKind) -> Self {
        Self { region, kind }
    }

    pub fn gdp(region: RegionId) -> Self {
        Self::new(region, MarketKind::Gdp)
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind.good_name(), self.region.to_u64())
    }
}
