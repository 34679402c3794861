// Regional GDP trajectory engine
//
// Module structure:
// - trajectory   Per-period series, labor force, initial GDP, energy feedback, accessors
// - ppp          PPP/MER conversion with logarithmic convergence
// - calibration  Round trip of labor productivity through a calibration market

pub mod calibration;
pub mod ppp;
pub mod trajectory;

pub use calibration::MIN_GROWTH_RATE;
pub use ppp::{PPP_CROSSOVER_POINT, PppExponent};
pub use trajectory::{CalibrationYears, GdpConfig, GdpError, GdpTrajectory};
