// Model time: period <-> calendar year mapping and per-period timesteps

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Period;

/// First model period. Calibration base values (base GDP, scaled indices) refer to it.
pub const BASE_PERIOD: Period = 0;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TimeError {
    #[error("model time needs at least one segment")]
    NoSegments,

    #[error("timestep must be positive (segment ending {end_year})")]
    ZeroTimestep { end_year: i32 },

    #[error("period boundary {year} does not come after {previous}")]
    NonIncreasingYear { previous: i32, year: i32 },

    #[error("year {year} is not a model period boundary")]
    UnknownYear { year: i32 },

    #[error("span from {from} to {to} with timestep {timestep} does not fit the calendar")]
    SpanOverflow { from: i32, to: i32, timestep: u32 },

    #[error("period {period} is outside the model horizon (max period {max_period})")]
    PeriodOutOfRange { period: Period, max_period: usize },
}

/// A run of periods sharing one timestep, ending at `end_year`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSegment {
    pub end_year: i32,
    pub timestep: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTimeConfig {
    pub start_year: i32,
    pub segments: Vec<TimeSegment>,
}

/// Bidirectional year/period index.
///
/// Periods may span unequal numbers of years. `timestep_years(p)` is the number
/// of calendar years covered by the transition into `p`; annual rates are
/// compounded over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTime {
    period_to_year: Vec<i32>,
    period_to_timestep: Vec<u32>,
    year_to_period: BTreeMap<i32, Period>,
}

impl ModelTime {
    /// Build the period grid from a start year and consecutive segments.
    ///
    /// When a segment's span is not a multiple of its timestep, a shorter
    /// remainder period closes the segment so its end year is always a boundary.
    /// Period 0 carries the first segment's timestep.
    pub fn new(config: &ModelTimeConfig) -> Result<Self, TimeError> {
        let first = config.segments.first().ok_or(TimeError::NoSegments)?;
        if first.timestep == 0 {
            return Err(TimeError::ZeroTimestep {
                end_year: first.end_year,
            });
        }

        let mut years = vec![config.start_year];
        let mut steps = vec![first.timestep];
        let mut cursor = config.start_year;

        for segment in &config.segments {
            if segment.timestep == 0 {
                return Err(TimeError::ZeroTimestep {
                    end_year: segment.end_year,
                });
            }
            if segment.end_year <= cursor {
                return Err(TimeError::NonIncreasingYear {
                    previous: cursor,
                    year: segment.end_year,
                });
            }
            let overflow = TimeError::SpanOverflow {
                from: cursor,
                to: segment.end_year,
                timestep: segment.timestep,
            };
            let timestep = i32::try_from(segment.timestep).map_err(|_| overflow.clone())?;
            while cursor < segment.end_year {
                let remaining = segment
                    .end_year
                    .checked_sub(cursor)
                    .ok_or_else(|| overflow.clone())?;
                let step = timestep.min(remaining);
                cursor += step;
                years.push(cursor);
                steps.push(step.unsigned_abs());
            }
        }

        Ok(Self::from_parts(years, steps))
    }

    /// Build from explicit period boundary years.
    ///
    /// Timesteps are the gaps between consecutive years; period 0 reuses the
    /// first gap (or 1 for a single-period horizon).
    pub fn from_years(years: &[i32]) -> Result<Self, TimeError> {
        if years.is_empty() {
            return Err(TimeError::NoSegments);
        }
        let mut steps = Vec::with_capacity(years.len());
        for pair in years.windows(2) {
            if pair[1] <= pair[0] {
                return Err(TimeError::NonIncreasingYear {
                    previous: pair[0],
                    year: pair[1],
                });
            }
            let gap = i64::from(pair[1]) - i64::from(pair[0]);
            let step = u32::try_from(gap).map_err(|_| TimeError::SpanOverflow {
                from: pair[0],
                to: pair[1],
                timestep: u32::MAX,
            })?;
            steps.push(step);
        }
        let first_step = steps.first().copied().unwrap_or(1);
        steps.insert(0, first_step);

        Ok(Self::from_parts(years.to_vec(), steps))
    }

    fn from_parts(period_to_year: Vec<i32>, period_to_timestep: Vec<u32>) -> Self {
        let year_to_period = period_to_year
            .iter()
            .enumerate()
            .map(|(period, year)| (*year, period))
            .collect();
        Self {
            period_to_year,
            period_to_timestep,
            year_to_period,
        }
    }

    pub fn max_period(&self) -> usize {
        self.period_to_year.len()
    }

    pub fn start_year(&self) -> i32 {
        self.period_to_year[BASE_PERIOD]
    }

    pub fn end_year(&self) -> i32 {
        self.period_to_year[self.max_period() - 1]
    }

    pub fn base_period(&self) -> Period {
        BASE_PERIOD
    }

    pub fn years(&self) -> &[i32] {
        &self.period_to_year
    }

    /// Period whose boundary is `year`.
    pub fn period_for_year(&self, year: i32) -> Result<Period, TimeError> {
        self.year_to_period
            .get(&year)
            .copied()
            .ok_or(TimeError::UnknownYear { year })
    }

    /// Calendar year of `period`. Panics outside `[0, max_period)`.
    pub fn year_for_period(&self, period: Period) -> i32 {
        self.period_to_year[period]
    }

    /// Years spanned by the step into `period`. Panics outside `[0, max_period)`.
    pub fn timestep_years(&self, period: Period) -> u32 {
        self.period_to_timestep[period]
    }

    pub fn check_period(&self, period: Period) -> Result<(), TimeError> {
        if period < self.max_period() {
            Ok(())
        } else {
            Err(TimeError::PeriodOutOfRange {
                period,
                max_period: self.max_period(),
            })
        }
    }
}
