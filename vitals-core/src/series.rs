//! Series identity.

use crate::error::{Result, VitalsError};
use std::time::Duration;

/// Immutable descriptor of one time-series resolution: a slug id, a display
/// title, the bin period and the retained bin count. Used as the storage key
/// and the dashboard label for every ring created at this resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesId {
    id: String,
    title: String,
    period: Duration,
    max_count: usize,
}

impl SeriesId {
    /// Create a series id, validating its invariants: `id` must be a
    /// non-empty slug (`[A-Za-z0-9_-]`), `period` at least one second and
    /// `max_count` at least 2.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        period: Duration,
        max_count: usize,
    ) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(VitalsError::InvalidSeriesId { id });
        }
        if period < Duration::from_secs(1) {
            return Err(VitalsError::PeriodTooSmall(period));
        }
        if max_count < 2 {
            return Err(VitalsError::CountTooSmall(max_count));
        }
        Ok(Self { id, title: title.into(), period, max_count })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn period_ms(&self) -> i64 {
        self.period.as_millis() as i64
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    /// Retention horizon persisted storage keeps for this series.
    pub fn retention(&self) -> Duration {
        self.period * (self.max_count as u32 + 1)
    }
}

impl std::fmt::Display for SeriesId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}
