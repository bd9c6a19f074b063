//! Input contract and the per-tick gather buffer.

use crate::error::Result;
use crate::filter::Filter;
use crate::kind::MetricType;
use async_trait::async_trait;

/// One field produced by an input during a tick.
#[derive(Debug, Clone)]
pub struct FieldSample {
    /// Hierarchical name without the collector prefix, e.g. `cpu:percent`.
    pub name: String,
    pub value: f64,
    pub metric_type: MetricType,
}

/// The ephemeral buffer an input fills during one tick. Gathers are owned by
/// the sampler until pushed onto the collector channel, then exclusively by
/// the dispatcher.
#[derive(Debug, Default)]
pub struct Gather {
    /// Label of the producing input, used for routing diagnostics.
    pub input: String,
    /// Sample timestamp, unix milliseconds.
    pub time_ms: i64,
    pub fields: Vec<FieldSample>,
    pub errors: Vec<String>,
}

impl Gather {
    pub fn new(input: impl Into<String>, time_ms: i64) -> Self {
        Self { input: input.into(), time_ms, fields: Vec::new(), errors: Vec::new() }
    }

    /// Record one field sample.
    pub fn add(&mut self, name: impl Into<String>, value: f64, metric_type: MetricType) {
        self.fields.push(FieldSample { name: name.into(), value, metric_type });
    }

    /// Record a non-fatal error encountered while collecting.
    pub fn add_error(&mut self, err: impl std::fmt::Display) {
        self.errors.push(err.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.errors.is_empty()
    }
}

/// A pluggable measurement source.
///
/// `gather` is called exactly once per tick and should honor the sampling
/// interval as a best-effort deadline; a slow input delays only its own
/// collector tick, which is then dropped rather than replayed.
#[async_trait]
pub trait Input: Send {
    /// Collect the current readings into the gather buffer.
    async fn gather(&mut self, g: &mut Gather) -> Result<()>;

    /// One-time setup before the first gather. Registration fails when this
    /// returns an error.
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Teardown on collector stop.
    fn deinit(&mut self) {}

    /// TOML fragment describing this input for generated config dumps.
    fn sample_config(&self) -> &'static str {
        ""
    }
}

/// Wraps an input and keeps only the fields matching its filter.
pub struct FilteredInput<I> {
    pub filter: Filter,
    pub input: I,
}

#[async_trait]
impl<I: Input> Input for FilteredInput<I> {
    async fn gather(&mut self, g: &mut Gather) -> Result<()> {
        self.input.gather(g).await?;
        g.fields.retain(|f| self.filter.matches(&f.name));
        Ok(())
    }

    fn init(&mut self) -> Result<()> {
        self.input.init()
    }

    fn deinit(&mut self) {
        self.input.deinit()
    }

    fn sample_config(&self) -> &'static str {
        self.input.sample_config()
    }
}

#[async_trait]
impl Input for Box<dyn Input> {
    async fn gather(&mut self, g: &mut Gather) -> Result<()> {
        (**self).gather(g).await
    }

    fn init(&mut self) -> Result<()> {
        (**self).init()
    }

    fn deinit(&mut self) {
        (**self).deinit()
    }

    fn sample_config(&self) -> &'static str {
        (**self).sample_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::Unit;

    struct Fake;

    #[async_trait]
    impl Input for Fake {
        async fn gather(&mut self, g: &mut Gather) -> Result<()> {
            g.add("cpu:user", 1.0, MetricType::Gauge(Unit::Percent));
            g.add("cpu:idle", 99.0, MetricType::Gauge(Unit::Percent));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_filtered_input_drops_excluded_fields() {
        let filter = Filter::compile_include_exclude(&["cpu:*"], &["cpu:idle"], Some(':')).unwrap();
        let mut input = FilteredInput { filter, input: Fake };
        let mut g = Gather::new("cpu", 0);
        input.gather(&mut g).await.unwrap();
        assert_eq!(g.fields.len(), 1);
        assert_eq!(g.fields[0].name, "cpu:user");
    }
}
