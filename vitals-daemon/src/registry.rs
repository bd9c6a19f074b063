//! Name-keyed input/output registry.
//!
//! Instantiates the `[input.<kind>]` and `[output.<kind>]` blocks of the
//! config document. Each block may be a single table or an array of tables
//! and may carry a `filter` subtable applied at routing time. Unknown kinds
//! fail fast at load.

use crate::inputs;
use crate::outputs::ndjson::{NdjsonConfig, NdjsonOutput};
use crate::outputs::svg::{SvgConfig, SvgOutput};
use std::time::Duration;
use vitals_core::config::duration_str;
use vitals_core::{
    Collector, ExportOutput, Filter, FilteredInput, Input, Result, VitalsError,
};

/// Registered input kinds, in sample-config order.
pub const INPUT_KINDS: &[&str] =
    &["cpu", "disk", "diskio", "httpstat", "load", "mem", "net", "netstat", "proc"];

/// Registered output kinds.
pub const OUTPUT_KINDS: &[&str] = &["ndjson", "svg"];

/// An exporter-driven output waiting to be wired to an [`vitals_core::Exporter`].
pub struct ExportSpec {
    pub output: Box<dyn ExportOutput>,
    pub interval: Duration,
    pub filter: Option<Filter>,
}

impl std::fmt::Debug for ExportSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportSpec")
            .field("interval", &self.interval)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

fn decode<T: serde::de::DeserializeOwned>(kind: &str, section: &toml::Value) -> Result<T> {
    section.clone().try_into().map_err(|e| VitalsError::InvalidConfig {
        reason: format!("bad [{kind}] block: {e}"),
    })
}

fn build_input(kind: &str, section: &toml::Value) -> Result<Box<dyn Input>> {
    let input: Box<dyn Input> = match kind {
        "cpu" => Box::new(decode::<inputs::Cpu>(kind, section)?),
        "disk" => Box::new(decode::<inputs::Disk>(kind, section)?),
        "diskio" => Box::new(decode::<inputs::DiskIo>(kind, section)?),
        "httpstat" => Box::new(decode::<inputs::HttpStat>(kind, section)?),
        "load" => Box::new(decode::<inputs::Load>(kind, section)?),
        "mem" => Box::new(decode::<inputs::Memory>(kind, section)?),
        "net" => Box::new(decode::<inputs::Net>(kind, section)?),
        "netstat" => Box::new(decode::<inputs::NetStat>(kind, section)?),
        "proc" => Box::new(decode::<inputs::ProcSelf>(kind, section)?),
        _ => return Err(VitalsError::UnknownInput { kind: kind.to_string() }),
    };
    Ok(input)
}

/// Compile the optional `filter` subtable of an input/output block.
fn section_filter(section: &toml::Value) -> Result<Option<Filter>> {
    let Some(filter) = section.get("filter") else {
        return Ok(None);
    };
    let list = |key: &str| -> Vec<String> {
        filter
            .get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()
            })
            .unwrap_or_default()
    };
    let includes = list("includes");
    let excludes = list("excludes");
    if includes.is_empty() && excludes.is_empty() {
        return Ok(None);
    }
    Filter::compile_include_exclude(&includes, &excludes, Some(':')).map(Some)
}

/// Flatten a block into its sections: a bare table is one section, an array
/// of tables is several.
fn sections(value: &toml::Value) -> Vec<&toml::Value> {
    match value {
        toml::Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// Instantiate every configured input and output block onto the collector.
/// Returns the instantiated input kinds and the exporter-driven outputs.
pub async fn load(content: &str, collector: &Collector) -> Result<(Vec<String>, Vec<ExportSpec>)> {
    let doc: toml::Value = toml::from_str(content)
        .map_err(|e| VitalsError::InvalidConfig { reason: e.to_string() })?;
    let mut instantiated = Vec::new();
    let mut exports = Vec::new();

    if let Some(toml::Value::Table(inputs)) = doc.get("input") {
        for (kind, block) in inputs {
            for section in sections(block) {
                let input = build_input(kind, section)?;
                let input: Box<dyn Input> = match section_filter(section)? {
                    Some(filter) => Box::new(FilteredInput { filter, input }),
                    None => input,
                };
                collector.add_input(kind.clone(), input).await?;
                instantiated.push(kind.clone());
            }
        }
    }

    if let Some(toml::Value::Table(outputs)) = doc.get("output") {
        for (kind, block) in outputs {
            for section in sections(block) {
                let filter = section_filter(section)?;
                match kind.as_str() {
                    "ndjson" => {
                        let config: NdjsonConfig = decode(kind, section)?;
                        collector.add_output(Box::new(NdjsonOutput::new(config)), filter).await;
                    }
                    "svg" => {
                        let config: SvgConfig = decode(kind, section)?;
                        if config.dest_dir.is_empty() {
                            return Err(VitalsError::InvalidConfig {
                                reason: "[output.svg] requires dest_dir".to_string(),
                            });
                        }
                        let interval = duration_str::parse(&config.interval)
                            .map_err(|reason| VitalsError::InvalidConfig { reason })?;
                        exports.push(ExportSpec {
                            output: Box::new(SvgOutput::new(&config.dest_dir)),
                            interval,
                            filter,
                        });
                    }
                    other => {
                        return Err(VitalsError::UnknownOutput { kind: other.to_string() })
                    }
                }
            }
        }
    }

    Ok((instantiated, exports))
}

/// Sample config blocks of every registered input and output, for
/// `--gen-config`.
pub fn sample_configs() -> Vec<&'static str> {
    let mut samples = Vec::new();
    for kind in INPUT_KINDS {
        let input = match build_input(kind, &toml::Value::Table(toml::map::Map::new())) {
            Ok(input) => input,
            Err(_) => continue,
        };
        samples.push(input.sample_config());
    }
    samples.push(NdjsonOutput::sample_config());
    samples.push(SvgOutput::sample_config());
    samples
}
