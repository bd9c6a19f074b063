//! Built-in outputs: NDJSON records per closed bin and SVG sparkline files
//! per exported snapshot.

pub mod ndjson;
pub mod svg;

pub use ndjson::NdjsonOutput;
pub use svg::SvgOutput;
