//! dberd library
//!
//! Extracts the structure of a relational database (tables, columns, primary
//! keys and foreign-key references) into a canonical schema model, normalizes
//! it into a deterministic order, and turns it into JSON, D2, Mermaid or
//! PlantUML, optionally rendering the D2 output to SVG.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod source;
pub mod target;

pub use config::Config;
pub use error::{DberdError, DberdResult};
pub use models::{Schema, TargetKind};
pub use pipeline::{Context, Pipeline};
