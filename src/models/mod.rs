//! Data models for dberd.
//!
//! This module re-exports all model types used throughout the application.

pub mod schema;
pub mod source;
pub mod target;

pub use schema::{Column, Reference, Schema, Table, TableColumn};
pub use source::{SourceConfig, SourceConfigError, SourceKind};
pub use target::{FormattedSchema, TargetCapabilities, TargetKind};
