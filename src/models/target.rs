//! Target-related data models.
//!
//! This module defines the type tags of the output formats and the artifacts
//! passed between the formatting and rendering steps.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Canonical JSON form
    Json,
    /// D2 diagram script
    D2,
    /// Mermaid `erDiagram`
    Mermaid,
    /// PlantUML entity diagram
    #[value(name = "plantuml")]
    PlantUml,
}

impl TargetKind {
    pub const ALL: [TargetKind; 4] = [Self::Json, Self::D2, Self::Mermaid, Self::PlantUml];

    /// The short type tag, e.g. `d2`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::D2 => "d2",
            Self::Mermaid => "mermaid",
            Self::PlantUml => "plantuml",
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lower)
            .ok_or_else(|| format!("unknown target '{}'", s))
    }
}

/// What a target implementation can do. Declared statically per target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TargetCapabilities {
    pub format: bool,
    pub render: bool,
}

impl TargetCapabilities {
    pub const fn format_only() -> Self {
        Self {
            format: true,
            render: false,
        }
    }

    pub const fn format_and_render() -> Self {
        Self {
            format: true,
            render: true,
        }
    }
}

/// A schema serialized by a target, tagged with the target's type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedSchema {
    #[serde(rename = "type")]
    pub kind: TargetKind,
    pub data: Vec<u8>,
}

impl FormattedSchema {
    pub fn new(kind: TargetKind, data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    /// View the data as UTF-8 text. All formatters emit UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}
