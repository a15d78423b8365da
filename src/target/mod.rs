//! Output formats.
//!
//! A target turns a normalized [`Schema`] into text ([`SchemaTarget::format_schema`])
//! and, when its capabilities say so, compiles that text into a diagram
//! ([`SchemaTarget::render_schema`]). Formatters walk the schema in the order
//! they receive it so the same schema always produces the same bytes.

pub mod d2;
pub mod json;
pub mod mermaid;
pub mod plantuml;
pub mod render;

pub use d2::{D2Options, D2Target};
pub use json::JsonTarget;
pub use mermaid::MermaidTarget;
pub use plantuml::PlantUmlTarget;

use crate::error::{DberdError, DberdResult};
use crate::models::{FormattedSchema, Schema, TargetCapabilities, TargetKind};
use crate::pipeline::Context;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

#[async_trait]
pub trait SchemaTarget: Send + Sync {
    fn kind(&self) -> TargetKind;

    /// Static description of what this target supports.
    fn capabilities(&self) -> TargetCapabilities;

    /// Serialize the schema. The result is tagged with [`SchemaTarget::kind`].
    ///
    /// The default is for placeholder targets that declare no format support.
    async fn format_schema(&self, ctx: &Context, schema: &Schema) -> DberdResult<FormattedSchema> {
        let _ = (ctx, schema);
        Err(DberdError::unsupported(self.kind().as_str(), "format"))
    }

    /// Compile a formatted schema into a diagram.
    ///
    /// Targets that cannot render keep this default, which always fails with
    /// [`DberdError::Unsupported`].
    async fn render_schema(
        &self,
        ctx: &Context,
        formatted: &FormattedSchema,
    ) -> DberdResult<Vec<u8>> {
        let _ = (ctx, formatted);
        Err(DberdError::unsupported(self.kind().as_str(), "render"))
    }
}

/// Construct the target for a type tag.
pub fn open_target(kind: TargetKind, d2_options: D2Options) -> Box<dyn SchemaTarget> {
    match kind {
        TargetKind::Json => Box::new(JsonTarget),
        TargetKind::D2 => Box::new(D2Target::new(d2_options)),
        TargetKind::Mermaid => Box::new(MermaidTarget),
        TargetKind::PlantUml => Box::new(PlantUmlTarget),
    }
}

/// Fail with a type mismatch unless `formatted` was produced by `expected`.
pub(crate) fn ensure_kind(formatted: &FormattedSchema, expected: TargetKind) -> DberdResult<()> {
    if formatted.kind != expected {
        return Err(DberdError::type_mismatch(
            formatted.kind.as_str(),
            expected.as_str(),
        ));
    }
    Ok(())
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
pub(crate) fn identifier(name: &str) -> String {
    let id: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    match id.chars().next() {
        Some(c) if c.is_ascii_digit() => format!("_{}", id),
        Some(_) => id,
        None => "_".to_string(),
    }
}

/// Entity aliases, unique per schema. Assigned in table order.
pub(crate) struct Aliases<'a> {
    by_table: HashMap<&'a str, String>,
}

impl<'a> Aliases<'a> {
    pub(crate) fn new(schema: &'a Schema) -> Self {
        let mut by_table = HashMap::with_capacity(schema.tables.len());
        let mut taken = HashSet::with_capacity(schema.tables.len());

        for table in &schema.tables {
            let base = identifier(&table.name);
            let mut alias = base.clone();
            let mut n = 2;
            while !taken.insert(alias.clone()) {
                alias = format!("{}_{}", base, n);
                n += 1;
            }
            by_table.insert(table.name.as_str(), alias);
        }

        Self { by_table }
    }

    /// Tables that are referenced but not part of the schema fall back to the
    /// sanitized name.
    pub(crate) fn get(&self, table: &str) -> String {
        self.by_table
            .get(table)
            .cloned()
            .unwrap_or_else(|| identifier(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_format_only_targets_refuse_render() {
        let ctx = Context::background();
        for kind in [TargetKind::Json, TargetKind::Mermaid, TargetKind::PlantUml] {
            let target = open_target(kind, D2Options::default());
            assert_eq!(target.kind(), kind);
            assert_eq!(target.capabilities(), TargetCapabilities::format_only());

            let formatted = target
                .format_schema(&ctx, &Schema::default())
                .await
                .unwrap();
            let err = target.render_schema(&ctx, &formatted).await.unwrap_err();
            assert!(matches!(err, DberdError::Unsupported { .. }));
        }
    }

    #[test]
    fn test_d2_declares_render() {
        let target = open_target(TargetKind::D2, D2Options::default());
        assert_eq!(target.capabilities(), TargetCapabilities::format_and_render());
    }

    #[tokio::test]
    async fn test_formatted_kind_matches_target() {
        let ctx = Context::background();
        for kind in TargetKind::ALL {
            let target = open_target(kind, D2Options::default());
            let formatted = target
                .format_schema(&ctx, &Schema::default())
                .await
                .unwrap();
            assert_eq!(formatted.kind, kind);
        }
    }

    #[test]
    fn test_ensure_kind() {
        let formatted = FormattedSchema::new(TargetKind::Mermaid, "erDiagram\n");
        assert!(ensure_kind(&formatted, TargetKind::Mermaid).is_ok());
        let err = ensure_kind(&formatted, TargetKind::D2).unwrap_err();
        assert_eq!(err.to_string(), "mermaid format is not supported, d2 expected");
    }

    #[test]
    fn test_identifier() {
        assert_eq!(identifier("public.users"), "public_users");
        assert_eq!(identifier("my-db.order items"), "my_db_order_items");
        assert_eq!(identifier("1st"), "_1st");
        assert_eq!(identifier(""), "_");
    }

    #[test]
    fn test_alias_collisions() {
        let schema = Schema::new(
            vec![
                crate::models::Table::new("a.b_c"),
                crate::models::Table::new("a_b.c"),
            ],
            Vec::new(),
        );
        let aliases = Aliases::new(&schema);
        assert_eq!(aliases.get("a.b_c"), "a_b_c");
        assert_eq!(aliases.get("a_b.c"), "a_b_c_2");
        assert_eq!(aliases.get("other.table"), "other_table");
    }
}
