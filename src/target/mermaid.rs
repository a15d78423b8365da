//! Mermaid `erDiagram` target.
//!
//! Qualified table names are not valid Mermaid identifiers, so every entity
//! gets a sanitized alias and keeps its real name as the display label.
//! Attribute types must be a single word: the first word of the definition is
//! used as the type and the full definition goes into the attribute comment.

use super::{Aliases, SchemaTarget, identifier};
use crate::error::DberdResult;
use crate::models::{Column, FormattedSchema, Schema, TargetCapabilities, TargetKind};
use crate::pipeline::Context;
use async_trait::async_trait;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, Default)]
pub struct MermaidTarget;

#[async_trait]
impl SchemaTarget for MermaidTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Mermaid
    }

    fn capabilities(&self) -> TargetCapabilities {
        TargetCapabilities::format_only()
    }

    async fn format_schema(&self, ctx: &Context, schema: &Schema) -> DberdResult<FormattedSchema> {
        ctx.check("formatting mermaid")?;
        Ok(FormattedSchema::new(TargetKind::Mermaid, format_mermaid(schema)))
    }
}

fn format_mermaid(schema: &Schema) -> String {
    let aliases = Aliases::new(schema);
    let mut out = String::from("erDiagram\n");

    for table in &schema.tables {
        let _ = writeln!(
            out,
            "    {}[\"{}\"] {{",
            aliases.get(&table.name),
            label(&table.name)
        );
        for column in &table.columns {
            let is_foreign = schema.is_referencing(&table.name, &column.name);
            write_attribute(&mut out, column, is_foreign);
        }
        out.push_str("    }\n");
    }

    for reference in &schema.references {
        let _ = writeln!(
            out,
            "    {} }}o--|| {} : \"{} -> {}\"",
            aliases.get(&reference.source.table),
            aliases.get(&reference.target.table),
            label(&reference.source.column),
            label(&reference.target.column),
        );
    }

    out
}

fn write_attribute(out: &mut String, column: &Column, is_foreign: bool) {
    let data_type = column
        .definition
        .split_whitespace()
        .next()
        .map(attribute_type)
        .unwrap_or_else(|| "unknown".to_string());

    let _ = write!(out, "        {} {}", data_type, identifier(&column.name));

    match (column.is_primary, is_foreign) {
        (true, true) => out.push_str(" PK, FK"),
        (true, false) => out.push_str(" PK"),
        (false, true) => out.push_str(" FK"),
        (false, false) => {}
    }

    let mut comment = column.definition.clone();
    if let Some(c) = &column.comment {
        comment.push_str(", ");
        comment.push_str(c);
    }
    if !comment.is_empty() {
        let _ = write!(out, " \"{}\"", label(&comment));
    }
    out.push('\n');
}

/// Mermaid types allow letters, digits, `_`, `-`, brackets and parentheses.
fn attribute_type(word: &str) -> String {
    let ty: String = word
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '(' | ')' | '[' | ']') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if ty.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        ty
    } else {
        format!("_{}", ty)
    }
}

/// Mermaid strings cannot contain double quotes or line breaks.
fn label(s: &str) -> String {
    s.replace('"', "'").replace(['\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Reference, Table, TableColumn};

    #[tokio::test]
    async fn test_format_schema() {
        let schema = Schema::new(
            vec![
                Table::new("public.posts")
                    .with_column(Column::new("id", "INT8 NOT NULL").with_primary_key(true))
                    .with_column(Column::new("user_id", "INT8 NOT NULL")),
                Table::new("public.users")
                    .with_column(Column::new("id", "INT8 NOT NULL").with_primary_key(true))
                    .with_column(
                        Column::new("email", "VARCHAR(255) NOT NULL")
                            .with_comment("User \"email\" address"),
                    ),
            ],
            vec![Reference::new(
                TableColumn::new("public.posts", "user_id"),
                TableColumn::new("public.users", "id"),
            )],
        );

        let formatted = MermaidTarget
            .format_schema(&Context::background(), &schema)
            .await
            .unwrap();

        let expected = "erDiagram
    public_posts[\"public.posts\"] {
        INT8 id PK \"INT8 NOT NULL\"
        INT8 user_id FK \"INT8 NOT NULL\"
    }
    public_users[\"public.users\"] {
        INT8 id PK \"INT8 NOT NULL\"
        VARCHAR(255) email \"VARCHAR(255) NOT NULL, User 'email' address\"
    }
    public_posts }o--|| public_users : \"user_id -> id\"
";
        assert_eq!(formatted.as_text(), Some(expected));
    }

    #[test]
    fn test_attribute_type() {
        assert_eq!(attribute_type("VARCHAR(255)"), "VARCHAR(255)");
        assert_eq!(attribute_type("int[]"), "int[]");
        assert_eq!(attribute_type("double"), "double");
        assert_eq!(attribute_type("character varying"), "character_varying");
        assert_eq!(attribute_type("1x"), "_1x");
    }

    #[test]
    fn test_empty_definition() {
        let mut out = String::new();
        write_attribute(&mut out, &Column::new("payload", ""), false);
        assert_eq!(out, "        unknown payload\n");
    }
}
