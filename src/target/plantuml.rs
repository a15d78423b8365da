//! PlantUML entity diagram target.

use super::{Aliases, SchemaTarget};
use crate::error::DberdResult;
use crate::models::{Column, FormattedSchema, Schema, Table, TargetCapabilities, TargetKind};
use crate::pipeline::Context;
use async_trait::async_trait;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, Default)]
pub struct PlantUmlTarget;

#[async_trait]
impl SchemaTarget for PlantUmlTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::PlantUml
    }

    fn capabilities(&self) -> TargetCapabilities {
        TargetCapabilities::format_only()
    }

    async fn format_schema(&self, ctx: &Context, schema: &Schema) -> DberdResult<FormattedSchema> {
        ctx.check("formatting plantuml")?;
        Ok(FormattedSchema::new(
            TargetKind::PlantUml,
            format_plantuml(schema),
        ))
    }
}

fn format_plantuml(schema: &Schema) -> String {
    let aliases = Aliases::new(schema);
    let mut out = String::from("@startuml\nhide circle\nskinparam linetype ortho\n");

    for table in &schema.tables {
        out.push('\n');
        write_entity(&mut out, schema, table, &aliases.get(&table.name));
    }

    if !schema.references.is_empty() {
        out.push('\n');
    }
    for reference in &schema.references {
        let _ = writeln!(
            out,
            "{} }}o--|| {} : {}",
            aliases.get(&reference.source.table),
            aliases.get(&reference.target.table),
            reference.source.column,
        );
    }

    out.push_str("@enduml\n");
    out
}

/// Primary key columns go above the `--` separator.
fn write_entity(out: &mut String, schema: &Schema, table: &Table, alias: &str) {
    let _ = writeln!(
        out,
        "entity \"{}\" as {} {{",
        table.name.replace('"', "'"),
        alias
    );

    let (primary, other): (Vec<&Column>, Vec<&Column>) =
        table.columns.iter().partition(|c| c.is_primary);

    for column in &primary {
        write_column(out, schema, table, column);
    }
    if !primary.is_empty() {
        out.push_str("  --\n");
    }
    for column in &other {
        write_column(out, schema, table, column);
    }

    out.push_str("}\n");
}

fn write_column(out: &mut String, schema: &Schema, table: &Table, column: &Column) {
    let marker = if column.is_primary { "* " } else { "" };
    let _ = write!(out, "  {}{} : {}", marker, column.name, column.definition);

    if schema.is_referencing(&table.name, &column.name) {
        out.push_str(" <<FK>>");
    }
    if let Some(comment) = &column.comment {
        let _ = write!(out, " ({})", comment.replace(['\n', '\r'], " "));
    }
    out.push('\n');
}
