//! D2 target.
//!
//! Every table becomes a `sql_table` shape whose rows carry the column
//! definitions, with `primary_key` and `foreign_key` constraints. Every
//! reference becomes an edge between the two rows. Rendering shells out to
//! the `d2` compiler and returns SVG.

use super::render::RenderCommand;
use super::{SchemaTarget, ensure_kind};
use crate::config::{DEFAULT_D2_BIN, DEFAULT_D2_LAYOUT, DEFAULT_D2_PAD, DEFAULT_D2_THEME};
use crate::error::DberdResult;
use crate::models::{Column, FormattedSchema, Schema, Table, TargetCapabilities, TargetKind};
use crate::pipeline::Context;
use async_trait::async_trait;
use std::fmt::Write;
use std::path::PathBuf;

/// How the `d2` compiler is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct D2Options {
    pub bin: PathBuf,
    pub layout: String,
    pub theme_id: u32,
    /// Pixels
    pub pad: u32,
}

impl Default for D2Options {
    fn default() -> Self {
        Self {
            bin: PathBuf::from(DEFAULT_D2_BIN),
            layout: DEFAULT_D2_LAYOUT.to_string(),
            theme_id: DEFAULT_D2_THEME,
            pad: DEFAULT_D2_PAD,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct D2Target {
    options: D2Options,
}

impl D2Target {
    pub fn new(options: D2Options) -> Self {
        Self { options }
    }

    fn command(&self) -> RenderCommand {
        RenderCommand::new(TargetKind::D2, &self.options.bin)
            .arg("--layout")
            .arg(&self.options.layout)
            .arg("--theme")
            .arg(self.options.theme_id.to_string())
            .arg("--pad")
            .arg(self.options.pad.to_string())
            .arg("-")
            .arg("-")
    }
}

#[async_trait]
impl SchemaTarget for D2Target {
    fn kind(&self) -> TargetKind {
        TargetKind::D2
    }

    fn capabilities(&self) -> TargetCapabilities {
        TargetCapabilities::format_and_render()
    }

    async fn format_schema(&self, ctx: &Context, schema: &Schema) -> DberdResult<FormattedSchema> {
        ctx.check("formatting d2")?;
        Ok(FormattedSchema::new(TargetKind::D2, format_d2(schema)))
    }

    async fn render_schema(
        &self,
        ctx: &Context,
        formatted: &FormattedSchema,
    ) -> DberdResult<Vec<u8>> {
        ensure_kind(formatted, TargetKind::D2)?;
        ctx.run("rendering d2", self.command().run(&formatted.data))
            .await
    }
}

fn format_d2(schema: &Schema) -> String {
    let mut out = String::from("direction: right\n");

    for table in &schema.tables {
        out.push('\n');
        write_table(&mut out, schema, table);
    }

    if !schema.references.is_empty() {
        out.push('\n');
    }
    for reference in &schema.references {
        let _ = writeln!(
            out,
            "{}.{} -> {}.{}",
            quote(&reference.source.table),
            quote(&reference.source.column),
            quote(&reference.target.table),
            quote(&reference.target.column),
        );
    }

    out
}

fn write_table(out: &mut String, schema: &Schema, table: &Table) {
    let _ = writeln!(out, "{}: {{", quote(&table.name));
    out.push_str("  shape: sql_table\n");
    for column in &table.columns {
        write_column(out, schema, table, column);
    }
    out.push_str("}\n");
}

fn write_column(out: &mut String, schema: &Schema, table: &Table, column: &Column) {
    if let Some(comment) = &column.comment {
        for line in comment.lines() {
            let _ = writeln!(out, "  # {}", line);
        }
    }

    let _ = write!(out, "  {}: {}", quote(&column.name), quote(&column.definition));

    let is_foreign = schema.is_referencing(&table.name, &column.name);
    match (column.is_primary, is_foreign) {
        (true, true) => out.push_str(" {constraint: [primary_key; foreign_key]}"),
        (true, false) => out.push_str(" {constraint: primary_key}"),
        (false, true) => out.push_str(" {constraint: foreign_key}"),
        (false, false) => {}
    }
    out.push('\n');
}

/// Double-quoted D2 string.
fn quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DberdError;
    use crate::models::{Reference, TableColumn};

    fn schema() -> Schema {
        Schema::new(
            vec![
                Table::new("public.posts")
                    .with_column(Column::new("id", "INT8 NOT NULL").with_primary_key(true))
                    .with_column(Column::new("user_id", "INT8 NOT NULL")),
                Table::new("public.users")
                    .with_column(Column::new("id", "INT8 NOT NULL").with_primary_key(true))
                    .with_column(
                        Column::new("email", "VARCHAR(255) NOT NULL")
                            .with_comment("User email address"),
                    ),
            ],
            vec![Reference::new(
                TableColumn::new("public.posts", "user_id"),
                TableColumn::new("public.users", "id"),
            )],
        )
    }

    #[tokio::test]
    async fn test_format_schema() {
        let target = D2Target::default();
        let formatted = target
            .format_schema(&Context::background(), &schema())
            .await
            .unwrap();

        let expected = r#"direction: right

"public.posts": {
  shape: sql_table
  "id": "INT8 NOT NULL" {constraint: primary_key}
  "user_id": "INT8 NOT NULL" {constraint: foreign_key}
}

"public.users": {
  shape: sql_table
  "id": "INT8 NOT NULL" {constraint: primary_key}
  # User email address
  "email": "VARCHAR(255) NOT NULL"
}

"public.posts"."user_id" -> "public.users"."id"
"#;
        assert_eq!(formatted.kind, TargetKind::D2);
        assert_eq!(formatted.as_text(), Some(expected));
    }

    #[tokio::test]
    async fn test_format_empty_schema() {
        let formatted = D2Target::default()
            .format_schema(&Context::background(), &Schema::default())
            .await
            .unwrap();
        assert_eq!(formatted.as_text(), Some("direction: right\n"));
    }

    #[test]
    fn test_primary_and_foreign_key() {
        let schema = Schema::new(
            vec![Table::new("t").with_column(Column::new("id", "int").with_primary_key(true))],
            vec![Reference::new(
                TableColumn::new("t", "id"),
                TableColumn::new("u", "id"),
            )],
        );
        assert!(format_d2(&schema).contains("{constraint: [primary_key; foreign_key]}"));
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("a.b"), r#""a.b""#);
        assert_eq!(quote(r#"say "hi""#), r#""say \"hi\"""#);
        assert_eq!(quote(r"C:\x"), r#""C:\\x""#);
    }

    #[tokio::test]
    async fn test_render_rejects_other_formats() {
        let target = D2Target::default();
        let formatted = FormattedSchema::new(TargetKind::Mermaid, "erDiagram\n");
        let err = target
            .render_schema(&Context::background(), &formatted)
            .await
            .unwrap_err();
        assert!(matches!(err, DberdError::TypeMismatch { .. }));
    }

    #[test]
    fn test_command_line() {
        let cmd = D2Target::default().command();
        let args: Vec<_> = cmd.args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec!["--layout", "elk", "--theme", "300", "--pad", "5", "-", "-"]
        );
    }
}
