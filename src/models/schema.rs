//! Canonical schema model.
//!
//! Every extractor backend converges on these types, and every target backend
//! consumes them. The serialized field names are the canonical JSON form and
//! must stay stable.

use crate::error::{DberdError, DberdResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// A full structural snapshot of a data source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub references: Vec<Reference>,
}

impl Schema {
    /// Create a schema from its tables and references.
    pub fn new(tables: Vec<Table>, references: Vec<Reference>) -> Self {
        Self { tables, references }
    }

    /// Sort tables, columns and references into the canonical order.
    ///
    /// - tables ascend by qualified name (byte order)
    /// - columns put primary keys first, then ascend by name
    /// - references ascend by (source table, source column, target table, target column)
    ///
    /// Only the order changes; duplicates are kept. Applying it twice is the
    /// same as applying it once.
    pub fn normalize(&mut self) {
        self.tables.sort_by(|a, b| a.name.cmp(&b.name));

        for table in &mut self.tables {
            table.normalize();
        }

        self.references.sort();
    }

    /// Consume the schema and return it normalized.
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// Check the identity invariants: every table has a non-empty name that
    /// appears once, and column names are unique within their table.
    pub fn validate(&self) -> DberdResult<()> {
        let mut seen = HashSet::with_capacity(self.tables.len());

        for table in &self.tables {
            if table.name.is_empty() {
                return Err(DberdError::invalid_schema(
                    "table name cannot be empty",
                    "<unnamed>",
                ));
            }
            if !seen.insert(table.name.as_str()) {
                return Err(DberdError::invalid_schema(
                    format!("table '{}' appears more than once", table.name),
                    table.name.clone(),
                ));
            }

            let mut columns = HashSet::with_capacity(table.columns.len());
            for column in &table.columns {
                if !columns.insert(column.name.as_str()) {
                    return Err(DberdError::invalid_schema(
                        format!(
                            "column '{}' appears more than once in table '{}'",
                            column.name, table.name
                        ),
                        format!("{}.{}", table.name, column.name),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Look up a table by qualified name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Check whether the given column is the source of at least one reference.
    pub fn is_referencing(&self, table: &str, column: &str) -> bool {
        self.references
            .iter()
            .any(|r| r.source.table == table && r.source.column == column)
    }

    /// True when there are no tables and no references.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.references.is_empty()
    }
}

/// A table identified by its namespace-qualified name, e.g. `public.users`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl Table {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Add a column.
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Sort columns: primary keys first, then by name.
    pub fn normalize(&mut self) {
        self.columns.sort_by(Column::canonical_cmp);
    }

    /// Columns that belong to the primary key, in their current order.
    pub fn primary_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_primary)
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Engine-native type plus nullability and default, e.g. `VARCHAR(255) NOT NULL`.
    pub definition: String,
    /// Composite keys flag every participating column; key order is not kept.
    #[serde(default)]
    pub is_primary: bool,
}

impl Column {
    /// Create a non-primary column without a comment.
    pub fn new(name: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment: None,
            definition: definition.into(),
            is_primary: false,
        }
    }

    /// Set the primary key flag.
    pub fn with_primary_key(mut self, is_primary: bool) -> Self {
        self.is_primary = is_primary;
        self
    }

    /// Set the comment. Empty comments are treated as absent.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        let comment = comment.into();
        self.comment = if comment.is_empty() {
            None
        } else {
            Some(comment)
        };
        self
    }

    fn canonical_cmp(a: &Column, b: &Column) -> Ordering {
        b.is_primary
            .cmp(&a.is_primary)
            .then_with(|| a.name.cmp(&b.name))
    }
}

/// Address of one column in one table.
///
/// Field order matters: the derived ordering compares table before column.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableColumn {
    pub table: String,
    pub column: String,
}

impl TableColumn {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl std::fmt::Display for TableColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// A directed foreign-key edge. Self references and cycles are allowed.
///
/// The derived ordering is (source table, source column, target table, target column).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub source: TableColumn,
    pub target: TableColumn,
}

impl Reference {
    pub fn new(source: TableColumn, target: TableColumn) -> Self {
        Self { source, target }
    }

    pub fn is_self_reference(&self) -> bool {
        self.source.table == self.target.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, definition: &str) -> Column {
        Column::new(name, definition)
    }

    fn pk(name: &str, definition: &str) -> Column {
        Column::new(name, definition).with_primary_key(true)
    }

    fn reference(st: &str, sc: &str, tt: &str, tc: &str) -> Reference {
        Reference::new(TableColumn::new(st, sc), TableColumn::new(tt, tc))
    }

    fn complex_schema() -> Schema {
        Schema::new(
            vec![
                Table::new("table_a")
                    .with_column(pk("id", "int"))
                    .with_column(col("name", "text")),
                Table::new("table_c")
                    .with_column(pk("id", "int"))
                    .with_column(col("b_id", "int")),
                Table::new("table_b")
                    .with_column(pk("id", "int"))
                    .with_column(col("a_id", "int"))
                    .with_column(col("name", "text")),
            ],
            vec![
                reference("table_a", "name", "table_b", "name"),
                reference("table_c", "b_id", "table_b", "id"),
                reference("table_b", "a_id", "table_a", "id"),
                reference("table_c", "id", "table_a", "id"),
                reference("table_a", "id", "table_b", "a_id"),
                reference("table_a", "id", "table_c", "id"),
                reference("table_b", "id", "table_c", "b_id"),
                reference("table_c", "b_id", "table_a", "id"),
            ],
        )
    }

    fn assert_canonical(schema: &Schema) {
        for pair in schema.tables.windows(2) {
            assert!(pair[0].name <= pair[1].name);
        }
        for table in &schema.tables {
            for pair in table.columns.windows(2) {
                assert!(pair[0].is_primary || !pair[1].is_primary);
                if pair[0].is_primary == pair[1].is_primary {
                    assert!(pair[0].name <= pair[1].name);
                }
            }
        }
        for pair in schema.references.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn test_normalize_sorts_tables_and_references() {
        let mut schema = Schema::new(
            vec![
                Table::new("z_table")
                    .with_column(col("z_column", "text"))
                    .with_column(col("a_column", "text")),
                Table::new("a_table")
                    .with_column(col("z_column", "text"))
                    .with_column(col("a_column", "text")),
            ],
            vec![
                reference("z_table", "z_column", "a_table", "a_column"),
                reference("a_table", "a_column", "z_table", "z_column"),
            ],
        );

        schema.normalize();

        let expected = Schema::new(
            vec![
                Table::new("a_table")
                    .with_column(col("a_column", "text"))
                    .with_column(col("z_column", "text")),
                Table::new("z_table")
                    .with_column(col("a_column", "text"))
                    .with_column(col("z_column", "text")),
            ],
            vec![
                reference("a_table", "a_column", "z_table", "z_column"),
                reference("z_table", "z_column", "a_table", "a_column"),
            ],
        );
        assert_eq!(schema, expected);
    }

    #[test]
    fn test_normalize_complex_references() {
        let schema = complex_schema().normalized();

        let names: Vec<&str> = schema.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["table_a", "table_b", "table_c"]);

        let table_b: Vec<&str> = schema.tables[1]
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(table_b, vec!["id", "a_id", "name"]);

        assert_eq!(
            schema.references,
            vec![
                reference("table_a", "id", "table_b", "a_id"),
                reference("table_a", "id", "table_c", "id"),
                reference("table_a", "name", "table_b", "name"),
                reference("table_b", "a_id", "table_a", "id"),
                reference("table_b", "id", "table_c", "b_id"),
                reference("table_c", "b_id", "table_a", "id"),
                reference("table_c", "b_id", "table_b", "id"),
                reference("table_c", "id", "table_a", "id"),
            ]
        );
    }

    #[test]
    fn test_normalize_empty_schema() {
        let mut schema = Schema::default();
        schema.normalize();
        assert_eq!(schema, Schema::new(vec![], vec![]));
        assert!(schema.is_empty());
    }

    #[test]
    fn test_primary_key_moves_first() {
        let mut table = Table::new("public.users")
            .with_column(col("name", "text"))
            .with_column(pk("id", "int"));
        table.normalize();

        let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn test_composite_primary_key_sorted_by_name() {
        let mut table = Table::new("public.user_roles")
            .with_column(pk("user_id", "int"))
            .with_column(col("assigned_at", "timestamp"))
            .with_column(pk("role_id", "int"));
        table.normalize();

        let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["role_id", "user_id", "assigned_at"]);
    }

    #[test]
    fn test_table_without_columns() {
        let mut schema = Schema::new(vec![Table::new("main.empty")], vec![]);
        schema.normalize();
        assert!(schema.tables[0].columns.is_empty());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = complex_schema().normalized();
        let twice = once.clone().normalized();
        assert_eq!(once, twice);
        assert_canonical(&twice);
    }

    #[test]
    fn test_normalize_ignores_input_order() {
        let forward = complex_schema().normalized();

        let mut reversed = complex_schema();
        reversed.tables.reverse();
        for table in &mut reversed.tables {
            table.columns.reverse();
        }
        reversed.references.reverse();

        let mut rotated = complex_schema();
        rotated.tables.rotate_left(1);
        rotated.references.rotate_left(3);

        assert_eq!(reversed.normalized(), forward);
        assert_eq!(rotated.normalized(), forward);
    }

    #[test]
    fn test_normalize_preserves_content() {
        let original = complex_schema();
        let normalized = original.clone().normalized();

        assert_eq!(original.tables.len(), normalized.tables.len());
        assert_eq!(original.references.len(), normalized.references.len());
        for table in &original.tables {
            let other = normalized.table(&table.name).unwrap();
            assert_eq!(table.columns.len(), other.columns.len());
            for column in &table.columns {
                assert_eq!(other.column(&column.name), Some(column));
            }
        }
        for reference in &original.references {
            assert!(normalized.references.contains(reference));
        }
    }

    #[test]
    fn test_duplicate_references_are_kept() {
        let schema = Schema::new(
            vec![],
            vec![
                reference("b", "x", "a", "id"),
                reference("a", "id", "b", "x"),
                reference("b", "x", "a", "id"),
            ],
        )
        .normalized();

        assert_eq!(schema.references.len(), 3);
        assert_eq!(schema.references[1], schema.references[2]);
    }

    #[test]
    fn test_ordering_is_case_sensitive_bytes() {
        let schema = Schema::new(
            vec![Table::new("b"), Table::new("a"), Table::new("B")],
            vec![],
        )
        .normalized();

        let names: Vec<&str> = schema.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["B", "a", "b"]);
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let schema = Schema::new(vec![Table::new("public.a"), Table::new("public.a")], vec![]);
        assert!(matches!(
            schema.validate(),
            Err(DberdError::InvalidSchema { .. })
        ));

        let schema = Schema::new(
            vec![
                Table::new("public.a")
                    .with_column(col("id", "int"))
                    .with_column(col("id", "text")),
            ],
            vec![],
        );
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let schema = Schema::new(vec![Table::new("")], vec![]);
        assert!(schema.validate().is_err());
        assert!(complex_schema().validate().is_ok());
    }

    #[test]
    fn test_empty_comment_is_absent() {
        assert_eq!(col("a", "int").with_comment("").comment, None);
        assert_eq!(
            col("a", "int").with_comment("note").comment.as_deref(),
            Some("note")
        );
    }

    #[test]
    fn test_self_reference() {
        let r = reference("public.categories", "parent_id", "public.categories", "id");
        assert!(r.is_self_reference());
        assert_eq!(r.source.to_string(), "public.categories.parent_id");
    }
}
