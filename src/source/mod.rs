//! Schema extraction.
//!
//! Each backend implements [`SchemaExtractor`] for one database engine and
//! converges on the canonical [`Schema`] model. Backends are selected by
//! [`SourceKind`] through [`open_source`] (the extractor owns its pool) or
//! [`source_from_pool`] (the caller keeps ownership of the pool).
//!
//! # Architecture
//!
//! SQL backends run two catalog queries, one for tables and columns and one for
//! foreign keys, and hand the flat rows to [`group_tables`] and
//! [`ReferenceRow::into_reference`]. Catalog SQL lives in a `queries` submodule
//! next to each backend.

pub mod cockroach;
pub mod json;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use cockroach::CockroachSource;
pub use json::JsonSource;
pub use mysql::MySqlSource;
pub use postgres::PostgresSource;
pub use sqlite::SqliteSource;

use crate::db::DbPool;
use crate::error::{DberdError, DberdResult, ExtractionStage};
use crate::models::{Column, Reference, Schema, SourceConfig, SourceKind, Table, TableColumn};
use crate::pipeline::Context;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;

/// Extracts a [`Schema`] from one kind of data source.
#[async_trait]
pub trait SchemaExtractor: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Read every user table, its columns and the foreign keys between them.
    ///
    /// The result is not normalized. Failures name the stage that failed
    /// (tables or references).
    async fn extract_schema(&self, ctx: &Context) -> DberdResult<Schema>;

    /// Release resources the extractor owns. Safe to call more than once;
    /// borrowed connections are left open.
    async fn close(&mut self) -> DberdResult<()>;
}

/// Open an extractor that owns its connection.
pub async fn open_source(config: &SourceConfig) -> DberdResult<Box<dyn SchemaExtractor>> {
    let source: Box<dyn SchemaExtractor> = match config.kind {
        SourceKind::Postgres => Box::new(PostgresSource::connect(config).await?),
        SourceKind::Cockroach => Box::new(CockroachSource::connect(config).await?),
        SourceKind::MySql => Box::new(MySqlSource::connect(config).await?),
        SourceKind::Sqlite => Box::new(SqliteSource::connect(config).await?),
        SourceKind::Json => Box::new(JsonSource::new(&config.connection_string)),
    };
    Ok(source)
}

/// Wrap a pool supplied by the caller. Closing the extractor leaves it open.
pub fn source_from_pool(kind: SourceKind, pool: DbPool) -> DberdResult<Box<dyn SchemaExtractor>> {
    let source: Box<dyn SchemaExtractor> = match (kind, pool) {
        (SourceKind::Postgres, DbPool::Postgres(p)) => Box::new(PostgresSource::from_pool(p)),
        (SourceKind::Cockroach, DbPool::Postgres(p)) => Box::new(CockroachSource::from_pool(p)),
        (SourceKind::MySql, DbPool::MySql(p)) => Box::new(MySqlSource::from_pool(p)),
        (SourceKind::Sqlite, DbPool::SQLite(p)) => Box::new(SqliteSource::from_pool(p)),
        (kind, pool) => {
            return Err(DberdError::invalid_input(format!(
                "a {} pool cannot be used by the {} source",
                pool.backend_name(),
                kind
            )));
        }
    };
    Ok(source)
}

/// Run one catalog query under the context, attributing driver errors to `stage`.
pub(crate) async fn run_stage<F, T>(ctx: &Context, stage: ExtractionStage, query: F) -> DberdResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    ctx.run(&stage.to_string(), async {
        query.await.map_err(|e| DberdError::extraction(stage, e))
    })
    .await
}

/// One column as returned by a catalog query.
#[derive(Debug, Clone, Default)]
pub struct ColumnRow {
    pub namespace: String,
    pub table: String,
    pub column: String,
    pub data_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    pub comment: Option<String>,
    pub is_primary: bool,
}

impl ColumnRow {
    fn into_column(self) -> Column {
        let definition = column_definition(&self.data_type, self.not_null, self.default.as_deref());
        let column = Column::new(self.column, definition).with_primary_key(self.is_primary);
        match self.comment {
            Some(comment) => column.with_comment(comment),
            None => column,
        }
    }
}

/// One foreign-key column pair as returned by a catalog query.
#[derive(Debug, Clone, Default)]
pub struct ReferenceRow {
    pub source_namespace: String,
    pub source_table: String,
    pub source_column: String,
    pub target_namespace: String,
    pub target_table: String,
    pub target_column: String,
}

impl ReferenceRow {
    pub fn into_reference(self) -> Reference {
        Reference::new(
            TableColumn::new(
                qualified_name(&self.source_namespace, &self.source_table),
                self.source_column,
            ),
            TableColumn::new(
                qualified_name(&self.target_namespace, &self.target_table),
                self.target_column,
            ),
        )
    }
}

/// `<namespace>.<table>`
pub fn qualified_name(namespace: &str, table: &str) -> String {
    format!("{}.{}", namespace, table)
}

/// Build `<type>[ NOT NULL][ DEFAULT <expr>]`. Empty defaults are dropped.
pub fn column_definition(data_type: &str, not_null: bool, default: Option<&str>) -> String {
    let mut definition = data_type.trim().to_string();
    if not_null {
        definition.push_str(" NOT NULL");
    }
    if let Some(default) = default.filter(|d| !d.is_empty()) {
        definition.push_str(" DEFAULT ");
        definition.push_str(default);
    }
    definition.trim_start().to_string()
}

/// Group column rows into tables keyed by qualified name.
///
/// Columns keep the order the rows arrived in.
pub fn group_tables(rows: Vec<ColumnRow>) -> Vec<Table> {
    let mut tables: BTreeMap<String, Table> = BTreeMap::new();

    for row in rows {
        let name = qualified_name(&row.namespace, &row.table);
        tables
            .entry(name)
            .or_insert_with_key(|name| Table::new(name.clone()))
            .columns
            .push(row.into_column());
    }

    tables.into_values().collect()
}
