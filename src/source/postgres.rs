//! PostgreSQL extractor.

use super::{ColumnRow, ReferenceRow, SchemaExtractor, group_tables, run_stage};
use crate::db::{PoolHandle, pool::connect_postgres};
use crate::error::{DberdResult, ExtractionStage};
use crate::models::{Reference, Schema, SourceConfig, SourceKind, Table};
use crate::pipeline::Context;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row};
use tracing::debug;

pub(crate) mod queries {
    pub const EXTRACT_TABLES: &str = r#"
        SELECT
            c.table_schema::text AS table_schema,
            c.table_name::text AS table_name,
            c.column_name::text AS column_name,
            format_type(a.atttypid, a.atttypmod) AS data_type,
            c.is_nullable::text AS is_nullable,
            c.column_default::text AS column_default,
            col_description(a.attrelid, a.attnum) AS column_comment,
            EXISTS (
                SELECT 1
                FROM pg_index i
                WHERE i.indrelid = a.attrelid
                AND i.indisprimary
                AND a.attnum = ANY(i.indkey)
            ) AS is_primary
        FROM information_schema.columns c
        JOIN information_schema.tables t
            ON t.table_schema = c.table_schema AND t.table_name = c.table_name
        JOIN pg_namespace n ON n.nspname = c.table_schema
        JOIN pg_class cl ON cl.relnamespace = n.oid AND cl.relname = c.table_name
        JOIN pg_attribute a ON a.attrelid = cl.oid AND a.attname = c.column_name
        WHERE t.table_type = 'BASE TABLE'
        AND c.table_schema NOT IN ('pg_catalog', 'information_schema')
        AND c.table_schema NOT LIKE 'pg_toast%'
        AND c.table_schema NOT LIKE 'pg_temp%'
        ORDER BY c.table_schema, c.table_name, c.ordinal_position
        "#;

    /// Pairs the n-th column of every foreign key with the n-th referenced
    /// column. Only the first target is kept per source column.
    pub const EXTRACT_REFERENCES: &str = r#"
        WITH foreign_keys AS (
            SELECT
                src_ns.nspname::text AS source_schema,
                src_tbl.relname::text AS source_table,
                src_col.attname::text AS source_column,
                tgt_ns.nspname::text AS target_schema,
                tgt_tbl.relname::text AS target_table,
                tgt_col.attname::text AS target_column,
                ROW_NUMBER() OVER (
                    PARTITION BY src_ns.nspname, src_tbl.relname, src_col.attname
                    ORDER BY tgt_ns.nspname, tgt_tbl.relname, tgt_col.attname
                ) AS rn
            FROM pg_constraint con
            JOIN pg_class src_tbl ON con.conrelid = src_tbl.oid
            JOIN pg_namespace src_ns ON src_tbl.relnamespace = src_ns.oid
            JOIN pg_class tgt_tbl ON con.confrelid = tgt_tbl.oid
            JOIN pg_namespace tgt_ns ON tgt_tbl.relnamespace = tgt_ns.oid
            JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS src_cols(attnum, ord) ON TRUE
            JOIN pg_attribute src_col
                ON src_col.attrelid = src_tbl.oid AND src_col.attnum = src_cols.attnum
            JOIN LATERAL unnest(con.confkey) WITH ORDINALITY AS tgt_cols(attnum, ord)
                ON src_cols.ord = tgt_cols.ord
            JOIN pg_attribute tgt_col
                ON tgt_col.attrelid = tgt_tbl.oid AND tgt_col.attnum = tgt_cols.attnum
            WHERE con.contype = 'f'
        )
        SELECT
            source_schema,
            source_table,
            source_column,
            target_schema,
            target_table,
            target_column
        FROM foreign_keys
        WHERE rn = 1
        ORDER BY source_schema, source_table, source_column
        "#;
}

/// Extracts schemas from PostgreSQL through `information_schema` and `pg_catalog`.
#[derive(Debug)]
pub struct PostgresSource {
    pool: PoolHandle<Postgres>,
}

impl PostgresSource {
    /// Connect using the descriptor. The pool is closed by [`SchemaExtractor::close`].
    pub async fn connect(config: &SourceConfig) -> DberdResult<Self> {
        Ok(Self {
            pool: PoolHandle::owned(connect_postgres(config).await?),
        })
    }

    /// Use a pool owned by the caller.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool: PoolHandle::borrowed(pool),
        }
    }

    async fn extract_tables(&self) -> Result<Vec<Table>, sqlx::Error> {
        let mut stream = sqlx::query(queries::EXTRACT_TABLES).fetch(self.pool.pool());
        let mut rows = Vec::new();
        while let Some(row) = stream.try_next().await? {
            rows.push(column_row(&row)?);
        }

        let tables = group_tables(rows);
        debug!(count = tables.len(), "Extracted PostgreSQL tables");
        Ok(tables)
    }
}

#[async_trait]
impl SchemaExtractor for PostgresSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Postgres
    }

    async fn extract_schema(&self, ctx: &Context) -> DberdResult<Schema> {
        let tables = run_stage(ctx, ExtractionStage::Tables, self.extract_tables()).await?;
        let references = run_stage(
            ctx,
            ExtractionStage::References,
            fetch_references(self.pool.pool()),
        )
        .await?;

        Ok(Schema::new(tables, references))
    }

    async fn close(&mut self) -> DberdResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Read a column row produced by a tables query with the standard aliases.
pub(crate) fn column_row(row: &PgRow) -> Result<ColumnRow, sqlx::Error> {
    let is_nullable: String = row.try_get("is_nullable")?;
    Ok(ColumnRow {
        namespace: row.try_get("table_schema")?,
        table: row.try_get("table_name")?,
        column: row.try_get("column_name")?,
        data_type: row.try_get("data_type")?,
        not_null: is_nullable.eq_ignore_ascii_case("NO"),
        default: row.try_get("column_default")?,
        comment: row.try_get("column_comment")?,
        is_primary: row.try_get("is_primary")?,
    })
}

/// Foreign keys from `pg_constraint`. Also valid on CockroachDB.
pub(crate) async fn fetch_references(pool: &PgPool) -> Result<Vec<Reference>, sqlx::Error> {
    let rows = sqlx::query(queries::EXTRACT_REFERENCES)
        .fetch_all(pool)
        .await?;

    let references = rows
        .iter()
        .map(|row| {
            Ok(ReferenceRow {
                source_namespace: row.try_get("source_schema")?,
                source_table: row.try_get("source_table")?,
                source_column: row.try_get("source_column")?,
                target_namespace: row.try_get("target_schema")?,
                target_table: row.try_get("target_table")?,
                target_column: row.try_get("target_column")?,
            }
            .into_reference())
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

    debug!(count = references.len(), "Extracted references");
    Ok(references)
}
