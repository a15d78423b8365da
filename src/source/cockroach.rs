//! CockroachDB extractor.
//!
//! CockroachDB speaks the PostgreSQL wire protocol, so it shares the pool and
//! the foreign-key query with [`super::postgres`]. Column types come from
//! `crdb_sql_type`; hidden columns (such as the implicit `rowid`) and
//! system schemas are skipped.

use super::postgres::{column_row, fetch_references};
use super::{SchemaExtractor, group_tables, run_stage};
use crate::db::{PoolHandle, pool::connect_postgres};
use crate::error::{DberdResult, ExtractionStage};
use crate::models::{Schema, SourceConfig, SourceKind, Table};
use crate::pipeline::Context;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::{PgPool, Postgres};
use tracing::debug;

mod queries {
    pub const EXTRACT_TABLES: &str = r#"
        WITH pk_columns AS (
            SELECT
                kcu.table_schema,
                kcu.table_name,
                kcu.column_name
            FROM information_schema.key_column_usage kcu
            JOIN information_schema.table_constraints tc
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
                AND tc.table_name = kcu.table_name
            WHERE tc.constraint_type = 'PRIMARY KEY'
        )
        SELECT
            c.table_schema::text AS table_schema,
            c.table_name::text AS table_name,
            c.column_name::text AS column_name,
            c.crdb_sql_type::text AS data_type,
            c.is_nullable::text AS is_nullable,
            c.column_default::text AS column_default,
            c.column_comment::text AS column_comment,
            EXISTS (
                SELECT 1
                FROM pk_columns pk
                WHERE pk.table_schema = c.table_schema
                AND pk.table_name = c.table_name
                AND pk.column_name = c.column_name
            ) AS is_primary
        FROM information_schema.columns c
        JOIN information_schema.tables t
            ON c.table_schema = t.table_schema AND c.table_name = t.table_name
        WHERE c.table_schema IN (
            SELECT schema_name
            FROM information_schema.schemata
            WHERE crdb_is_user_defined = 'YES'
        )
        AND c.is_hidden = 'NO'
        AND t.table_type = 'BASE TABLE'
        ORDER BY c.table_schema, c.table_name, c.ordinal_position
        "#;
}

#[derive(Debug)]
pub struct CockroachSource {
    pool: PoolHandle<Postgres>,
}

impl CockroachSource {
    pub async fn connect(config: &SourceConfig) -> DberdResult<Self> {
        Ok(Self {
            pool: PoolHandle::owned(connect_postgres(config).await?),
        })
    }

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
        debug!(count = tables.len(), "Extracted CockroachDB tables");
        Ok(tables)
    }
}

#[async_trait]
impl SchemaExtractor for CockroachSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Cockroach
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
