//! MySQL / MariaDB extractor.
//!
//! Tables are qualified with their database name. Every non-system database
//! visible to the connection is extracted.

use super::{ColumnRow, ReferenceRow, SchemaExtractor, group_tables, run_stage};
use crate::db::{PoolHandle, pool::connect_mysql};
use crate::error::{DberdResult, ExtractionStage};
use crate::models::{Reference, Schema, SourceConfig, SourceKind, Table};
use crate::pipeline::Context;
use async_trait::async_trait;
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, MySqlPool, Row};
use tracing::debug;

mod queries {
    pub const EXTRACT_TABLES: &str = r#"
        SELECT
            c.TABLE_SCHEMA,
            c.TABLE_NAME,
            c.COLUMN_NAME,
            c.COLUMN_TYPE,
            c.IS_NULLABLE,
            c.COLUMN_DEFAULT,
            c.COLUMN_COMMENT,
            CAST(c.COLUMN_KEY = 'PRI' AS SIGNED) AS IS_PRIMARY
        FROM information_schema.COLUMNS c
        JOIN information_schema.TABLES t
            ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME
        WHERE c.TABLE_SCHEMA NOT IN ('information_schema', 'performance_schema', 'mysql', 'sys')
        AND t.TABLE_TYPE = 'BASE TABLE'
        ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME, c.ORDINAL_POSITION
        "#;

    pub const EXTRACT_REFERENCES: &str = r#"
        SELECT
            TABLE_SCHEMA,
            TABLE_NAME,
            COLUMN_NAME,
            REFERENCED_TABLE_SCHEMA,
            REFERENCED_TABLE_NAME,
            REFERENCED_COLUMN_NAME
        FROM information_schema.KEY_COLUMN_USAGE
        WHERE REFERENCED_TABLE_SCHEMA IS NOT NULL
        AND TABLE_SCHEMA NOT IN ('information_schema', 'performance_schema', 'mysql', 'sys')
        ORDER BY TABLE_SCHEMA, TABLE_NAME, COLUMN_NAME
        "#;
}

#[derive(Debug)]
pub struct MySqlSource {
    pool: PoolHandle<MySql>,
}

impl MySqlSource {
    pub async fn connect(config: &SourceConfig) -> DberdResult<Self> {
        Ok(Self {
            pool: PoolHandle::owned(connect_mysql(config).await?),
        })
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self {
            pool: PoolHandle::borrowed(pool),
        }
    }

    async fn extract_tables(&self) -> Result<Vec<Table>, sqlx::Error> {
        let rows = sqlx::query(queries::EXTRACT_TABLES)
            .fetch_all(self.pool.pool())
            .await?;

        let rows = rows
            .iter()
            .map(|row| {
                let is_primary: i64 = row.try_get("IS_PRIMARY")?;
                Ok(ColumnRow {
                    namespace: get_string(row, "TABLE_SCHEMA")?,
                    table: get_string(row, "TABLE_NAME")?,
                    column: get_string(row, "COLUMN_NAME")?,
                    data_type: get_string(row, "COLUMN_TYPE")?,
                    not_null: get_string(row, "IS_NULLABLE")? == "NO",
                    default: get_optional_string(row, "COLUMN_DEFAULT")?,
                    comment: get_optional_string(row, "COLUMN_COMMENT")?,
                    is_primary: is_primary != 0,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let tables = group_tables(rows);
        debug!(count = tables.len(), "Extracted MySQL tables");
        Ok(tables)
    }

    async fn extract_references(&self) -> Result<Vec<Reference>, sqlx::Error> {
        let rows = sqlx::query(queries::EXTRACT_REFERENCES)
            .fetch_all(self.pool.pool())
            .await?;

        let references = rows
            .iter()
            .map(|row| {
                Ok(ReferenceRow {
                    source_namespace: get_string(row, "TABLE_SCHEMA")?,
                    source_table: get_string(row, "TABLE_NAME")?,
                    source_column: get_string(row, "COLUMN_NAME")?,
                    target_namespace: get_string(row, "REFERENCED_TABLE_SCHEMA")?,
                    target_table: get_string(row, "REFERENCED_TABLE_NAME")?,
                    target_column: get_string(row, "REFERENCED_COLUMN_NAME")?,
                }
                .into_reference())
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        debug!(count = references.len(), "Extracted MySQL references");
        Ok(references)
    }
}

#[async_trait]
impl SchemaExtractor for MySqlSource {
    fn kind(&self) -> SourceKind {
        SourceKind::MySql
    }

    async fn extract_schema(&self, ctx: &Context) -> DberdResult<Schema> {
        let tables = run_stage(ctx, ExtractionStage::Tables, self.extract_tables()).await?;
        let references =
            run_stage(ctx, ExtractionStage::References, self.extract_references()).await?;

        Ok(Schema::new(tables, references))
    }

    async fn close(&mut self) -> DberdResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Read a string column from a MySQL row. NULL is a decode error.
///
/// MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
fn get_string(row: &MySqlRow, column: &str) -> Result<String, sqlx::Error> {
    get_optional_string(row, column)?.ok_or_else(|| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: "unexpected NULL".into(),
    })
}

fn get_optional_string(row: &MySqlRow, column: &str) -> Result<Option<String>, sqlx::Error> {
    match row.try_get::<Option<String>, _>(column) {
        Ok(value) => Ok(value),
        Err(err) => match row.try_get::<Option<Vec<u8>>, _>(column) {
            Ok(bytes) => bytes.map(|b| decode_utf8(column, b)).transpose(),
            Err(_) => Err(err),
        },
    }
}

fn decode_utf8(column: &str, bytes: Vec<u8>) -> Result<String, sqlx::Error> {
    String::from_utf8(bytes).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}
