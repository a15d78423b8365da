//! SQLite extractor.
//!
//! SQLite has a single namespace per attached file; tables are qualified as
//! `main.<table>`. Columns come from `pragma_table_info` and foreign keys from
//! `pragma_foreign_key_list`.

use super::{ColumnRow, ReferenceRow, SchemaExtractor, group_tables, run_stage};
use crate::db::{PoolHandle, pool::connect_sqlite};
use crate::error::{DberdError, DberdResult, ExtractionStage};
use crate::models::{Reference, Schema, SourceConfig, SourceKind, Table};
use crate::pipeline::Context;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};
use tracing::debug;

pub const NAMESPACE: &str = "main";

mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT name
        FROM sqlite_master
        WHERE type = 'table'
        AND name NOT LIKE 'sqlite_%'
        ORDER BY name
        "#;

    pub const TABLE_COLUMNS: &str = r#"
        SELECT name, type, "notnull", dflt_value, pk
        FROM pragma_table_info(?1)
        ORDER BY cid
        "#;

    pub const PRIMARY_KEY_COLUMNS: &str = r#"
        SELECT name
        FROM pragma_table_info(?1)
        WHERE pk > 0
        ORDER BY pk
        "#;

    pub const FOREIGN_KEYS: &str = r#"
        SELECT id, seq, "table", "from", "to"
        FROM pragma_foreign_key_list(?1)
        ORDER BY id, seq
        "#;
}

#[derive(Debug)]
pub struct SqliteSource {
    pool: PoolHandle<Sqlite>,
}

impl SqliteSource {
    pub async fn connect(config: &SourceConfig) -> DberdResult<Self> {
        Ok(Self {
            pool: PoolHandle::owned(connect_sqlite(config).await?),
        })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool: PoolHandle::borrowed(pool),
        }
    }

    async fn list_tables(&self) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query(queries::LIST_TABLES)
            .fetch_all(self.pool.pool())
            .await?;
        rows.iter().map(|row| row.try_get("name")).collect()
    }

    async fn extract_tables(&self) -> Result<Vec<Table>, sqlx::Error> {
        let mut column_rows = Vec::new();

        for table in self.list_tables().await? {
            let rows = sqlx::query(queries::TABLE_COLUMNS)
                .bind(&table)
                .fetch_all(self.pool.pool())
                .await?;

            for row in &rows {
                let not_null: i64 = row.try_get("notnull")?;
                let pk: i64 = row.try_get("pk")?;
                column_rows.push(ColumnRow {
                    namespace: NAMESPACE.to_string(),
                    table: table.clone(),
                    column: row.try_get("name")?,
                    data_type: row.try_get::<Option<String>, _>("type")?.unwrap_or_default(),
                    not_null: not_null != 0,
                    default: row.try_get("dflt_value")?,
                    comment: None,
                    is_primary: pk > 0,
                });
            }
        }

        let tables = group_tables(column_rows);
        debug!(count = tables.len(), "Extracted SQLite tables");
        Ok(tables)
    }

    async fn primary_key_columns(&self, table: &str) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query(queries::PRIMARY_KEY_COLUMNS)
            .bind(table)
            .fetch_all(self.pool.pool())
            .await?;
        rows.iter().map(|row| row.try_get("name")).collect()
    }

    /// A foreign key whose target column cannot be resolved fails the stage.
    async fn extract_references(&self) -> DberdResult<Vec<Reference>> {
        let mut references = Vec::new();

        for table in self.list_tables().await.map_err(references_error)? {
            let rows = sqlx::query(queries::FOREIGN_KEYS)
                .bind(&table)
                .fetch_all(self.pool.pool())
                .await
                .map_err(references_error)?;

            for row in &rows {
                let reference = self.reference_row(&table, row).await?;
                references.push(reference.into_reference());
            }
        }

        debug!(count = references.len(), "Extracted SQLite references");
        Ok(references)
    }

    async fn reference_row(&self, table: &str, row: &SqliteRow) -> DberdResult<ReferenceRow> {
        let seq: i64 = row.try_get("seq").map_err(references_error)?;
        let source_column: String = row.try_get("from").map_err(references_error)?;
        let target_table: String = row.try_get("table").map_err(references_error)?;

        let target_column = match row
            .try_get::<Option<String>, _>("to")
            .map_err(references_error)?
        {
            Some(column) => column,
            // `REFERENCES parent` without a column list points at the parent's key
            None => {
                let keys = self
                    .primary_key_columns(&target_table)
                    .await
                    .map_err(references_error)?;
                usize::try_from(seq)
                    .ok()
                    .and_then(|i| keys.get(i))
                    .cloned()
                    .ok_or_else(|| {
                        DberdError::extraction_message(
                            ExtractionStage::References,
                            format!(
                                "cannot resolve the target of {}.{}: table '{}' has no \
                                 primary key column at position {}",
                                table, source_column, target_table, seq
                            ),
                        )
                    })?
            }
        };

        Ok(ReferenceRow {
            source_namespace: NAMESPACE.to_string(),
            source_table: table.to_string(),
            source_column,
            target_namespace: NAMESPACE.to_string(),
            target_table,
            target_column,
        })
    }
}

fn references_error(err: sqlx::Error) -> DberdError {
    DberdError::extraction(ExtractionStage::References, err)
}

#[async_trait]
impl SchemaExtractor for SqliteSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Sqlite
    }

    async fn extract_schema(&self, ctx: &Context) -> DberdResult<Schema> {
        let tables = run_stage(ctx, ExtractionStage::Tables, self.extract_tables()).await?;
        let references = ctx
            .run(
                &ExtractionStage::References.to_string(),
                self.extract_references(),
            )
            .await?;

        Ok(Schema::new(tables, references))
    }

    async fn close(&mut self) -> DberdResult<()> {
        self.pool.close().await;
        Ok(())
    }
}
