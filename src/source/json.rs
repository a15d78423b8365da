//! Extractor that reads a schema previously written by the `json` target.

use super::SchemaExtractor;
use crate::error::{DberdError, DberdResult, ExtractionStage};
use crate::models::{Schema, SourceKind};
use crate::pipeline::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct JsonSource {
    path: PathBuf,
}

impl JsonSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_schema(&self) -> DberdResult<Schema> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| DberdError::io(&self.path, e))?;

        let schema: Schema = serde_json::from_slice(&bytes).map_err(|e| {
            DberdError::extraction_message(
                ExtractionStage::Tables,
                format!("parsing {}: {}", self.path.display(), e),
            )
        })?;

        debug!(
            path = %self.path.display(),
            tables = schema.tables.len(),
            references = schema.references.len(),
            "Read JSON schema"
        );
        Ok(schema)
    }
}

#[async_trait]
impl SchemaExtractor for JsonSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Json
    }

    async fn extract_schema(&self, ctx: &Context) -> DberdResult<Schema> {
        ctx.run(&ExtractionStage::Tables.to_string(), self.read_schema())
            .await
    }

    async fn close(&mut self) -> DberdResult<()> {
        Ok(())
    }
}
