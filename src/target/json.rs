//! Canonical JSON target. Output can be read back by the `json` source.

use super::SchemaTarget;
use crate::error::DberdResult;
use crate::models::{FormattedSchema, Schema, TargetCapabilities, TargetKind};
use crate::pipeline::Context;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTarget;

#[async_trait]
impl SchemaTarget for JsonTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Json
    }

    fn capabilities(&self) -> TargetCapabilities {
        TargetCapabilities::format_only()
    }

    async fn format_schema(&self, ctx: &Context, schema: &Schema) -> DberdResult<FormattedSchema> {
        ctx.check("formatting json")?;
        let data = serde_json::to_vec_pretty(schema)?;
        Ok(FormattedSchema::new(TargetKind::Json, data))
    }
}
