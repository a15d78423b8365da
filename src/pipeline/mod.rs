//! Extract, normalize, format and render in one pass.
//!
//! Stages run sequentially under a shared [`Context`]. The extractor is
//! released on every exit path, including errors and cancellation, and no
//! stage is retried.

mod context;

pub use context::Context;

use crate::error::{DberdError, DberdResult};
use crate::models::{FormattedSchema, Schema};
use crate::source::SchemaExtractor;
use crate::target::SchemaTarget;
use tracing::{info, warn};

/// Check a target's declared capabilities before any work is done.
///
/// Formatting is always required; rendering only when `render` is set.
pub fn ensure_capabilities(target: &dyn SchemaTarget, render: bool) -> DberdResult<()> {
    let caps = target.capabilities();
    let kind = target.kind();
    if !caps.format {
        return Err(DberdError::unsupported(kind.as_str(), "format"));
    }
    if render && !caps.render {
        return Err(DberdError::unsupported(kind.as_str(), "render"));
    }
    Ok(())
}

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Normalized schema
    pub schema: Schema,
    pub formatted: FormattedSchema,
    /// Present only when rendering was requested.
    pub rendered: Option<Vec<u8>>,
}

pub struct Pipeline {
    source: Box<dyn SchemaExtractor>,
    target: Box<dyn SchemaTarget>,
    render: bool,
}

impl Pipeline {
    pub fn new(source: Box<dyn SchemaExtractor>, target: Box<dyn SchemaTarget>) -> Self {
        Self {
            source,
            target,
            render: false,
        }
    }

    /// Also render the formatted schema.
    pub fn with_render(mut self, render: bool) -> Self {
        self.render = render;
        self
    }

    /// Fail if the target cannot do what this pipeline asks of it.
    pub fn check_capabilities(&self) -> DberdResult<()> {
        ensure_capabilities(self.target.as_ref(), self.render)
    }

    /// Run every stage and release the extractor.
    pub async fn run(mut self, ctx: &Context) -> DberdResult<PipelineOutput> {
        let result = match self.check_capabilities() {
            Ok(()) => self.execute(ctx).await,
            Err(e) => Err(e),
        };

        let closed = self.source.close().await;
        match (result, closed) {
            (Ok(output), Ok(())) => Ok(output),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!(error = %close_err, "Failed to release source after error");
                Err(e)
            }
        }
    }

    async fn execute(&self, ctx: &Context) -> DberdResult<PipelineOutput> {
        let source = self.source.kind();
        let target = self.target.kind();

        info!(source = %source, "Extracting schema");
        let schema = self.source.extract_schema(ctx).await?;
        schema.validate()?;
        let schema = schema.normalized();
        info!(
            tables = schema.tables.len(),
            references = schema.references.len(),
            "Schema extracted"
        );

        info!(target = %target, "Formatting schema");
        let formatted = self.target.format_schema(ctx, &schema).await?;

        let rendered = if self.render {
            info!(target = %target, "Rendering schema");
            Some(self.target.render_schema(ctx, &formatted).await?)
        } else {
            None
        };

        Ok(PipelineOutput {
            schema,
            formatted,
            rendered,
        })
    }
}
