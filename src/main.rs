//! dberd - Main entry point.
//!
//! Extracts a schema from the configured source, formats it with the selected
//! target and writes the requested artifacts.

use clap::Parser;
use dberd::config::Config;
use dberd::error::{DberdError, DberdResult};
use dberd::pipeline::{Context, Pipeline, ensure_capabilities};
use dberd::source::open_source;
use dberd::target::open_target;
use std::path::Path;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging. Logs go to stderr.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Cancel `token` on the first Ctrl-C.
fn install_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, cancelling");
                token.cancel();
            }
            Err(e) => debug!(error = %e, "Could not listen for Ctrl-C"),
        }
    });
}

async fn write_artifact(path: &Path, data: &[u8]) -> DberdResult<()> {
    tokio::fs::write(path, data)
        .await
        .map_err(|e| DberdError::io(path, e))?;
    info!(path = %path.display(), bytes = data.len(), "Wrote artifact");
    Ok(())
}

async fn run(config: &Config) -> DberdResult<()> {
    config.validate()?;

    let render = config.render_to_file.is_some();
    let target = open_target(config.target, config.d2_options());
    ensure_capabilities(target.as_ref(), render)?;

    let source_config = config.source_config()?;

    let token = CancellationToken::new();
    install_signal_handler(token.clone());
    let mut ctx = Context::with_token(token);
    if let Some(timeout) = config.timeout_duration() {
        ctx = ctx.with_timeout(timeout);
    }

    info!(
        source = %source_config.kind,
        target = %config.target,
        "Starting dberd v{}",
        env!("CARGO_PKG_VERSION")
    );

    let source = ctx
        .run("connecting to source", open_source(&source_config))
        .await?;
    let output = Pipeline::new(source, target)
        .with_render(render)
        .run(&ctx)
        .await?;

    if let Some(path) = &config.format_to_file {
        write_artifact(path, &output.formatted.data).await?;
    }
    if let (Some(path), Some(rendered)) = (&config.render_to_file, &output.rendered) {
        write_artifact(path, rendered).await?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse configuration from command line and environment
    let config = Config::parse();

    init_tracing(&config);

    match run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "dberd failed");
            eprintln!("Error: {}", e);
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Hint: {}", suggestion);
            }
            ExitCode::FAILURE
        }
    }
}
