use anyhow::{Context, Result};
use repomirror_core::config::Config;

/// Run the HTTP API and the sync worker until Ctrl-C.
pub fn run(config: Config) -> Result<()> {
    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(repomirror_server::http::run_http_server(config))
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))
}
