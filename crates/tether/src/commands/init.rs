//! Init command - write a default host configuration

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tether_hostcall::HostConfig;

use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,

    /// Milliseconds between automatic ticks (0 = driven by the embedder)
    #[arg(long)]
    pub tick_interval_ms: Option<u64>,
}

const HEADER: &str = "# tether host configuration\n\n";

pub fn run(args: InitArgs, path: &Path, format: OutputFormat) -> Result<()> {
    let existed = path.exists();
    if existed && !args.force {
        match format {
            OutputFormat::Text => println!("Skipped {} (already exists, use --force)", path.display()),
            OutputFormat::Json => {
                let result = serde_json::json!({
                    "success": false,
                    "path": path.to_string_lossy(),
                    "reason": "exists",
                });
                println!("{}", serde_json::to_string(&result)?);
            }
        }
        return Ok(());
    }

    let mut config = HostConfig::default();
    if let Some(ms) = args.tick_interval_ms {
        config.host.tick_interval_ms = ms;
    }
    let contents = format!("{}{}", HEADER, config.to_toml_string()?);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;

    match format {
        OutputFormat::Text => {
            let verb = if existed { "Overwrote" } else { "Created" };
            println!("{} {}", verb, path.display());
        }
        OutputFormat::Json => {
            let result = serde_json::json!({
                "success": true,
                "path": path.to_string_lossy(),
                "overwritten": existed,
            });
            println!("{}", serde_json::to_string(&result)?);
        }
    }

    Ok(())
}
