use crate::models::GateConfig;
use crate::Result;
use anyhow::Context;
use colored::Colorize;
use std::path::Path;

/// Write a default config file
pub async fn run(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!(
            "{}",
            format!("⚠ {} already exists (use --force to overwrite)", path.display()).yellow()
        );
        return Ok(());
    }

    GateConfig::default()
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("{}", format!("✓ Wrote {}", path.display()).green());
    Ok(())
}
