//! Render command implementation

use anyhow::{Context, Result};
use std::path::PathBuf;
use webticker::pipeline;

pub fn run(input: PathBuf, html_output: PathBuf) -> Result<()> {
    pipeline::rerender_dashboard(&input, &html_output)
        .with_context(|| format!("Failed to render dashboard from {}", input.display()))?;
    println!("Dashboard written to {}", html_output.display());
    Ok(())
}
