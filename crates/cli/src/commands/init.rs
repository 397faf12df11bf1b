//! `mnemo init`: write a default config file.

use std::path::Path;

use anyhow::{Context, bail};
use mnemo_config::AppConfig;

pub fn run(config_path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => AppConfig::config_dir().join("config.toml"),
    };

    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, AppConfig::default_toml())
        .with_context(|| format!("failed to write {}", path.display()))?;

    println!("Wrote {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set OPENROUTER_API_KEY (or api_key in the file)");
    println!("  2. Add a [[gateway.users]] entry with a token and user_id");
    println!("  3. Run `mnemo serve`");
    Ok(())
}
