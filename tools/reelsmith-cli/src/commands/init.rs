//! Write a default config file.

use reelsmith_common::config::{config_file_path, AppConfig};

pub fn run(force: bool) -> anyhow::Result<()> {
    let path = config_file_path();
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    let path = AppConfig::default().save()?;
    println!("Wrote default config to {}", path.display());
    println!("Storage can also be set with REELSMITH_STORAGE_UPLOAD_URL and REELSMITH_STORAGE_PUBLIC_URL.");
    Ok(())
}
