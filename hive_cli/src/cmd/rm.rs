use std::sync::Arc;

use anyhow::{Context, Result};
use hive_core::{Access, Hive};
use hive_key::RegKey;
use tracing::info;

use super::util::KeyPath;

pub fn run_rm(hive: Arc<dyn Hive>, path: &str, value: Option<&str>) -> Result<()> {
    let key_path = KeyPath::parse(path)?;
    let mut key = RegKey::new(hive);

    match value {
        Some(name) => {
            key.open(key_path.hkey(), &key_path.path, Access::READ | Access::SET_VALUE)
                .with_context(|| format!("failed to open {key_path}"))?;
            key.delete_value(name)
                .with_context(|| format!("failed to delete value '{name}' of {key_path}"))?;
            info!(key = %key_path, name, "deleted value");
        }
        None => {
            let (parent, leaf) = key_path.split_leaf()?;
            key.open(parent.hkey(), &parent.path, Access::READ | Access::SET_VALUE)
                .with_context(|| format!("failed to open {parent}"))?;
            key.delete_key(leaf)
                .with_context(|| format!("failed to delete {key_path}"))?;
            info!(key = %key_path, "deleted key");
        }
    }
    Ok(())
}
