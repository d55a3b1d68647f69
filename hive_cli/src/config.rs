use std::{path::Path, sync::Arc};

use anyhow::Context;
use hive_core::Hive;
use hive_store_memory::MemoryHive;
use hive_store_redb::{RedbHive, RedbHiveConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HiveConfig {
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum StoreConfig {
    Redb(RedbHiveConfig),
    /// Nothing is kept once the command exits.
    Memory,
}

impl HiveConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let toml_content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "failed to read config file {}; run `hive config init` first",
                path.display()
            )
        })?;
        toml::from_str(&toml_content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }
}

pub fn open_hive(config: StoreConfig) -> anyhow::Result<Arc<dyn Hive>> {
    let hive: Arc<dyn Hive> = match config {
        StoreConfig::Redb(config) => {
            let path = config.path.clone();
            Arc::new(
                RedbHive::create(config)
                    .with_context(|| format!("failed to open hive at {path}"))?,
            )
        }
        StoreConfig::Memory => MemoryHive::shared(),
    };
    Ok(hive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_store() {
        let config: HiveConfig = toml::from_str(
            r#"
            [store]
            type = "redb"
            path = "/tmp/hive"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.store,
            StoreConfig::Redb(RedbHiveConfig {
                path: "/tmp/hive".into()
            })
        );

        let config: HiveConfig = toml::from_str("[store]\ntype = \"memory\"\n").unwrap();
        assert_eq!(config.store, StoreConfig::Memory);
    }
}
