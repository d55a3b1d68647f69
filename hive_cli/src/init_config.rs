use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use clap::Subcommand;
use toml_edit::{DocumentMut, Item, Table};
use tracing::info;

#[derive(Subcommand)]
pub enum CmdConfig {
    /// Creates the config file if it doesn't exist and points it at a redb
    /// hive in the data directory
    Init,
}

impl CmdConfig {
    pub fn run(self, config_file: PathBuf, local_data_dir: &Path) -> anyhow::Result<()> {
        let mut doc = if config_file.exists() {
            fs::read_to_string(&config_file)?
        } else {
            if let Some(parent) = config_file.parent() {
                fs::create_dir_all(parent)?;
            }
            "".to_owned()
        }
        .parse::<DocumentMut>()
        .context("could not parse config file")?;

        match self {
            Self::Init => {
                if doc.contains_key("store") {
                    info!("config file already has a store, leaving it unchanged");
                } else {
                    let hive_path = local_data_dir.join("hive");
                    let mut store_table = Table::new();
                    store_table.insert("type", "redb".into());
                    store_table.insert(
                        "path",
                        hive_path
                            .to_str()
                            .context("data directory is not valid UTF-8")?
                            .into(),
                    );
                    doc.insert("store", Item::Table(store_table));
                }
            }
        }

        info!("writing to config file {config_file:?}");

        let tmp_path = config_file.with_extension("tmp");
        let mut tmp = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.write_all(doc.to_string().as_bytes())?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, config_file)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HiveConfig, StoreConfig};

    #[test]
    fn init_writes_a_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("nested").join("config.toml");
        let data_dir = dir.path().join("data");

        CmdConfig::Init.run(config_file.clone(), &data_dir).unwrap();
        let config = HiveConfig::load(&config_file).unwrap();
        let StoreConfig::Redb(redb) = config.store else {
            panic!("expected a redb store");
        };
        assert_eq!(redb.path, data_dir.join("hive").to_str().unwrap());
        assert!(!config_file.with_extension("tmp").exists());
    }

    #[test]
    fn init_keeps_an_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("config.toml");
        fs::write(&config_file, "# mine\n[store]\ntype = \"memory\"\n").unwrap();

        CmdConfig::Init
            .run(config_file.clone(), dir.path())
            .unwrap();
        let text = fs::read_to_string(&config_file).unwrap();
        assert!(text.starts_with("# mine"));
        assert_eq!(HiveConfig::load(&config_file).unwrap().store, StoreConfig::Memory);
    }
}
