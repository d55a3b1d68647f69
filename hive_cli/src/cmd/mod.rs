use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use hive_core::Hive;

use crate::config::{HiveConfig, open_hive};

mod get;
mod ls;
mod rm;
mod set;
mod shell;
mod util;

pub use get::run_get;
pub use ls::run_ls;
pub use rm::run_rm;
pub use set::run_set;
pub use shell::run_shell;

/// Operations on a single key, available both as top-level commands and
/// inside `hive shell`.
#[derive(Subcommand)]
pub enum KeyCommand {
    /// Print a value
    Get {
        /// Key path, e.g. `HKCU\Software\App`
        key: String,
        /// Value name; the key's default value when omitted
        name: Option<String>,
    },
    /// Write a value, creating the key if needed
    Set {
        /// Key path, e.g. `HKCU\Software\App`
        key: String,
        name: String,
        data: String,
        #[arg(short, long, value_enum, default_value_t = ValueKind::String)]
        kind: ValueKind,
    },
    /// List the subkeys and values of a key
    Ls {
        /// Key path, e.g. `HKCU\Software\App`
        key: String,
    },
    /// Delete a key with everything below it, or a single value
    Rm {
        /// Key path, e.g. `HKCU\Software\App`
        key: String,
        /// Delete only this value
        #[arg(long, value_name = "NAME")]
        value: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ValueKind {
    String,
    /// string with `%NAME%` placeholders resolved on read
    Expand,
    /// 32-bit unsigned integer, decimal or `0x` hex
    Dword,
    /// hex encoded bytes
    Binary,
}

impl KeyCommand {
    pub fn run(self, hive: Arc<dyn Hive>) -> Result<()> {
        match self {
            KeyCommand::Get { key, name } => run_get(hive, &key, name.as_deref().unwrap_or("")),
            KeyCommand::Set {
                key,
                name,
                data,
                kind,
            } => run_set(hive, &key, &name, &data, kind),
            KeyCommand::Ls { key } => run_ls(hive, &key),
            KeyCommand::Rm { key, value } => run_rm(hive, &key, value.as_deref()),
        }
    }
}

fn load_hive(config_file: &Path) -> Result<Arc<dyn Hive>> {
    let config = HiveConfig::load(config_file)?;
    open_hive(config.store)
}

pub async fn run_command(
    config_file: PathBuf,
    local_data_dir: &Path,
    cmd: crate::Commands,
) -> Result<()> {
    match cmd {
        crate::Commands::Config { cmd } => cmd.run(config_file, local_data_dir),
        crate::Commands::Key(cmd) => cmd.run(load_hive(&config_file)?),
        crate::Commands::Shell => run_shell(load_hive(&config_file)?).await,
    }
}
