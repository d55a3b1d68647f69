use crate::init_config::CmdConfig;
use anyhow::Context;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::InfoLevel;
use directories::ProjectDirs;
use std::path::PathBuf;

mod cmd;
mod config;
mod init_config;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// config file to use instead of the default location
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<InfoLevel>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Modify the hive config
    Config {
        #[command(subcommand)]
        cmd: CmdConfig,
    },
    #[command(flatten)]
    Key(cmd::KeyCommand),
    /// Read commands from stdin against one open hive, reporting changes
    /// to watched keys after each command
    Shell,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    // Default layout:
    // - Config under: ~/.config/hive/config.toml
    // - Data under:   ~/.local/share/hive/
    let dirs =
        ProjectDirs::from("", "", "hive").context("failed to determine config directory path")?;

    let config_file = cli
        .config
        .unwrap_or_else(|| dirs.config_dir().join("config.toml"));

    cmd::run_command(config_file, dirs.data_dir(), cli.cmd).await
}
