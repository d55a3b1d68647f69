use std::{collections::BTreeMap, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hive_core::{Access, Hive};
use hive_key::RegKey;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use super::{KeyCommand, util::KeyPath};

#[derive(Parser)]
#[command(no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    cmd: ShellCommand,
}

#[derive(Subcommand)]
enum ShellCommand {
    #[command(flatten)]
    Key(KeyCommand),
    /// Report changes to a key and everything below it
    Watch {
        /// Key path, e.g. `HKCU\Software\App`
        key: String,
    },
    /// Stop reporting changes to a key
    Unwatch {
        /// Key path, e.g. `HKCU\Software\App`
        key: String,
    },
    /// List watched keys
    Watches,
    /// Leave the shell
    #[command(alias = "quit")]
    Exit,
}

enum Flow {
    Continue,
    Exit,
}

/// Watched keys by their display path.
#[derive(Default)]
struct Watches {
    keys: BTreeMap<String, RegKey>,
}

impl Watches {
    fn add(&mut self, hive: &Arc<dyn Hive>, path: &str) -> Result<()> {
        let key_path = KeyPath::parse(path)?;
        let mut key = RegKey::new(hive.clone());
        key.open(key_path.hkey(), &key_path.path, Access::READ)
            .with_context(|| format!("failed to open {key_path}"))?;
        key.start_watching()
            .with_context(|| format!("failed to watch {key_path}"))?;
        self.keys.insert(key_path.to_string(), key);
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<bool> {
        let key_path = KeyPath::parse(path)?;
        Ok(self
            .keys
            .remove(&key_path.to_string())
            .is_some_and(|mut key| key.stop_watching()))
    }

    /// Prints every watched key that changed since the last poll and drops
    /// watches that could not be re-armed.
    fn report(&mut self) {
        self.keys.retain(|path, key| {
            if key.has_changed() {
                println!("changed: {path}");
            }
            if !key.is_watching() {
                println!("stopped watching {path}");
                return false;
            }
            true
        });
    }
}

fn execute(hive: &Arc<dyn Hive>, watches: &mut Watches, cmd: ShellCommand) -> Result<Flow> {
    match cmd {
        ShellCommand::Key(cmd) => cmd.run(hive.clone())?,
        ShellCommand::Watch { key } => watches.add(hive, &key)?,
        ShellCommand::Unwatch { key } => {
            if !watches.remove(&key)? {
                println!("{key} was not watched");
            }
        }
        ShellCommand::Watches => {
            for path in watches.keys.keys() {
                println!("{path}");
            }
        }
        ShellCommand::Exit => return Ok(Flow::Exit),
    }
    Ok(Flow::Continue)
}

/// Runs whitespace-separated commands from stdin until `exit`, end of
/// input, or Ctrl-C.
pub async fn run_shell(hive: Arc<dyn Hive>) -> Result<()> {
    let mut watches = Watches::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read from stdin")?,
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl-C")?;
                None
            }
        };
        let Some(line) = line else {
            break;
        };

        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() || words[0].starts_with('#') {
            continue;
        }
        let cmd = match ShellLine::try_parse_from(words) {
            Ok(parsed) => parsed.cmd,
            Err(err) => {
                // Help and usage errors alike.
                if let Err(err) = err.print() {
                    debug!("failed to print usage: {err}");
                }
                continue;
            }
        };

        match execute(&hive, &mut watches, cmd) {
            Ok(Flow::Exit) => break,
            Ok(Flow::Continue) => {}
            Err(err) => eprintln!("error: {err:#}"),
        }
        watches.report();
    }
    Ok(())
}
