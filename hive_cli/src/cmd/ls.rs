use std::sync::Arc;

use anyhow::{Context, Result};
use hive_core::{Access, Hive};
use hive_key::{KeyIterator, RegKey, ValueIterator};

use super::util::{KeyPath, display_value};

pub fn run_ls(hive: Arc<dyn Hive>, path: &str) -> Result<()> {
    let key_path = KeyPath::parse(path)?;

    // A missing key is an error, not an empty listing.
    let mut key = RegKey::new(hive.clone());
    key.open(key_path.hkey(), &key_path.path, Access::READ)
        .with_context(|| format!("failed to open {key_path}"))?;

    // Enumerators walk from the highest index down.
    let mut subkeys: Vec<String> =
        KeyIterator::new(hive.clone(), key_path.hkey(), &key_path.path).collect();
    subkeys.reverse();
    for name in subkeys {
        println!("{name}\\");
    }

    let mut values: Vec<_> = ValueIterator::new(hive, key_path.hkey(), &key_path.path).collect();
    values.reverse();
    for (name, value) in values {
        let name = if name.is_empty() {
            "(default)"
        } else {
            name.as_str()
        };
        println!("{name}\t{}\t{}", value.value_type, display_value(&value));
    }
    Ok(())
}
