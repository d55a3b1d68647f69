use std::sync::Arc;

use anyhow::{Context, Result};
use hive_core::{Access, Hive, ValueType};
use hive_key::RegKey;

use super::util::KeyPath;

pub fn run_get(hive: Arc<dyn Hive>, path: &str, name: &str) -> Result<()> {
    let key_path = KeyPath::parse(path)?;
    let mut key = RegKey::new(hive);
    key.open(key_path.hkey(), &key_path.path, Access::READ)
        .with_context(|| format!("failed to open {key_path}"))?;

    let raw = key
        .read_raw_value(name)
        .with_context(|| format!("failed to read value '{name}' of {key_path}"))?;
    let text = match raw.value_type {
        ValueType::String | ValueType::ExpandString => key
            .read_value(name)
            .with_context(|| format!("failed to read value '{name}' of {key_path}"))?,
        ValueType::Dword => key.read_value_dw(name)?.to_string(),
        ValueType::Binary => hex::encode(&raw.data),
    };
    println!("{text}");
    Ok(())
}
