use std::sync::Arc;

use anyhow::{Context, Result};
use hive_core::{Access, Disposition, Hive, ValueType};
use hive_key::RegKey;
use tracing::info;

use super::{
    ValueKind,
    util::{KeyPath, parse_dword},
};

pub fn run_set(
    hive: Arc<dyn Hive>,
    path: &str,
    name: &str,
    data: &str,
    kind: ValueKind,
) -> Result<()> {
    let key_path = KeyPath::parse(path)?;
    let mut key = RegKey::new(hive);
    let disposition = key
        .create_with_disposition(key_path.hkey(), &key_path.path, Access::ALL_ACCESS)
        .with_context(|| format!("failed to create {key_path}"))?;
    if matches!(disposition, Disposition::CreatedNewKey) {
        info!(key = %key_path, "created key");
    }

    match kind {
        ValueKind::String => key.write_value(name, data),
        ValueKind::Expand => key.write_expand_value(name, data),
        ValueKind::Dword => key.write_value_dw(name, parse_dword(data)?),
        ValueKind::Binary => {
            let bytes = hex::decode(data.trim()).context("binary data must be hex encoded")?;
            key.write_raw_value(name, bytes, ValueType::Binary)
        }
    }
    .with_context(|| format!("failed to write value '{name}' of {key_path}"))?;
    Ok(())
}
