//! RedbHive - A persistent hive backed by redb.

use bytes::Bytes;
use hive_core::{
    Access, Disposition, HKey, Hive, HiveError, HiveFeatures, HiveResult, KeyInfo, NotifyFilter,
    RawValue, RootKey, ValueType, WaitEvent,
    handles::{HandleTable, OpenHandle},
    path,
    watch::WatchList,
};
use redb::{Database, ReadableDatabase, ReadableTable, Table, TableDefinition};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::debug;

/// Folded node path -> (display name, generation). Roots have no row.
const NODES: TableDefinition<&str, (&str, u64)> = TableDefinition::new("nodes");

/// (folded node path, folded value name) -> (type code, display name, payload).
const VALUES: TableDefinition<(&str, &str), (u32, &str, &[u8])> = TableDefinition::new("values");

/// Hive-wide counters.
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_GENERATION: &str = "next_generation";

/// Generation of the predefined roots, which are never deleted.
const ROOT_GENERATION: u64 = 0;

const FILE_NAME: &str = "hive.redb";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct RedbHiveConfig {
    /// Directory holding `hive.redb`.
    pub path: String,
}

/// A hive persisted to a single redb file.
///
/// Every mutating call runs in its own write transaction. Subkeys and values
/// both enumerate in case-folded name order. Change registrations are kept
/// in process: writes made by another process are not observed.
pub struct RedbHive {
    db: Arc<Database>,
    handles: HandleTable<NodeRef>,
    watches: WatchList,
}

/// The node an open handle refers to. Every created node gets a fresh
/// generation, so a handle to a deleted node stays dead even after another
/// node is created at the same path.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NodeRef {
    path: String,
    generation: u64,
}

trait OrBackend<T> {
    fn or_backend(self) -> HiveResult<T>;
}

impl<T, E: Into<redb::Error>> OrBackend<T> for Result<T, E> {
    fn or_backend(self) -> HiveResult<T> {
        self.map_err(|err| {
            let err: redb::Error = err.into();
            HiveError::Backend(err.into())
        })
    }
}

impl RedbHive {
    /// Opens (or creates) the hive file inside the directory `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> HiveResult<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(|err| HiveError::Backend(err.into()))?;
        let db = Database::create(path.join(FILE_NAME)).or_backend()?;

        // Tables must exist before the first read transaction opens them;
        // `open_table` on a write transaction creates them.
        {
            let write_txn = db.begin_write().or_backend()?;
            {
                let _ = write_txn.open_table(NODES).or_backend()?;
                let _ = write_txn.open_table(VALUES).or_backend()?;
                let _ = write_txn.open_table(META).or_backend()?;
            }
            write_txn.commit().or_backend()?;
        }

        debug!(path = %path.display(), "opened redb hive");
        Ok(Self {
            db: Arc::new(db),
            handles: HandleTable::new(),
            watches: WatchList::new(),
        })
    }

    pub fn create(config: RedbHiveConfig) -> HiveResult<Self> {
        Self::open(PathBuf::from(config.path))
    }

    /// Number of handles currently open, predefined roots excluded.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Number of armed change registrations.
    pub fn pending_watches(&self) -> usize {
        self.watches.len()
    }

    fn resolve(&self, key: HKey) -> HiveResult<OpenHandle<NodeRef>> {
        match key.root() {
            Some(root) => Ok(OpenHandle {
                node: NodeRef {
                    path: path::root_path(root),
                    generation: ROOT_GENERATION,
                },
                access: Access::ALL_ACCESS,
            }),
            None => self.handles.get(key),
        }
    }
}

impl std::fmt::Debug for RedbHive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbHive")
            .field("open_handles", &self.handles.len())
            .finish()
    }
}

fn check_access(access: Access) -> HiveResult<()> {
    if access.is_empty() {
        return Err(HiveError::InvalidParameter("access mask must not be empty"));
    }
    Ok(())
}

fn is_root_path(node: &str) -> bool {
    RootKey::ALL
        .into_iter()
        .any(|root| path::root_path(root) == node)
}

/// Generation of the node at the folded path `node`, if there is one.
fn generation_of<T>(nodes: &T, node: &str) -> HiveResult<Option<u64>>
where
    T: ReadableTable<&'static str, (&'static str, u64)>,
{
    if is_root_path(node) {
        return Ok(Some(ROOT_GENERATION));
    }
    Ok(nodes.get(node).or_backend()?.map(|row| row.value().1))
}

/// Fails with `KeyDeleted` if the node behind an open handle is gone or
/// has been replaced by a newer node at the same path.
fn ensure_live<T>(nodes: &T, node: &NodeRef) -> HiveResult<()>
where
    T: ReadableTable<&'static str, (&'static str, u64)>,
{
    if generation_of(nodes, &node.path)? == Some(node.generation) {
        Ok(())
    } else {
        Err(HiveError::KeyDeleted)
    }
}

fn allocate_generation(meta: &mut Table<'_, &'static str, u64>) -> HiveResult<u64> {
    let generation = meta
        .get(NEXT_GENERATION)
        .or_backend()?
        .map_or(ROOT_GENERATION + 1, |next| next.value());
    meta.insert(NEXT_GENERATION, generation + 1).or_backend()?;
    Ok(generation)
}

/// Every node at or below `node`, as folded paths.
fn subtree<T>(nodes: &T, node: &str) -> HiveResult<Vec<String>>
where
    T: ReadableTable<&'static str, (&'static str, u64)>,
{
    let mut out = Vec::new();
    for entry in nodes.range(node..).or_backend()? {
        let (key, _) = entry.or_backend()?;
        let key = key.value();
        if !path::is_within(key, node) {
            if key.starts_with(node) {
                // A sibling such as `node2` sorts between `node` and `node\`.
                continue;
            }
            break;
        }
        out.push(key.to_string());
    }
    Ok(out)
}

/// Display names of the direct children of `node`, in folded order.
fn children<T>(nodes: &T, node: &str) -> HiveResult<Vec<String>>
where
    T: ReadableTable<&'static str, (&'static str, u64)>,
{
    let prefix = path::join(node, "");
    let mut out = Vec::new();
    for entry in nodes.range(prefix.as_str()..).or_backend()? {
        let (key, row) = entry.or_backend()?;
        let Some(rest) = key.value().strip_prefix(prefix.as_str()) else {
            break;
        };
        if !rest.contains(path::SEPARATOR) {
            let (name, _) = row.value();
            out.push(name.to_string());
        }
    }
    Ok(out)
}

/// Folded names and decoded values stored directly under `node`.
fn values_of<T>(values: &T, node: &str) -> HiveResult<Vec<(String, String, RawValue)>>
where
    T: ReadableTable<(&'static str, &'static str), (u32, &'static str, &'static [u8])>,
{
    let mut out = Vec::new();
    for entry in values.range((node, "")..).or_backend()? {
        let (key, value) = entry.or_backend()?;
        let (owner, folded) = key.value();
        if owner != node {
            break;
        }
        let (code, name, data) = value.value();
        out.push((folded.to_string(), name.to_string(), decode(code, data)?));
    }
    Ok(out)
}

fn decode(code: u32, data: &[u8]) -> HiveResult<RawValue> {
    let value_type = ValueType::from_code(code).ok_or_else(|| {
        HiveError::Backend(anyhow::anyhow!("unknown value type code {code} in hive"))
    })?;
    Ok(RawValue::new(value_type, Bytes::copy_from_slice(data)))
}

impl Hive for RedbHive {
    fn open_key(&self, parent: HKey, path: &str, access: Access) -> HiveResult<HKey> {
        check_access(access)?;
        let components = path::split_path(path)?;
        let parent = self.resolve(parent)?;

        let read_txn = self.db.begin_read().or_backend()?;
        let nodes = read_txn.open_table(NODES).or_backend()?;
        ensure_live(&nodes, &parent.node)?;

        let target = components
            .iter()
            .fold(parent.node.path, |node, component| {
                path::join(&node, &path::fold(component))
            });
        let generation = generation_of(&nodes, &target)?.ok_or(HiveError::NotFound)?;
        Ok(self.handles.insert(
            NodeRef {
                path: target,
                generation,
            },
            access,
        ))
    }

    fn create_key(
        &self,
        parent: HKey,
        path: &str,
        access: Access,
    ) -> HiveResult<(HKey, Disposition)> {
        check_access(access)?;
        let components = path::split_path(path)?;
        let parent = self.resolve(parent)?;
        let mut changed_parents = Vec::new();
        let mut current = parent.node.clone();

        let write_txn = self.db.begin_write().or_backend()?;
        {
            let mut nodes = write_txn.open_table(NODES).or_backend()?;
            let mut meta = write_txn.open_table(META).or_backend()?;
            ensure_live(&nodes, &current)?;
            for component in components {
                let next = path::join(&current.path, &path::fold(component));
                let generation = match generation_of(&nodes, &next)? {
                    Some(generation) => generation,
                    None => {
                        parent.require(Access::CREATE_SUB_KEY)?;
                        let generation = allocate_generation(&mut meta)?;
                        nodes
                            .insert(next.as_str(), (component, generation))
                            .or_backend()?;
                        changed_parents.push(current.path.clone());
                        generation
                    }
                };
                current = NodeRef {
                    path: next,
                    generation,
                };
            }
        }
        write_txn.commit().or_backend()?;

        let disposition = if changed_parents.is_empty() {
            Disposition::OpenedExistingKey
        } else {
            debug!(path, created = changed_parents.len(), "created keys");
            Disposition::CreatedNewKey
        };
        for parent_path in changed_parents {
            self.watches.notify(&parent_path, NotifyFilter::NAME);
        }
        Ok((self.handles.insert(current, access), disposition))
    }

    fn close_key(&self, key: HKey) -> HiveResult<()> {
        if key.is_predefined() {
            return Ok(());
        }
        self.handles.remove(key)?;
        self.watches.remove_owner(key);
        Ok(())
    }

    fn query_info(&self, key: HKey) -> HiveResult<KeyInfo> {
        let handle = self.resolve(key)?;
        let read_txn = self.db.begin_read().or_backend()?;
        let nodes = read_txn.open_table(NODES).or_backend()?;
        ensure_live(&nodes, &handle.node)?;
        handle.require(Access::QUERY_VALUE)?;

        let values = read_txn.open_table(VALUES).or_backend()?;
        Ok(KeyInfo {
            subkeys: children(&nodes, &handle.node.path)?.len() as u32,
            values: values_of(&values, &handle.node.path)?.len() as u32,
        })
    }

    fn enum_value(&self, key: HKey, index: u32) -> HiveResult<(String, RawValue)> {
        let handle = self.resolve(key)?;
        let read_txn = self.db.begin_read().or_backend()?;
        let nodes = read_txn.open_table(NODES).or_backend()?;
        ensure_live(&nodes, &handle.node)?;
        handle.require(Access::QUERY_VALUE)?;

        let values = read_txn.open_table(VALUES).or_backend()?;
        values_of(&values, &handle.node.path)?
            .into_iter()
            .nth(index as usize)
            .map(|(_, name, value)| (name, value))
            .ok_or(HiveError::NotFound)
    }

    fn enum_key(&self, key: HKey, index: u32) -> HiveResult<String> {
        let handle = self.resolve(key)?;
        let read_txn = self.db.begin_read().or_backend()?;
        let nodes = read_txn.open_table(NODES).or_backend()?;
        ensure_live(&nodes, &handle.node)?;
        handle.require(Access::ENUMERATE_SUB_KEYS)?;

        children(&nodes, &handle.node.path)?
            .into_iter()
            .nth(index as usize)
            .ok_or(HiveError::NotFound)
    }

    fn query_value(&self, key: HKey, name: &str) -> HiveResult<RawValue> {
        let handle = self.resolve(key)?;
        let read_txn = self.db.begin_read().or_backend()?;
        let nodes = read_txn.open_table(NODES).or_backend()?;
        ensure_live(&nodes, &handle.node)?;
        handle.require(Access::QUERY_VALUE)?;

        let values = read_txn.open_table(VALUES).or_backend()?;
        let folded = path::fold(name);
        let guard = values
            .get((handle.node.path.as_str(), folded.as_str()))
            .or_backend()?
            .ok_or(HiveError::NotFound)?;
        let (code, _, data) = guard.value();
        decode(code, data)
    }

    fn query_value_type(&self, key: HKey, name: &str) -> HiveResult<ValueType> {
        let handle = self.resolve(key)?;
        let read_txn = self.db.begin_read().or_backend()?;
        let nodes = read_txn.open_table(NODES).or_backend()?;
        ensure_live(&nodes, &handle.node)?;
        handle.require(Access::QUERY_VALUE)?;

        let values = read_txn.open_table(VALUES).or_backend()?;
        let folded = path::fold(name);
        let guard = values
            .get((handle.node.path.as_str(), folded.as_str()))
            .or_backend()?
            .ok_or(HiveError::NotFound)?;
        let (code, _, _) = guard.value();
        ValueType::from_code(code).ok_or_else(|| {
            HiveError::Backend(anyhow::anyhow!("unknown value type code {code} in hive"))
        })
    }

    fn set_value(&self, key: HKey, name: &str, value: RawValue) -> HiveResult<()> {
        let handle = self.resolve(key)?;
        let folded = path::fold(name);

        let write_txn = self.db.begin_write().or_backend()?;
        {
            let nodes = write_txn.open_table(NODES).or_backend()?;
            ensure_live(&nodes, &handle.node)?;
            handle.require(Access::SET_VALUE)?;

            let mut values = write_txn.open_table(VALUES).or_backend()?;
            values
                .insert(
                    (handle.node.path.as_str(), folded.as_str()),
                    (value.value_type.code(), name, value.data.as_ref()),
                )
                .or_backend()?;
        }
        write_txn.commit().or_backend()?;

        self.watches.notify(&handle.node.path, NotifyFilter::LAST_SET);
        Ok(())
    }

    fn delete_value(&self, key: HKey, name: &str) -> HiveResult<()> {
        let handle = self.resolve(key)?;
        let folded = path::fold(name);

        let write_txn = self.db.begin_write().or_backend()?;
        {
            let nodes = write_txn.open_table(NODES).or_backend()?;
            ensure_live(&nodes, &handle.node)?;
            handle.require(Access::SET_VALUE)?;

            let mut values = write_txn.open_table(VALUES).or_backend()?;
            let removed = values
                .remove((handle.node.path.as_str(), folded.as_str()))
                .or_backend()?;
            if removed.is_none() {
                return Err(HiveError::NotFound);
            }
        }
        write_txn.commit().or_backend()?;

        self.watches.notify(&handle.node.path, NotifyFilter::LAST_SET);
        Ok(())
    }

    fn delete_tree(&self, key: HKey, subkey: &str) -> HiveResult<()> {
        let components = path::split_path(subkey)?;
        if components.is_empty() {
            return Err(HiveError::InvalidParameter("subkey name must not be empty"));
        }
        let handle = self.resolve(key)?;
        let target = components
            .iter()
            .fold(handle.node.path.clone(), |node, component| {
                path::join(&node, &path::fold(component))
            });

        let write_txn = self.db.begin_write().or_backend()?;
        let removed = {
            let mut nodes = write_txn.open_table(NODES).or_backend()?;
            ensure_live(&nodes, &handle.node)?;
            handle.require(Access::SET_VALUE)?;
            if generation_of(&nodes, &target)?.is_none() {
                return Err(HiveError::NotFound);
            }

            let doomed = subtree(&nodes, &target)?;
            let mut values = write_txn.open_table(VALUES).or_backend()?;
            for node in &doomed {
                for (folded, _, _) in values_of(&values, node)? {
                    values
                        .remove((node.as_str(), folded.as_str()))
                        .or_backend()?;
                }
                nodes.remove(node.as_str()).or_backend()?;
            }
            doomed.len()
        };
        write_txn.commit().or_backend()?;
        debug!(path = %target, nodes = removed, "deleted key tree");

        self.watches.notify_removed(&target);
        if let Some(parent) = path::parent(&target) {
            self.watches.notify(parent, NotifyFilter::NAME);
        }
        Ok(())
    }

    fn notify_change(
        &self,
        key: HKey,
        watch_subtree: bool,
        filter: NotifyFilter,
        event: &Arc<WaitEvent>,
    ) -> HiveResult<()> {
        let handle = self.resolve(key)?;
        let read_txn = self.db.begin_read().or_backend()?;
        let nodes = read_txn.open_table(NODES).or_backend()?;
        ensure_live(&nodes, &handle.node)?;
        handle.require(Access::NOTIFY)?;

        self.watches
            .register(key, handle.node.path, watch_subtree, filter, event);
        Ok(())
    }

    fn cancel_notify(&self, key: HKey, event: &Arc<WaitEvent>) -> HiveResult<()> {
        self.watches.cancel(key, event);
        Ok(())
    }

    fn features(&self) -> HiveFeatures {
        HiveFeatures {
            persistent: true,
            case_sensitive: false,
        }
    }
}
