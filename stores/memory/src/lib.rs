use hive_core::{
    Access, Disposition, HKey, Hive, HiveError, HiveFeatures, HiveResult, KeyInfo, NotifyFilter,
    RawValue, RootKey, ValueType, WaitEvent,
    handles::{HandleTable, OpenHandle},
    path,
    watch::WatchList,
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use tracing::debug;

type NodeId = u64;

#[derive(Debug)]
struct Node {
    name: String,
    /// Folded full path, used to address change registrations.
    path: String,
    parent: Option<NodeId>,
    /// Folded name -> child, which keeps subkeys in name order.
    children: BTreeMap<String, NodeId>,
    /// Insertion order.
    values: Vec<(String, RawValue)>,
}

impl Node {
    fn value_position(&self, name: &str) -> Option<usize> {
        let folded = path::fold(name);
        self.values
            .iter()
            .position(|(existing, _)| path::fold(existing) == folded)
    }
}

#[derive(Debug)]
struct Tree {
    nodes: HashMap<NodeId, Node>,
    roots: HashMap<RootKey, NodeId>,
    next_id: NodeId,
}

impl Tree {
    fn new() -> Self {
        let mut tree = Tree {
            nodes: HashMap::new(),
            roots: HashMap::new(),
            next_id: 0,
        };
        for root in RootKey::ALL {
            let id = tree.alloc(Node {
                name: root.name().to_string(),
                path: path::root_path(root),
                parent: None,
                children: BTreeMap::new(),
                values: Vec::new(),
            });
            tree.roots.insert(root, id);
        }
        tree
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    fn node(&self, id: NodeId) -> HiveResult<&Node> {
        self.nodes.get(&id).ok_or(HiveError::KeyDeleted)
    }

    fn node_mut(&mut self, id: NodeId) -> HiveResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(HiveError::KeyDeleted)
    }

    fn child(&self, id: NodeId, name: &str) -> HiveResult<Option<NodeId>> {
        Ok(self.node(id)?.children.get(&path::fold(name)).copied())
    }

    fn walk(&self, start: NodeId, components: &[&str]) -> HiveResult<NodeId> {
        let mut current = start;
        self.node(current)?;
        for component in components {
            current = self.child(current, component)?.ok_or(HiveError::NotFound)?;
        }
        Ok(current)
    }

    fn collect_subtree(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        if let Some(node) = self.nodes.get(&id) {
            for &child in node.children.values() {
                self.collect_subtree(child, out);
            }
        }
    }
}

/// A hive that lives entirely in memory.
///
/// Subkeys enumerate in case-folded name order, values in insertion order.
/// Contents are lost when the hive is dropped.
#[derive(Debug)]
pub struct MemoryHive {
    tree: RwLock<Tree>,
    handles: HandleTable<NodeId>,
    watches: WatchList,
}

impl MemoryHive {
    /// Creates a new hive holding only the empty predefined roots.
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(Tree::new()),
            handles: HandleTable::new(),
            watches: WatchList::new(),
        }
    }

    /// Shorthand for `Arc::new(MemoryHive::new())`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of handles currently open, predefined roots excluded.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Number of armed change registrations.
    pub fn pending_watches(&self) -> usize {
        self.watches.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tree> {
        self.tree.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tree> {
        self.tree.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, tree: &Tree, key: HKey) -> HiveResult<OpenHandle<NodeId>> {
        match key.root() {
            Some(root) => {
                let node = *tree
                    .roots
                    .get(&root)
                    .ok_or(HiveError::InvalidHandle(key))?;
                Ok(OpenHandle {
                    node,
                    access: Access::ALL_ACCESS,
                })
            }
            None => self.handles.get(key),
        }
    }
}

impl Default for MemoryHive {
    fn default() -> Self {
        Self::new()
    }
}

fn check_access(access: Access) -> HiveResult<()> {
    if access.is_empty() {
        return Err(HiveError::InvalidParameter("access mask must not be empty"));
    }
    Ok(())
}

impl Hive for MemoryHive {
    fn open_key(&self, parent: HKey, path: &str, access: Access) -> HiveResult<HKey> {
        check_access(access)?;
        let components = path::split_path(path)?;
        let node = {
            let tree = self.read();
            let parent = self.resolve(&tree, parent)?;
            tree.walk(parent.node, &components)?
        };
        Ok(self.handles.insert(node, access))
    }

    fn create_key(
        &self,
        parent: HKey,
        path: &str,
        access: Access,
    ) -> HiveResult<(HKey, Disposition)> {
        check_access(access)?;
        let components = path::split_path(path)?;
        let mut changed_parents = Vec::new();

        let node = {
            let mut tree = self.write();
            let parent = self.resolve(&tree, parent)?;
            let mut current = parent.node;
            tree.node(current)?;

            for component in components {
                if let Some(child) = tree.child(current, component)? {
                    current = child;
                    continue;
                }
                parent.require(Access::CREATE_SUB_KEY)?;

                let folded = path::fold(component);
                let parent_path = tree.node(current)?.path.clone();
                let child = tree.alloc(Node {
                    name: component.to_string(),
                    path: path::join(&parent_path, &folded),
                    parent: Some(current),
                    children: BTreeMap::new(),
                    values: Vec::new(),
                });
                tree.node_mut(current)?.children.insert(folded, child);
                changed_parents.push(parent_path);
                current = child;
            }
            current
        };

        let disposition = if changed_parents.is_empty() {
            Disposition::OpenedExistingKey
        } else {
            debug!(path, created = changed_parents.len(), "created keys");
            Disposition::CreatedNewKey
        };
        for parent_path in changed_parents {
            self.watches.notify(&parent_path, NotifyFilter::NAME);
        }
        Ok((self.handles.insert(node, access), disposition))
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
        let tree = self.read();
        let handle = self.resolve(&tree, key)?;
        let node = tree.node(handle.node)?;
        handle.require(Access::QUERY_VALUE)?;
        Ok(KeyInfo {
            subkeys: node.children.len() as u32,
            values: node.values.len() as u32,
        })
    }

    fn enum_value(&self, key: HKey, index: u32) -> HiveResult<(String, RawValue)> {
        let tree = self.read();
        let handle = self.resolve(&tree, key)?;
        let node = tree.node(handle.node)?;
        handle.require(Access::QUERY_VALUE)?;
        node.values
            .get(index as usize)
            .cloned()
            .ok_or(HiveError::NotFound)
    }

    fn enum_key(&self, key: HKey, index: u32) -> HiveResult<String> {
        let tree = self.read();
        let handle = self.resolve(&tree, key)?;
        let node = tree.node(handle.node)?;
        handle.require(Access::ENUMERATE_SUB_KEYS)?;
        let child = node
            .children
            .values()
            .nth(index as usize)
            .ok_or(HiveError::NotFound)?;
        Ok(tree.node(*child)?.name.clone())
    }

    fn query_value(&self, key: HKey, name: &str) -> HiveResult<RawValue> {
        let tree = self.read();
        let handle = self.resolve(&tree, key)?;
        let node = tree.node(handle.node)?;
        handle.require(Access::QUERY_VALUE)?;
        let position = node.value_position(name).ok_or(HiveError::NotFound)?;
        Ok(node.values[position].1.clone())
    }

    fn query_value_type(&self, key: HKey, name: &str) -> HiveResult<ValueType> {
        let tree = self.read();
        let handle = self.resolve(&tree, key)?;
        let node = tree.node(handle.node)?;
        handle.require(Access::QUERY_VALUE)?;
        let position = node.value_position(name).ok_or(HiveError::NotFound)?;
        Ok(node.values[position].1.value_type)
    }

    fn set_value(&self, key: HKey, name: &str, value: RawValue) -> HiveResult<()> {
        let changed = {
            let mut tree = self.write();
            let handle = self.resolve(&tree, key)?;
            let node = tree.node_mut(handle.node)?;
            handle.require(Access::SET_VALUE)?;
            match node.value_position(name) {
                Some(position) => node.values[position].1 = value,
                None => node.values.push((name.to_string(), value)),
            }
            node.path.clone()
        };
        self.watches.notify(&changed, NotifyFilter::LAST_SET);
        Ok(())
    }

    fn delete_value(&self, key: HKey, name: &str) -> HiveResult<()> {
        let changed = {
            let mut tree = self.write();
            let handle = self.resolve(&tree, key)?;
            let node = tree.node_mut(handle.node)?;
            handle.require(Access::SET_VALUE)?;
            let position = node.value_position(name).ok_or(HiveError::NotFound)?;
            node.values.remove(position);
            node.path.clone()
        };
        self.watches.notify(&changed, NotifyFilter::LAST_SET);
        Ok(())
    }

    fn delete_tree(&self, key: HKey, subkey: &str) -> HiveResult<()> {
        let components = path::split_path(subkey)?;
        if components.is_empty() {
            return Err(HiveError::InvalidParameter("subkey name must not be empty"));
        }

        let (parent_path, removed_path) = {
            let mut tree = self.write();
            let handle = self.resolve(&tree, key)?;
            tree.node(handle.node)?;
            handle.require(Access::SET_VALUE)?;

            let target = tree.walk(handle.node, &components)?;
            let (parent, removed_path) = {
                let node = tree.node(target)?;
                let parent = node
                    .parent
                    .ok_or(HiveError::InvalidParameter("cannot delete a root key"))?;
                (parent, node.path.clone())
            };
            let mut doomed = Vec::new();
            tree.collect_subtree(target, &mut doomed);
            for id in &doomed {
                tree.nodes.remove(id);
            }

            let parent_node = tree.node_mut(parent)?;
            parent_node.children.retain(|_, child| *child != target);
            debug!(path = %removed_path, nodes = doomed.len(), "deleted key tree");
            (parent_node.path.clone(), removed_path)
        };

        self.watches.notify_removed(&removed_path);
        self.watches.notify(&parent_path, NotifyFilter::NAME);
        Ok(())
    }

    fn notify_change(
        &self,
        key: HKey,
        watch_subtree: bool,
        filter: NotifyFilter,
        event: &Arc<WaitEvent>,
    ) -> HiveResult<()> {
        let tree = self.read();
        let handle = self.resolve(&tree, key)?;
        let node = tree.node(handle.node)?;
        handle.require(Access::NOTIFY)?;
        self.watches
            .register(key, node.path.clone(), watch_subtree, filter, event);
        Ok(())
    }

    fn cancel_notify(&self, key: HKey, event: &Arc<WaitEvent>) -> HiveResult<()> {
        self.watches.cancel(key, event);
        Ok(())
    }

    fn features(&self) -> HiveFeatures {
        HiveFeatures {
            persistent: false,
            case_sensitive: false,
        }
    }
}
