//! Tree nodes of one generation.
//!
//! Nodes live in an arena owned by their [`ScopeRoot`](crate::ScopeRoot) and
//! refer to each other by [`TreeNodeId`]. Ids are arena indices, allocated in
//! depth-first construction order, so every descendant of a node has a larger id
//! than the node itself.

use std::fmt;

use crate::collections::map::HashMap;
use crate::component::ComponentRef;
use crate::handle::ScopeHandle;
use crate::key::ScopeKey;

/// Identifier of a node, unique within one generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeNodeId(u32);

impl TreeNodeId {
    /// The owner node at the top of every generation.
    pub const ROOT: TreeNodeId = TreeNodeId(0);

    pub(crate) fn from_index(index: usize) -> Self {
        let raw = u32::try_from(index).expect("tree node arena exceeded u32::MAX nodes");
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Child storage of a node.
///
/// Most nodes have zero or one child; only the `Many` case allocates.
#[derive(Default)]
pub enum NodeChildren {
    #[default]
    None,
    One(TreeNodeId),
    Many(ManyChildren),
}

/// Children of a node with more than one child, with a key index for O(1)
/// lookup. The index keeps the first child registered under a key.
pub struct ManyChildren {
    ids: Vec<TreeNodeId>,
    by_key: HashMap<ScopeKey, TreeNodeId>,
}

impl NodeChildren {
    pub fn as_slice(&self) -> &[TreeNodeId] {
        match self {
            NodeChildren::None => &[],
            NodeChildren::One(id) => std::slice::from_ref(id),
            NodeChildren::Many(many) => &many.ids,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Appends `child`. `existing_key` is the key of the current single child
    /// and is only consulted on the `One` -> `Many` transition.
    fn push(&mut self, child: TreeNodeId, key: &ScopeKey, existing_key: Option<&ScopeKey>) {
        match std::mem::take(self) {
            NodeChildren::None => *self = NodeChildren::One(child),
            NodeChildren::One(first) => {
                let mut by_key = HashMap::default();
                if let Some(first_key) = existing_key {
                    by_key.insert(first_key.clone(), first);
                }
                by_key.entry(key.clone()).or_insert(child);
                *self = NodeChildren::Many(ManyChildren {
                    ids: vec![first, child],
                    by_key,
                });
            }
            NodeChildren::Many(mut many) => {
                many.ids.push(child);
                many.by_key.entry(key.clone()).or_insert(child);
                *self = NodeChildren::Many(many);
            }
        }
    }

    /// Removes `child`, which must be the most recently pushed child.
    fn pop(&mut self, child: TreeNodeId, key: &ScopeKey) {
        match self {
            NodeChildren::None => {}
            NodeChildren::One(id) => {
                if *id == child {
                    *self = NodeChildren::None;
                }
            }
            NodeChildren::Many(many) => {
                if many.ids.last() == Some(&child) {
                    many.ids.pop();
                }
                if many.by_key.get(key) == Some(&child) {
                    many.by_key.remove(key);
                }
            }
        }
    }

    fn find_in_many(&self, key: &ScopeKey) -> Option<TreeNodeId> {
        match self {
            NodeChildren::Many(many) => many.by_key.get(key).copied(),
            _ => None,
        }
    }
}

/// One node of a generation.
///
/// The root node has no key, handle or component; every other node gets its
/// handle and component when its construction finishes.
pub struct TreeNode {
    id: TreeNodeId,
    key: Option<ScopeKey>,
    parent: Option<TreeNodeId>,
    scoped: bool,
    handle: Option<ScopeHandle>,
    component: Option<ComponentRef>,
    children: NodeChildren,
}

impl TreeNode {
    fn root() -> Self {
        Self {
            id: TreeNodeId::ROOT,
            key: None,
            parent: None,
            scoped: false,
            handle: None,
            component: None,
            children: NodeChildren::None,
        }
    }

    pub fn id(&self) -> TreeNodeId {
        self.id
    }

    pub fn is_root(&self) -> bool {
        self.id == TreeNodeId::ROOT
    }

    pub fn key(&self) -> Option<&ScopeKey> {
        self.key.as_ref()
    }

    pub fn parent(&self) -> Option<TreeNodeId> {
        self.parent
    }

    /// Whether the component declared a scope (state, controller or
    /// `.scoped()`), making its identity independent of sibling order.
    pub fn is_scoped(&self) -> bool {
        self.scoped
    }

    pub fn handle(&self) -> Option<&ScopeHandle> {
        self.handle.as_ref()
    }

    pub fn component(&self) -> Option<&ComponentRef> {
        self.component.as_ref()
    }

    pub fn children(&self) -> &[TreeNodeId] {
        self.children.as_slice()
    }

    pub fn child_storage(&self) -> &NodeChildren {
        &self.children
    }
}

impl fmt::Debug for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeNode")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("parent", &self.parent)
            .field("children", &self.children.as_slice())
            .finish()
    }
}

/// Arena of nodes for one generation. Index 0 is always the root node.
pub(crate) struct NodeArena {
    nodes: Vec<TreeNode>,
}

impl NodeArena {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![TreeNode::root()],
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn get(&self, id: TreeNodeId) -> Option<&TreeNode> {
        self.nodes.get(id.index())
    }

    pub(crate) fn iter(&self) -> std::slice::Iter<'_, TreeNode> {
        self.nodes.iter()
    }

    /// Child of `parent` registered under `key`, first match wins.
    pub(crate) fn child_with_key(&self, parent: TreeNodeId, key: &ScopeKey) -> Option<TreeNodeId> {
        let node = self.get(parent)?;
        match &node.children {
            NodeChildren::None => None,
            NodeChildren::One(child) => {
                let child_node = self.get(*child)?;
                (child_node.key.as_ref() == Some(key)).then_some(*child)
            }
            many => many.find_in_many(key),
        }
    }

    /// Allocates a node under `parent` and links it as its last child.
    pub(crate) fn alloc(&mut self, parent: TreeNodeId, key: ScopeKey, scoped: bool) -> TreeNodeId {
        let id = TreeNodeId::from_index(self.nodes.len());
        let existing_key = match self.nodes[parent.index()].children {
            NodeChildren::One(first) => self.nodes[first.index()].key.clone(),
            _ => None,
        };
        self.nodes[parent.index()]
            .children
            .push(id, &key, existing_key.as_ref());
        self.nodes.push(TreeNode {
            id,
            key: Some(key),
            parent: Some(parent),
            scoped,
            handle: None,
            component: None,
            children: NodeChildren::None,
        });
        id
    }

    pub(crate) fn finalize(&mut self, id: TreeNodeId, handle: ScopeHandle, component: ComponentRef) {
        let node = &mut self.nodes[id.index()];
        debug_assert!(node.component.is_none(), "tree node {id:?} finalized twice");
        node.handle = Some(handle);
        node.component = Some(component);
    }

    /// Drops `id` and everything allocated after it, unlinking it from its
    /// parent. Only valid for the most recently opened node on the cursor.
    pub(crate) fn abandon(&mut self, id: TreeNodeId) {
        if id == TreeNodeId::ROOT || id.index() >= self.nodes.len() {
            return;
        }
        let (parent, key) = {
            let node = &self.nodes[id.index()];
            (node.parent, node.key.clone())
        };
        self.nodes.truncate(id.index());
        if let (Some(parent), Some(key)) = (parent, key) {
            self.nodes[parent.index()].children.pop(id, &key);
        }
    }
}
