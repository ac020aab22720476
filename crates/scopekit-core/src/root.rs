//! Scope roots: the registry of one generation.

use std::fmt;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::collections::map::HashMap;
use crate::component::{Component, ComponentRef, Controller};
use crate::handle::{ScopeHandle, ScopeHandleId};
use crate::key::ScopeKey;
use crate::state::StateListener;
use crate::tree::{NodeArena, TreeNode, TreeNodeId};

static NEXT_ROOT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_FAMILY_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one generation. Fresh for every build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeRootId(u64);

impl ScopeRootId {
    fn next() -> Self {
        Self(NEXT_ROOT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Identifier shared by every generation of one logical tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootFamilyId(u64);

impl RootFamilyId {
    fn next() -> Self {
        Self(NEXT_FAMILY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Named test run against every component when it is registered.
#[derive(Clone, Copy)]
pub struct ComponentPredicate {
    name: &'static str,
    test: fn(&dyn Component) -> bool,
}

impl ComponentPredicate {
    pub const fn new(name: &'static str, test: fn(&dyn Component) -> bool) -> Self {
        Self { name, test }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn matches(&self, component: &dyn Component) -> bool {
        (self.test)(component)
    }
}

impl PartialEq for ComponentPredicate {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for ComponentPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentPredicate({})", self.name)
    }
}

/// Named test run against every controller when it is created or carried over.
#[derive(Clone, Copy)]
pub struct ControllerPredicate {
    name: &'static str,
    test: fn(&dyn Controller) -> bool,
}

impl ControllerPredicate {
    pub const fn new(name: &'static str, test: fn(&dyn Controller) -> bool) -> Self {
        Self { name, test }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn matches(&self, controller: &dyn Controller) -> bool {
        (self.test)(controller)
    }
}

impl PartialEq for ControllerPredicate {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for ControllerPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ControllerPredicate({})", self.name)
    }
}

fn provides_bounds_animation(component: &dyn Component) -> bool {
    component.provides_bounds_animation()
}

fn observes_appearance(controller: &dyn Controller) -> bool {
    controller.observes_appearance()
}

/// Components that may animate their bounds between generations.
pub const BOUNDS_ANIMATION_PREDICATE: ComponentPredicate =
    ComponentPredicate::new("bounds-animation", provides_bounds_animation);

/// Controllers that want appearance callbacks from the mounting layer.
pub const APPEARANCE_PREDICATE: ControllerPredicate =
    ControllerPredicate::new("appearance", observes_appearance);

/// Configuration shared by every generation descending from one initial root.
pub struct RootFamily {
    id: RootFamilyId,
    listener: Option<Arc<dyn StateListener>>,
    component_predicates: Vec<ComponentPredicate>,
    controller_predicates: Vec<ControllerPredicate>,
}

impl RootFamily {
    pub fn new(
        listener: Option<Arc<dyn StateListener>>,
        component_predicates: Vec<ComponentPredicate>,
        controller_predicates: Vec<ControllerPredicate>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: RootFamilyId::next(),
            listener,
            component_predicates,
            controller_predicates,
        })
    }

    /// Family with the predicates the engine itself relies on.
    pub fn with_default_predicates(listener: Option<Arc<dyn StateListener>>) -> Arc<Self> {
        Self::new(
            listener,
            vec![BOUNDS_ANIMATION_PREDICATE],
            vec![APPEARANCE_PREDICATE],
        )
    }

    pub fn id(&self) -> RootFamilyId {
        self.id
    }

    pub fn listener(&self) -> Option<&Arc<dyn StateListener>> {
        self.listener.as_ref()
    }

    pub fn component_predicates(&self) -> &[ComponentPredicate] {
        &self.component_predicates
    }

    pub fn controller_predicates(&self) -> &[ControllerPredicate] {
        &self.controller_predicates
    }
}

impl fmt::Debug for RootFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootFamily")
            .field("id", &self.id)
            .field("has_listener", &self.listener.is_some())
            .field("component_predicates", &self.component_predicates)
            .field("controller_predicates", &self.controller_predicates)
            .finish()
    }
}

/// One generation of a component tree.
///
/// A root is filled in by exactly one build and is immutable afterwards, so a
/// finished root can be shared across threads and read while the next
/// generation is built elsewhere.
pub struct ScopeRoot {
    global_id: ScopeRootId,
    family: Arc<RootFamily>,
    arena: NodeArena,
    node_by_handle: HashMap<ScopeHandleId, TreeNodeId>,
    component_index: Vec<Vec<TreeNodeId>>,
    controller_index: Vec<Vec<TreeNodeId>>,
    root_component: Option<ComponentRef>,
}

impl ScopeRoot {
    /// An empty generation for `family`, used as the previous root of the
    /// first build.
    pub fn new(family: Arc<RootFamily>) -> Self {
        let component_index = vec![Vec::new(); family.component_predicates.len()];
        let controller_index = vec![Vec::new(); family.controller_predicates.len()];
        Self {
            global_id: ScopeRootId::next(),
            family,
            arena: NodeArena::new(),
            node_by_handle: HashMap::default(),
            component_index,
            controller_index,
            root_component: None,
        }
    }

    pub fn with_default_predicates(listener: Option<Arc<dyn StateListener>>) -> Self {
        Self::new(RootFamily::with_default_predicates(listener))
    }

    /// A fresh, empty generation in the same family.
    pub(crate) fn next_generation(&self) -> Self {
        Self::new(Arc::clone(&self.family))
    }

    pub fn global_id(&self) -> ScopeRootId {
        self.global_id
    }

    pub fn family(&self) -> &Arc<RootFamily> {
        &self.family
    }

    pub fn family_id(&self) -> RootFamilyId {
        self.family.id
    }

    /// Whether no component has been built into this generation.
    pub fn is_empty(&self) -> bool {
        self.root_node().children().is_empty()
    }

    /// Number of component nodes, excluding the root node.
    pub fn len(&self) -> usize {
        self.arena.len() - 1
    }

    pub fn root_node(&self) -> &TreeNode {
        self.arena
            .get(TreeNodeId::ROOT)
            .expect("scope root arena always holds the root node")
    }

    /// The component returned by the root closure of the build.
    pub fn root_component(&self) -> Option<&ComponentRef> {
        self.root_component.as_ref()
    }

    pub fn node(&self, id: TreeNodeId) -> Option<&TreeNode> {
        self.arena.get(id)
    }

    /// All nodes, root first, in construction order.
    pub fn nodes(&self) -> impl Iterator<Item = &TreeNode> + '_ {
        self.arena.iter()
    }

    pub fn parent_of(&self, id: TreeNodeId) -> Option<TreeNodeId> {
        self.node(id)?.parent()
    }

    pub fn children_of(&self, id: TreeNodeId) -> &[TreeNodeId] {
        self.node(id).map(TreeNode::children).unwrap_or(&[])
    }

    pub fn child_with_key(&self, parent: TreeNodeId, key: &ScopeKey) -> Option<TreeNodeId> {
        self.arena.child_with_key(parent, key)
    }

    pub fn node_for_handle(&self, handle: ScopeHandleId) -> Option<&TreeNode> {
        let id = self.node_by_handle.get(&handle)?;
        self.node(*id)
    }

    pub fn handle(&self, handle: ScopeHandleId) -> Option<&ScopeHandle> {
        self.node_for_handle(handle)?.handle()
    }

    pub fn component_for_handle(&self, handle: ScopeHandleId) -> Option<&ComponentRef> {
        self.node_for_handle(handle)?.component()
    }

    /// Nodes whose component matched `predicate`, in construction order.
    ///
    /// Predicates the family was not created with match nothing.
    pub fn nodes_matching(&self, predicate: ComponentPredicate) -> impl Iterator<Item = &TreeNode> + '_ {
        let ids = self
            .family
            .component_predicates
            .iter()
            .position(|candidate| *candidate == predicate)
            .map(|index| self.component_index[index].as_slice())
            .unwrap_or(&[]);
        ids.iter().filter_map(move |id| self.node(*id))
    }

    /// Components registered under `predicate`, in construction order.
    pub fn components_matching(
        &self,
        predicate: ComponentPredicate,
    ) -> impl Iterator<Item = &ComponentRef> + '_ {
        self.nodes_matching(predicate).filter_map(TreeNode::component)
    }

    /// Controllers registered under `predicate`, in construction order.
    pub fn controllers_matching(
        &self,
        predicate: ControllerPredicate,
    ) -> impl Iterator<Item = &Arc<dyn Controller>> + '_ {
        let ids = self
            .family
            .controller_predicates
            .iter()
            .position(|candidate| *candidate == predicate)
            .map(|index| self.controller_index[index].as_slice())
            .unwrap_or(&[]);
        ids.iter().filter_map(move |id| {
            let handle = self.node(*id)?.handle()?;
            handle.controller().ok().flatten()
        })
    }

    pub(crate) fn alloc_node(&mut self, parent: TreeNodeId, key: ScopeKey, scoped: bool) -> TreeNodeId {
        self.arena.alloc(parent, key, scoped)
    }

    /// Drops `id` and every node allocated after it, together with their
    /// handle and predicate registrations.
    pub(crate) fn abandon_node(&mut self, id: TreeNodeId) {
        self.arena.abandon(id);
        for index in self.component_index.iter_mut().chain(self.controller_index.iter_mut()) {
            index.retain(|node| *node < id);
        }
        self.node_by_handle.retain(|_, node| *node < id);
    }

    /// Attaches the built component and resolved handle to `id` and registers
    /// both against the family's predicates.
    pub(crate) fn finalize_node(&mut self, id: TreeNodeId, handle: ScopeHandle, component: ComponentRef) {
        for (index, predicate) in self.family.component_predicates.iter().enumerate() {
            if predicate.matches(component.as_ref()) {
                self.component_index[index].push(id);
            }
        }
        if let Ok(Some(controller)) = handle.controller() {
            for (index, predicate) in self.family.controller_predicates.iter().enumerate() {
                if predicate.matches(controller.as_ref()) {
                    self.controller_index[index].push(id);
                }
            }
        }
        self.node_by_handle.insert(handle.id(), id);
        self.arena.finalize(id, handle, component);
    }

    pub(crate) fn set_root_component(&mut self, component: ComponentRef) {
        self.root_component = Some(component);
    }

    /// Human-readable outline of the tree, one node per line.
    pub fn dump_tree(&self) -> String {
        let mut output = String::new();
        self.dump_node(&mut output, TreeNodeId::ROOT, 0);
        output
    }

    fn dump_node(&self, output: &mut String, id: TreeNodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        match self.node(id) {
            Some(node) if node.is_root() => {
                let _ = writeln!(output, "{indent}[{}] root {:?}", id.raw(), self.global_id);
            }
            Some(node) => {
                let key = node
                    .key()
                    .map(|key| format!("{key:?}"))
                    .unwrap_or_default();
                let handle = node
                    .handle()
                    .map(|handle| format!(" {:?}", handle.id()))
                    .unwrap_or_default();
                let _ = writeln!(output, "{indent}[{}] {key}{handle}", id.raw());
            }
            None => {
                let _ = writeln!(output, "{indent}[{}] (missing)", id.raw());
                return;
            }
        }
        for child in self.children_of(id) {
            self.dump_node(output, *child, depth + 1);
        }
    }
}

impl fmt::Debug for ScopeRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeRoot")
            .field("global_id", &self.global_id)
            .field("family", &self.family.id)
            .field("nodes", &self.len())
            .finish()
    }
}
