//! The build orchestrator.
//!
//! A build turns a root closure into a new generation: every component
//! declared through [`BuildContext::component`] is matched by key against the
//! previous generation, inherits its handle (state folded through pending
//! updates), and is registered into the new [`ScopeRoot`].

use std::any::Any;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::collections::map::{HashMap, HashSet};
use crate::component::{BoundsAnimation, Component, ComponentRef, Controller};
use crate::cursor::{CursorStats, FrameGuard, KeyGuard, ScopeCursor};
use crate::diagnostics::{self, Diagnostic};
use crate::diff::bounds_animation_from_previous;
use crate::error::BuildError;
use crate::handle::{ControllerFactory, ScopeHandle, ScopeHandleId};
use crate::key::{ComponentType, Identity, ScopeKey};
use crate::root::{RootFamily, ScopeRoot, ScopeRootId};
use crate::state::{StateUpdateMap, StateValue};
use crate::tree::TreeNodeId;

bitflags::bitflags! {
    /// Why a build ran. The empty set means the tree is built for the first
    /// time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BuildTrigger: u8 {
        const PROPS_UPDATE = 1 << 0;
        const STATE_UPDATE = 1 << 1;
        const ENVIRONMENT_UPDATE = 1 << 2;
    }
}

impl BuildTrigger {
    pub fn is_new_tree(self) -> bool {
        self.is_empty()
    }
}

/// Computes the trigger of a build.
///
/// A missing or empty previous generation always yields the empty trigger.
/// Otherwise pending updates add [`STATE_UPDATE`](BuildTrigger::STATE_UPDATE),
/// a changed environment adds
/// [`ENVIRONMENT_UPDATE`](BuildTrigger::ENVIRONMENT_UPDATE), and changed props
/// (or a rebuild with no other reason) add
/// [`PROPS_UPDATE`](BuildTrigger::PROPS_UPDATE).
pub fn build_trigger(
    previous: Option<&ScopeRoot>,
    updates: &StateUpdateMap,
    props_changed: bool,
    environment_changed: bool,
) -> BuildTrigger {
    let Some(previous) = previous else {
        return BuildTrigger::empty();
    };
    if previous.is_empty() {
        return BuildTrigger::empty();
    }
    let mut trigger = BuildTrigger::empty();
    if !updates.is_empty() {
        trigger |= BuildTrigger::STATE_UPDATE;
    }
    if environment_changed {
        trigger |= BuildTrigger::ENVIRONMENT_UPDATE;
    }
    if props_changed || trigger.is_empty() {
        trigger |= BuildTrigger::PROPS_UPDATE;
    }
    trigger
}

/// What to do with diagnostics found after a build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DiagnosticsPolicy {
    /// Return them in [`BuildResult::diagnostics`].
    #[default]
    Collect,
    /// Return them and emit each one with `log::warn!`.
    Log,
    /// Fail the build with [`BuildError::Diagnostics`].
    Fail,
}

/// Knobs for a single build.
#[derive(Clone, Debug)]
pub struct BuildOptions {
    /// The caller passes new props to the root.
    pub props_changed: bool,
    /// The environment (traits, theme, size class) changed.
    pub environment_changed: bool,
    /// Let `.reusable()` declarations skip clean subtrees on state-only builds.
    pub enable_component_reuse: bool,
    pub detect_collisions: bool,
    pub detect_duplicates: bool,
    pub diagnostics_policy: DiagnosticsPolicy,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            props_changed: false,
            environment_changed: false,
            enable_component_reuse: true,
            detect_collisions: cfg!(debug_assertions),
            detect_duplicates: cfg!(debug_assertions),
            diagnostics_policy: DiagnosticsPolicy::Collect,
        }
    }
}

impl BuildOptions {
    pub fn props_changed(mut self) -> Self {
        self.props_changed = true;
        self
    }

    pub fn environment_changed(mut self) -> Self {
        self.environment_changed = true;
        self
    }

    /// Enables both collision and duplicate detection.
    pub fn with_diagnostics(mut self, policy: DiagnosticsPolicy) -> Self {
        self.detect_collisions = true;
        self.detect_duplicates = true;
        self.diagnostics_policy = policy;
        self
    }

    pub fn without_reuse(mut self) -> Self {
        self.enable_component_reuse = false;
        self
    }
}

/// Counters collected during one build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Component nodes in the new generation.
    pub nodes: usize,
    /// Nodes copied from the previous generation without running their closure.
    pub reused_nodes: usize,
    /// Updates addressed to scopes absent from the new generation.
    pub discarded_updates: usize,
    pub cursor: CursorStats,
}

/// Output of [`build_component`].
pub struct BuildResult {
    pub component: ComponentRef,
    pub scope_root: Arc<ScopeRoot>,
    pub trigger: BuildTrigger,
    pub bounds_animation: Option<BoundsAnimation>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: BuildStats,
}

impl std::fmt::Debug for BuildResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildResult")
            .field("component", &self.component)
            .field("scope_root", &self.scope_root)
            .field("trigger", &self.trigger)
            .field("bounds_animation", &self.bounds_animation)
            .field("diagnostics", &self.diagnostics.len())
            .field("stats", &self.stats)
            .finish()
    }
}

struct BuildState {
    root: ScopeRoot,
    cursor: ScopeCursor,
    updates: StateUpdateMap,
    dirty: HashSet<TreeNodeId>,
    reused_nodes: usize,
    /// Updates folded into each node's handle during this build.
    folded: HashMap<TreeNodeId, usize>,
    /// Updates folded into handles whose node was abandoned.
    abandoned_updates: usize,
}

/// Where a new declaration lands: its node, its previous counterpart and the
/// handle derived from that counterpart.
struct Placement {
    node: TreeNodeId,
    previous: Option<TreeNodeId>,
    handle: Option<ScopeHandle>,
}

/// State of one build in progress.
///
/// Passed by reference through every construction closure. The context is not
/// `Sync`, so a build stays on the thread that started it; independent builds
/// on other threads each own their context.
pub struct BuildContext {
    previous: Arc<ScopeRoot>,
    family: Arc<RootFamily>,
    trigger: BuildTrigger,
    options: BuildOptions,
    state: RefCell<BuildState>,
}

impl BuildContext {
    /// Opens a build on top of `previous`. Without a previous generation the
    /// tree is built in a new family that has no state listener.
    pub fn new(previous: Option<&Arc<ScopeRoot>>, updates: StateUpdateMap, options: BuildOptions) -> Self {
        let previous = previous
            .cloned()
            .unwrap_or_else(|| Arc::new(ScopeRoot::with_default_predicates(None)));
        let trigger = build_trigger(
            Some(&*previous),
            &updates,
            options.props_changed,
            options.environment_changed,
        );
        let dirty = if options.enable_component_reuse && trigger == BuildTrigger::STATE_UPDATE {
            dirty_nodes(&previous, &updates)
        } else {
            HashSet::default()
        };
        let mut cursor = ScopeCursor::new();
        cursor.push(TreeNodeId::ROOT, Some(TreeNodeId::ROOT));
        let root = previous.next_generation();
        log::trace!(
            "opening build of {:?} over {:?} ({trigger:?}, {} pending update(s))",
            root.global_id(),
            previous.global_id(),
            updates.update_count()
        );
        Self {
            family: Arc::clone(previous.family()),
            previous,
            trigger,
            options,
            state: RefCell::new(BuildState {
                root,
                cursor,
                updates,
                dirty,
                reused_nodes: 0,
                folded: HashMap::default(),
                abandoned_updates: 0,
            }),
        }
    }

    pub fn trigger(&self) -> BuildTrigger {
        self.trigger
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn previous_root(&self) -> &Arc<ScopeRoot> {
        &self.previous
    }

    /// Id of the generation being built.
    pub fn scope_root_id(&self) -> ScopeRootId {
        self.state.borrow().root.global_id()
    }

    pub fn cursor_stats(&self) -> CursorStats {
        self.state.borrow().cursor.stats()
    }

    /// Node under construction, [`TreeNodeId::ROOT`] outside any component.
    pub fn current_node(&self) -> TreeNodeId {
        self.state
            .borrow()
            .cursor
            .current()
            .map_or(TreeNodeId::ROOT, |frame| frame.node)
    }

    /// Previous-generation node at the position of [`current_node`](Self::current_node).
    pub fn equivalent_previous_node(&self) -> Option<TreeNodeId> {
        self.state
            .borrow()
            .cursor
            .current()
            .and_then(|frame| frame.previous)
    }

    /// Starts declaring a component of type `C` under the current node.
    pub fn component<C: Component>(&self) -> ScopeBuilder<'_, C> {
        ScopeBuilder {
            ctx: self,
            identifier: None,
            scoped: false,
            reusable: false,
            initial_state: None,
            controller: None,
            _component: PhantomData,
        }
    }

    /// Declares an already-constructed stateless component.
    pub fn leaf<C: Component>(&self, component: C) -> ComponentRef {
        self.component::<C>().build(move |_, _| component)
    }

    /// Runs `content` with `key` appended to the key path of the current node,
    /// distinguishing the components it declares from identical siblings.
    pub fn with_key<R>(&self, key: impl Into<Identity>, content: impl FnOnce(&BuildContext) -> R) -> R {
        {
            let mut state = self.state.borrow_mut();
            let frame = state
                .cursor
                .current_mut()
                .expect("build context always holds its root frame");
            frame.key_path.push(key.into());
        }
        let _key = KeyGuard::new(self);
        content(self)
    }

    /// Closes the build around `component`, the output of the root closure.
    pub fn finish(self, component: ComponentRef) -> Result<BuildResult, BuildError> {
        let BuildContext {
            previous,
            trigger,
            options,
            state,
            ..
        } = self;
        let mut state = state.into_inner();
        if let Some(frame) = state.cursor.pop() {
            debug_assert_eq!(frame.node, TreeNodeId::ROOT, "build finished inside a component");
        }
        let cursor = state.cursor.stats();
        debug_assert!(cursor.is_balanced(), "unbalanced scope cursor: {cursor:?}");

        let discarded_updates = state.updates.update_count() + state.abandoned_updates;
        if discarded_updates > 0 {
            log::debug!(
                "discarding {discarded_updates} state update(s) for scopes absent from the new generation"
            );
        }

        state.root.set_root_component(Arc::clone(&component));
        let scope_root = Arc::new(state.root);

        let found = diagnostics::detect(
            &scope_root,
            options.detect_collisions,
            options.detect_duplicates,
        );

        let bounds_animation = if trigger.is_new_tree() {
            None
        } else {
            bounds_animation_from_previous(&scope_root, &previous)
        };

        let stats = BuildStats {
            nodes: scope_root.len(),
            reused_nodes: state.reused_nodes,
            discarded_updates,
            cursor,
        };
        log::debug!(
            "built {:?} in {:?}: {} node(s), {} reused, {trigger:?}",
            scope_root.global_id(),
            scope_root.family_id(),
            stats.nodes,
            stats.reused_nodes
        );

        match options.diagnostics_policy {
            DiagnosticsPolicy::Collect => {}
            DiagnosticsPolicy::Log => {
                for diagnostic in &found {
                    log::warn!("{diagnostic}");
                }
            }
            DiagnosticsPolicy::Fail => {
                if !found.is_empty() {
                    return Err(BuildError::Diagnostics(found));
                }
            }
        }

        Ok(BuildResult {
            component,
            scope_root,
            trigger,
            bounds_animation,
            diagnostics: found,
            stats,
        })
    }

    pub(crate) fn push_frame(&self, node: TreeNodeId, previous: Option<TreeNodeId>) {
        self.state.borrow_mut().cursor.push(node, previous);
    }

    pub(crate) fn pop_frame(&self, node: TreeNodeId) {
        let popped = self.state.borrow_mut().cursor.pop();
        debug_assert_eq!(
            popped.map(|frame| frame.node),
            Some(node),
            "scope frames popped out of order"
        );
    }

    /// Pops `node`'s frame and drops the half-built node. Runs from guard
    /// destructors, possibly while unwinding.
    pub(crate) fn abandon_frame(&self, node: TreeNodeId) {
        let Ok(mut state) = self.state.try_borrow_mut() else {
            log::error!("build state busy while abandoning {node:?}; node left in place");
            return;
        };
        if state.cursor.current().map(|frame| frame.node) == Some(node) {
            state.cursor.pop();
        }
        state.root.abandon_node(node);
        let mut lost = 0;
        state.folded.retain(|id, count| {
            if *id >= node {
                lost += *count;
                false
            } else {
                true
            }
        });
        state.abandoned_updates += lost;
        log::debug!("abandoned half-built node {node:?}, dropping {lost} folded update(s)");
    }

    pub(crate) fn pop_key(&self) {
        let Ok(mut state) = self.state.try_borrow_mut() else {
            log::error!("build state busy while popping a key");
            return;
        };
        if let Some(frame) = state.cursor.current_mut() {
            frame.key_path.pop();
        }
    }

    fn place(&self, component_type: ComponentType, identifier: Option<Identity>, scoped: bool) -> Placement {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let frame = state
            .cursor
            .current_mut()
            .expect("build context always holds its root frame");
        let key = if scoped {
            ScopeKey::scoped(component_type, identifier, frame.key_path.clone())
        } else {
            let counter = frame.counters.next(component_type, identifier.as_ref());
            ScopeKey::new(component_type, counter, identifier, frame.key_path.clone())
        };
        let parent = frame.node;
        let previous_parent = frame.previous;

        let collides = state.root.child_with_key(parent, &key).is_some();
        if collides {
            log::debug!("scope key {key:?} already taken under {parent:?}");
        }
        let previous = if collides {
            None
        } else {
            previous_parent.and_then(|owner| self.previous.child_with_key(owner, &key))
        };
        let node = state.root.alloc_node(parent, key, scoped);
        let handle = match previous.and_then(|previous| self.previous.node(previous)?.handle()) {
            Some(handle) => {
                let updates = state.updates.take(handle.id());
                if let Some(updates) = &updates {
                    state.folded.insert(node, updates.len());
                }
                Some(handle.derive(Arc::clone(&self.family), node, updates))
            }
            None => None,
        };
        Placement {
            node,
            previous,
            handle,
        }
    }

    /// The previous component at `previous` if its subtree can be copied as is.
    fn reusable_component(&self, previous: TreeNodeId) -> Option<ComponentRef> {
        if !self.options.enable_component_reuse || self.trigger != BuildTrigger::STATE_UPDATE {
            return None;
        }
        if self.state.borrow().dirty.contains(&previous) {
            return None;
        }
        self.previous.node(previous)?.component().cloned()
    }

    fn reuse_subtree(
        &self,
        node: TreeNodeId,
        previous: TreeNodeId,
        mut handle: ScopeHandle,
        component: ComponentRef,
    ) -> ComponentRef {
        handle.resolve(None);
        let mut state = self.state.borrow_mut();
        state.root.finalize_node(node, handle, Arc::clone(&component));
        state.reused_nodes += 1;
        self.copy_children(&mut state, node, previous);
        log::trace!("reused {:?} from {previous:?} as {node:?}", component);
        component
    }

    fn copy_children(&self, state: &mut BuildState, parent: TreeNodeId, previous_parent: TreeNodeId) {
        for &child in self.previous.children_of(previous_parent) {
            let Some(previous) = self.previous.node(child) else {
                continue;
            };
            let (Some(key), Some(previous_handle), Some(component)) =
                (previous.key(), previous.handle(), previous.component())
            else {
                continue;
            };
            let node = state.root.alloc_node(parent, key.clone(), previous.is_scoped());
            let mut handle = previous_handle.derive(Arc::clone(&self.family), node, None);
            handle.resolve(None);
            state.root.finalize_node(node, handle, Arc::clone(component));
            state.reused_nodes += 1;
            self.copy_children(state, node, child);
        }
    }

    fn finalize(
        &self,
        node: TreeNodeId,
        mut handle: ScopeHandle,
        component: ComponentRef,
        controller: Option<ControllerFactory<'_>>,
    ) {
        if handle.resolve(controller).is_some() {
            log::trace!("created controller for {:?}", handle.id());
        }
        self.state.borrow_mut().root.finalize_node(node, handle, component);
    }
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("previous", &self.previous.global_id())
            .field("trigger", &self.trigger)
            .field("cursor", &self.cursor_stats())
            .finish()
    }
}

/// Nodes owning a handle with pending updates, plus all their ancestors.
fn dirty_nodes(previous: &ScopeRoot, updates: &StateUpdateMap) -> HashSet<TreeNodeId> {
    let mut dirty = HashSet::default();
    for handle in updates.handles() {
        let mut current = previous.node_for_handle(handle).map(|node| node.id());
        while let Some(id) = current {
            if !dirty.insert(id) {
                break;
            }
            current = previous.parent_of(id);
        }
    }
    dirty
}

/// Declaration of one component, configured before [`build`](Self::build).
#[must_use = "a component is only declared once `build` is called"]
pub struct ScopeBuilder<'c, C> {
    ctx: &'c BuildContext,
    identifier: Option<Identity>,
    scoped: bool,
    reusable: bool,
    initial_state: Option<Box<dyn FnOnce() -> StateValue + 'c>>,
    controller: Option<ControllerFactory<'c>>,
    _component: PhantomData<fn() -> C>,
}

impl<'c, C: Component> ScopeBuilder<'c, C> {
    /// Distinguishes this component from siblings of the same type.
    pub fn identifier(mut self, identifier: impl Into<Identity>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Gives the component a scope without state or controller. Scoped
    /// components are identified by type, identifier and key path only.
    pub fn scoped(mut self) -> Self {
        self.scoped = true;
        self
    }

    /// Allows a state-only build to copy this component's previous subtree
    /// when nothing inside it has pending updates.
    pub fn reusable(mut self) -> Self {
        self.reusable = true;
        self
    }

    /// State for the first generation. Later generations carry the previous
    /// state and never call `init`.
    pub fn initial_state<S: Any + Send + Sync>(mut self, init: impl FnOnce() -> S + 'c) -> Self {
        self.scoped = true;
        self.initial_state = Some(Box::new(move || {
            let state: StateValue = Arc::new(init());
            state
        }));
        self
    }

    /// Controller created when the scope first resolves and carried over to
    /// later generations.
    pub fn controller<K: Controller>(mut self, factory: impl FnOnce(ScopeHandleId) -> K + 'c) -> Self {
        self.scoped = true;
        self.controller = Some(Box::new(move |handle| {
            let controller: Arc<dyn Controller> = Arc::new(factory(handle));
            controller
        }));
        self
    }

    /// Constructs the component and attaches it to its tree node.
    ///
    /// `content` may read and replace the scope's state and declare children
    /// through the context. If it panics, the node and its partial subtree are
    /// removed before the panic leaves this call.
    pub fn build(self, content: impl FnOnce(&BuildContext, &mut ScopeHandle) -> C) -> ComponentRef {
        let ScopeBuilder {
            ctx,
            identifier,
            scoped,
            reusable,
            initial_state,
            controller,
            ..
        } = self;
        let component_type = ComponentType::of::<C>();
        let Placement {
            node,
            previous,
            mut handle,
        } = ctx.place(component_type, identifier, scoped);

        if reusable {
            if let Some(previous) = previous {
                if let Some(component) = ctx.reusable_component(previous) {
                    if let Some(handle) = handle.take() {
                        return ctx.reuse_subtree(node, previous, handle, component);
                    }
                }
            }
        }

        let frame = FrameGuard::enter(ctx, node, previous);
        let mut handle = match handle {
            Some(handle) => handle,
            None => {
                let state = initial_state.map(|init| init());
                ScopeHandle::new(component_type, Arc::clone(&ctx.family), node, state)
            }
        };
        let component = content(ctx, &mut handle);
        frame.complete();

        let component: ComponentRef = Arc::new(component);
        ctx.finalize(node, handle, Arc::clone(&component), controller);
        component
    }
}

/// Builds a new generation of a component tree.
///
/// `previous` is the last generation of the tree, or `None` for a first build
/// without a state listener. To receive state updates from the first
/// generation on, pass an empty root created with
/// [`ScopeRoot::new`] for a family with a listener.
pub fn build_component(
    previous: Option<&Arc<ScopeRoot>>,
    updates: StateUpdateMap,
    options: BuildOptions,
    root: impl FnOnce(&BuildContext) -> ComponentRef,
) -> Result<BuildResult, BuildError> {
    let ctx = BuildContext::new(previous, updates, options);
    let component = root(&ctx);
    ctx.finish(component)
}
