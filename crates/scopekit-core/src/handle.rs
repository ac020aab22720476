//! Scope handles: the per-component carrier of state and controller.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::component::Controller;
use crate::error::ScopeError;
use crate::key::ComponentType;
use crate::root::{RootFamily, RootFamilyId};
use crate::state::{fold_updates, typed_update, StateUpdate, StateValue, UpdateMode};
use crate::tree::TreeNodeId;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide identifier of a logical component.
///
/// Every generation of the same logical component carries the same id, so it
/// is the key under which state updates are queued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeHandleId(u64);

impl ScopeHandleId {
    fn next() -> Self {
        Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

pub(crate) type ControllerFactory<'a> = Box<dyn FnOnce(ScopeHandleId) -> Arc<dyn Controller> + 'a>;

/// State and controller of one generation of a logical component.
///
/// A handle is *unresolved* while its component is being constructed and
/// becomes resolved once the component has been attached to its tree node.
/// Each new generation derives a fresh handle value with the same id.
pub struct ScopeHandle {
    id: ScopeHandleId,
    component_type: ComponentType,
    state: Option<StateValue>,
    controller: Option<Arc<dyn Controller>>,
    family: Arc<RootFamily>,
    tree_node: TreeNodeId,
    resolved: bool,
}

impl ScopeHandle {
    pub(crate) fn new(
        component_type: ComponentType,
        family: Arc<RootFamily>,
        tree_node: TreeNodeId,
        initial_state: Option<StateValue>,
    ) -> Self {
        Self {
            id: ScopeHandleId::next(),
            component_type,
            state: initial_state,
            controller: None,
            family,
            tree_node,
            resolved: false,
        }
    }

    /// Derives the next generation of this handle, folding `updates` into the
    /// carried-over state.
    pub(crate) fn derive(
        &self,
        family: Arc<RootFamily>,
        tree_node: TreeNodeId,
        updates: Option<SmallVec<[StateUpdate; 1]>>,
    ) -> Self {
        let state = match updates {
            Some(updates) => fold_updates(self.state.clone(), updates),
            None => self.state.clone(),
        };
        Self {
            id: self.id,
            component_type: self.component_type,
            state,
            controller: self.controller.clone(),
            family,
            tree_node,
            resolved: false,
        }
    }

    /// Finalizes the handle. Returns the controller if it was created now.
    pub(crate) fn resolve(
        &mut self,
        controller_factory: Option<ControllerFactory<'_>>,
    ) -> Option<Arc<dyn Controller>> {
        debug_assert!(!self.resolved, "scope handle {:?} resolved twice", self.id);
        self.resolved = true;
        if self.controller.is_some() {
            return None;
        }
        let controller = controller_factory.map(|factory| factory(self.id))?;
        self.controller = Some(Arc::clone(&controller));
        Some(controller)
    }

    pub fn id(&self) -> ScopeHandleId {
        self.id
    }

    pub fn component_type(&self) -> ComponentType {
        self.component_type
    }

    pub fn family_id(&self) -> RootFamilyId {
        self.family.id()
    }

    pub fn tree_node(&self) -> TreeNodeId {
        self.tree_node
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Current state. Readable during construction, since a component's
    /// children usually depend on it.
    pub fn state_value(&self) -> Option<&StateValue> {
        self.state.as_ref()
    }

    pub fn state<S: Any>(&self) -> Option<&S> {
        self.state.as_ref()?.downcast_ref::<S>()
    }

    /// The scope's controller.
    ///
    /// Fails with [`ScopeError::UnresolvedHandle`] while the component is still
    /// under construction: the controller of a first-time scope does not exist
    /// until resolution, and answering `None` would hide the mistake.
    pub fn controller(&self) -> Result<Option<&Arc<dyn Controller>>, ScopeError> {
        if !self.resolved {
            return Err(ScopeError::UnresolvedHandle { handle: self.id });
        }
        Ok(self.controller.as_ref())
    }

    /// Replaces state without scheduling a rebuild. Only valid during
    /// construction, e.g. to reconcile state with props that changed.
    pub fn replace_state<S: Any + Send + Sync>(&mut self, state: S) -> Result<(), ScopeError> {
        if self.resolved {
            return Err(ScopeError::AlreadyResolved { handle: self.id });
        }
        self.state = Some(Arc::new(state));
        Ok(())
    }

    /// Announces a state change to the root family's listener.
    pub fn update_state<S>(
        &self,
        update: impl FnOnce(&S) -> S + Send + 'static,
        mode: UpdateMode,
    ) -> Result<(), ScopeError>
    where
        S: Any + Send + Sync,
    {
        if !self.resolved {
            return Err(ScopeError::UnresolvedHandle { handle: self.id });
        }
        self.state_updater().update(update, mode)
    }

    /// A detached, thread-safe updater for this scope.
    ///
    /// Useful when a child or an action closure needs to change this scope's
    /// state later, possibly from another thread.
    pub fn state_updater(&self) -> StateUpdater {
        StateUpdater {
            handle: self.id,
            family: Arc::clone(&self.family),
        }
    }
}

impl fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeHandle")
            .field("id", &self.id)
            .field("component_type", &self.component_type)
            .field("has_state", &self.state.is_some())
            .field("has_controller", &self.controller.is_some())
            .field("tree_node", &self.tree_node)
            .field("resolved", &self.resolved)
            .finish()
    }
}

/// Sends state updates for one scope to its family's listener.
#[derive(Clone)]
pub struct StateUpdater {
    handle: ScopeHandleId,
    family: Arc<RootFamily>,
}

impl StateUpdater {
    pub fn handle(&self) -> ScopeHandleId {
        self.handle
    }

    pub fn update<S>(
        &self,
        update: impl FnOnce(&S) -> S + Send + 'static,
        mode: UpdateMode,
    ) -> Result<(), ScopeError>
    where
        S: Any + Send + Sync,
    {
        self.send(typed_update(update), mode)
    }

    pub fn send(&self, update: StateUpdate, mode: UpdateMode) -> Result<(), ScopeError> {
        let listener = self
            .family
            .listener()
            .ok_or(ScopeError::NoListener { handle: self.handle })?;
        listener.did_receive_state_update(self.handle, self.family.id(), update, mode);
        Ok(())
    }
}

impl fmt::Debug for StateUpdater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateUpdater")
            .field("handle", &self.handle)
            .field("family", &self.family.id())
            .finish()
    }
}
