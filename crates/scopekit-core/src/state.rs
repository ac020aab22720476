//! Component state values and the queued updates folded into them.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use smallvec::SmallVec;

use crate::collections::map::HashMap;
use crate::platform::BuildScheduler;
use crate::{RootFamilyId, ScopeHandleId};

/// Type-erased component state. Shared so finished roots stay `Send + Sync`.
pub type StateValue = Arc<dyn Any + Send + Sync>;

/// A single queued transformation of a component's state.
pub type StateUpdate = Box<dyn FnOnce(Option<StateValue>) -> Option<StateValue> + Send>;

/// Wraps a typed state transformation into a [`StateUpdate`].
///
/// If the handle holds no state, or state of another type, the update is
/// dropped and the previous value is kept.
pub fn typed_update<S>(update: impl FnOnce(&S) -> S + Send + 'static) -> StateUpdate
where
    S: Any + Send + Sync,
{
    Box::new(move |current: Option<StateValue>| {
        let Some(value) = current else {
            log::warn!(
                "dropping state update for {}: scope has no state",
                std::any::type_name::<S>()
            );
            return None;
        };
        if let Some(state) = value.downcast_ref::<S>() {
            let next: StateValue = Arc::new(update(state));
            return Some(next);
        }
        log::warn!(
            "dropping state update: state is not a {}",
            std::any::type_name::<S>()
        );
        Some(value)
    })
}

/// How urgently a state change should be reflected on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateMode {
    Synchronous,
    Asynchronous,
}

type UpdateList = SmallVec<[StateUpdate; 1]>;

/// Pending updates keyed by scope handle, each list in enqueue order.
///
/// A map is moved into exactly one build, which folds every update at most
/// once. Updates addressed to handles that no longer exist are discarded with
/// the map.
#[derive(Default)]
pub struct StateUpdateMap {
    updates: HashMap<ScopeHandleId, UpdateList>,
}

impl StateUpdateMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Number of handles with at least one pending update.
    pub fn handle_count(&self) -> usize {
        self.updates.len()
    }

    /// Total number of pending updates across all handles.
    pub fn update_count(&self) -> usize {
        self.updates.values().map(|list| list.len()).sum()
    }

    pub fn contains(&self, handle: ScopeHandleId) -> bool {
        self.updates.contains_key(&handle)
    }

    pub fn handles(&self) -> impl Iterator<Item = ScopeHandleId> + '_ {
        self.updates.keys().copied()
    }

    pub fn enqueue(&mut self, handle: ScopeHandleId, update: StateUpdate) {
        self.updates.entry(handle).or_default().push(update);
    }

    /// Typed convenience over [`enqueue`](Self::enqueue).
    pub fn enqueue_fn<S>(&mut self, handle: ScopeHandleId, update: impl FnOnce(&S) -> S + Send + 'static)
    where
        S: Any + Send + Sync,
    {
        self.enqueue(handle, typed_update(update));
    }

    /// Appends every update of `other` after the updates already queued here.
    pub fn merge(&mut self, other: StateUpdateMap) {
        for (handle, list) in other.updates {
            self.updates.entry(handle).or_default().extend(list);
        }
    }

    pub(crate) fn take(&mut self, handle: ScopeHandleId) -> Option<UpdateList> {
        self.updates.remove(&handle)
    }
}

impl fmt::Debug for StateUpdateMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (handle, list) in &self.updates {
            map.entry(handle, &list.len());
        }
        map.finish()
    }
}

/// Applies `updates` to `state` in order.
pub(crate) fn fold_updates(
    state: Option<StateValue>,
    updates: impl IntoIterator<Item = StateUpdate>,
) -> Option<StateValue> {
    updates.into_iter().fold(state, |state, update| update(state))
}

/// Receives state changes announced by resolved scope handles.
pub trait StateListener: Send + Sync {
    fn did_receive_state_update(
        &self,
        handle: ScopeHandleId,
        family: RootFamilyId,
        update: StateUpdate,
        mode: UpdateMode,
    );
}

#[derive(Default)]
struct PendingUpdates {
    updates: StateUpdateMap,
    wants_sync: bool,
}

/// Coordinating listener that accumulates updates for the next build.
///
/// Updates may be announced from any thread. Only announcements made on the
/// owner thread (the thread that created the queue, normally the main thread)
/// may request a synchronous rebuild; everything else is downgraded to
/// asynchronous so the sync/async decision is serialized on one thread.
pub struct StateUpdateQueue {
    owner: ThreadId,
    scheduler: Option<Arc<dyn BuildScheduler>>,
    pending: Mutex<PendingUpdates>,
}

impl StateUpdateQueue {
    pub fn new() -> Self {
        Self {
            owner: thread::current().id(),
            scheduler: None,
            pending: Mutex::new(PendingUpdates::default()),
        }
    }

    pub fn with_scheduler(scheduler: Arc<dyn BuildScheduler>) -> Self {
        Self {
            scheduler: Some(scheduler),
            ..Self::new()
        }
    }

    pub fn owner_thread(&self) -> ThreadId {
        self.owner
    }

    pub fn has_pending(&self) -> bool {
        !self.lock().updates.is_empty()
    }

    /// Whether any pending update asked for a synchronous rebuild.
    pub fn wants_synchronous_build(&self) -> bool {
        self.lock().wants_sync
    }

    /// Hands the accumulated updates to the caller, leaving the queue empty.
    ///
    /// Must be called on the owner thread.
    pub fn drain(&self) -> StateUpdateMap {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "StateUpdateQueue drained off its owner thread"
        );
        let mut pending = self.lock();
        pending.wants_sync = false;
        std::mem::take(&mut pending.updates)
    }

    /// Queues an update directly, bypassing a scope handle.
    pub fn enqueue(&self, handle: ScopeHandleId, update: StateUpdate, mode: UpdateMode) {
        let mode = self.effective_mode(mode);
        {
            let mut pending = self.lock();
            pending.updates.enqueue(handle, update);
            pending.wants_sync |= mode == UpdateMode::Synchronous;
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler.schedule_build(mode);
        }
    }

    fn effective_mode(&self, requested: UpdateMode) -> UpdateMode {
        if requested == UpdateMode::Synchronous && thread::current().id() != self.owner {
            log::debug!("synchronous state update announced off the owner thread; scheduling asynchronously");
            return UpdateMode::Asynchronous;
        }
        requested
    }

    fn lock(&self) -> MutexGuard<'_, PendingUpdates> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StateUpdateQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateUpdateQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.lock();
        f.debug_struct("StateUpdateQueue")
            .field("owner", &self.owner)
            .field("updates", &pending.updates)
            .field("wants_sync", &pending.wants_sync)
            .finish()
    }
}

impl StateListener for StateUpdateQueue {
    fn did_receive_state_update(
        &self,
        handle: ScopeHandleId,
        family: RootFamilyId,
        update: StateUpdate,
        mode: UpdateMode,
    ) {
        log::trace!("state update for {handle:?} in {family:?} ({mode:?})");
        self.enqueue(handle, update, mode);
    }
}
