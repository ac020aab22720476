//! Bookkeeping for mounting generations onto host views.
//!
//! The mounting layer itself lives outside the engine. The registry only
//! remembers which generation each view shows and rejects a second mount onto
//! a view whose mount is still running.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::collections::map::HashMap;
use crate::root::{RootFamilyId, ScopeRoot, ScopeRootId};

/// Identifies a generation for mounting purposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AttachToken {
    pub family: RootFamilyId,
    pub generation: ScopeRootId,
}

impl ScopeRoot {
    pub fn attach_token(&self) -> AttachToken {
        AttachToken {
            family: self.family_id(),
            generation: self.global_id(),
        }
    }
}

/// Host view identifier chosen by the mounting layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(u64);

impl ViewId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// How a mount relates to what the view showed before.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachOutcome {
    /// Nothing was mounted on the view.
    Fresh,
    /// A generation of the same tree was mounted; the view is updated in place.
    Updated,
    /// A different tree was mounted; its views must be torn down first.
    Replaced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachError {
    MountInProgress {
        view: ViewId,
        active: AttachToken,
        requested: AttachToken,
    },
}

impl fmt::Display for AttachError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachError::MountInProgress {
                view,
                active,
                requested,
            } => write!(
                f,
                "cannot mount {:?} onto {view:?}: {:?} is still being mounted",
                requested.generation, active.generation
            ),
        }
    }
}

impl std::error::Error for AttachError {}

#[derive(Default)]
struct ViewState {
    mounted: Option<AttachToken>,
    mounting: Option<AttachToken>,
}

/// Thread-safe map from host views to the generation they display.
#[derive(Default)]
pub struct AttachRegistry {
    views: Mutex<HashMap<ViewId, ViewState>>,
}

impl AttachRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts mounting `token` onto `view`.
    ///
    /// The returned guard records the mount when dropped. A guard dropped
    /// while panicking leaves the previously mounted generation in place.
    pub fn begin_mount(&self, view: ViewId, token: AttachToken) -> Result<MountGuard<'_>, AttachError> {
        let mut views = self.lock();
        let state = views.entry(view).or_default();
        if let Some(active) = state.mounting {
            return Err(AttachError::MountInProgress {
                view,
                active,
                requested: token,
            });
        }
        let outcome = match state.mounted {
            None => AttachOutcome::Fresh,
            Some(mounted) if mounted.family == token.family => AttachOutcome::Updated,
            Some(_) => AttachOutcome::Replaced,
        };
        state.mounting = Some(token);
        log::trace!("mounting {:?} onto {view:?} ({outcome:?})", token.generation);
        Ok(MountGuard {
            registry: self,
            view,
            token,
            outcome,
        })
    }

    /// Generation currently shown by `view`.
    pub fn mounted(&self, view: ViewId) -> Option<AttachToken> {
        self.lock().get(&view).and_then(|state| state.mounted)
    }

    pub fn is_mounting(&self, view: ViewId) -> bool {
        self.lock()
            .get(&view)
            .is_some_and(|state| state.mounting.is_some())
    }

    /// Forgets `view`, returning the generation it showed.
    pub fn detach(&self, view: ViewId) -> Option<AttachToken> {
        self.lock().remove(&view).and_then(|state| state.mounted)
    }

    fn end_mount(&self, view: ViewId, token: AttachToken, commit: bool) {
        let mut views = self.lock();
        let Some(state) = views.get_mut(&view) else {
            return;
        };
        if state.mounting == Some(token) {
            state.mounting = None;
            if commit {
                state.mounted = Some(token);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ViewId, ViewState>> {
        self.views.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for AttachRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachRegistry")
            .field("views", &self.lock().len())
            .finish()
    }
}

/// An in-progress mount. Ends the mount when dropped.
#[derive(Debug)]
#[must_use = "the mount ends as soon as the guard is dropped"]
pub struct MountGuard<'a> {
    registry: &'a AttachRegistry,
    view: ViewId,
    token: AttachToken,
    outcome: AttachOutcome,
}

impl MountGuard<'_> {
    pub fn view(&self) -> ViewId {
        self.view
    }

    pub fn token(&self) -> AttachToken {
        self.token
    }

    pub fn outcome(&self) -> AttachOutcome {
        self.outcome
    }
}

impl Drop for MountGuard<'_> {
    fn drop(&mut self) {
        self.registry
            .end_mount(self.view, self.token, !std::thread::panicking());
    }
}
