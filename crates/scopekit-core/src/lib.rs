#![doc = r"Component scopes and generation-to-generation tree reconciliation for declarative UI frameworks."]

pub extern crate self as scopekit_core;

pub mod attach;
mod build;
pub mod collections;
mod component;
mod cursor;
pub mod diagnostics;
pub mod diff;
mod error;
mod handle;
pub mod hash;
mod key;
pub mod platform;
mod root;
pub mod state;
mod tree;

pub use attach::{AttachError, AttachOutcome, AttachRegistry, AttachToken, MountGuard, ViewId};
pub use build::{
    build_component, build_trigger, BuildContext, BuildOptions, BuildResult, BuildStats,
    BuildTrigger, DiagnosticsPolicy, ScopeBuilder,
};
pub use component::{
    BoundsAnimation, BoundsAnimationMode, Component, ComponentRef, Controller,
};
pub use cursor::CursorStats;
pub use diagnostics::{ComponentBacktrace, Diagnostic};
pub use diff::{diff, ComponentTreeDiff, UpdatedPair};
pub use error::{BuildError, ScopeError};
pub use handle::{ScopeHandle, ScopeHandleId, StateUpdater};
pub use key::{ComponentType, Identity, KeyPath, ScopeKey};
pub use platform::BuildScheduler;
pub use root::{
    ComponentPredicate, ControllerPredicate, RootFamily, RootFamilyId, ScopeRoot, ScopeRootId,
    APPEARANCE_PREDICATE, BOUNDS_ANIMATION_PREDICATE,
};
pub use state::{
    typed_update, StateListener, StateUpdate, StateUpdateMap, StateUpdateQueue, StateValue,
    UpdateMode,
};
pub use tree::{NodeChildren, TreeNode, TreeNodeId};

#[cfg(test)]
#[path = "tests/build_tests.rs"]
mod build_tests;

#[cfg(test)]
#[path = "tests/diff_tests.rs"]
mod diff_tests;

#[cfg(test)]
#[path = "tests/diagnostics_tests.rs"]
mod diagnostics_tests;
