//! Identity descriptors for components.
//!
//! A [`ScopeKey`] is what ties a freshly constructed component to the component
//! that occupied the same logical position in the previous generation. Keys are
//! pure values: two keys are equal when every field is equal, independent of the
//! component instances they were computed for.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::hash::hash_one;

/// Stable tag for a component type.
///
/// Equality and hashing only consider the [`TypeId`]; the name is kept for
/// diagnostics and tree dumps.
#[derive(Clone, Copy)]
pub struct ComponentType {
    id: TypeId,
    name: &'static str,
}

impl ComponentType {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Full type path, e.g. `my_app::rows::ContactRow`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path segment of [`name`](Self::name), used in backtraces.
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentType {}

impl Hash for ComponentType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Explicit identifier supplied by application code to tell siblings apart.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Int(i64),
    Str(Arc<str>),
    Hashed(u64),
}

impl Identity {
    /// Folds any hashable value into an identity.
    ///
    /// Distinct values may in principle hash to the same identity; prefer
    /// [`Identity::Int`] or [`Identity::Str`] when the identifier is already one.
    pub fn hashed<T: Hash + ?Sized>(value: &T) -> Self {
        Identity::Hashed(hash_one(value))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Int(value) => write!(f, "{value}"),
            Identity::Str(value) => write!(f, "{value:?}"),
            Identity::Hashed(value) => write!(f, "#{value:016x}"),
        }
    }
}

impl From<i64> for Identity {
    fn from(value: i64) -> Self {
        Identity::Int(value)
    }
}

impl From<i32> for Identity {
    fn from(value: i32) -> Self {
        Identity::Int(value.into())
    }
}

impl From<u32> for Identity {
    fn from(value: u32) -> Self {
        Identity::Int(value.into())
    }
}

impl From<usize> for Identity {
    fn from(value: usize) -> Self {
        match i64::try_from(value) {
            Ok(value) => Identity::Int(value),
            Err(_) => Identity::hashed(&value),
        }
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Identity::Str(Arc::from(value))
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Identity::Str(Arc::from(value))
    }
}

impl From<Arc<str>> for Identity {
    fn from(value: Arc<str>) -> Self {
        Identity::Str(value)
    }
}

/// Keys pushed with [`BuildContext::with_key`](crate::BuildContext::with_key).
pub type KeyPath = SmallVec<[Identity; 2]>;

/// Identity of a component under its owner.
///
/// Scoped and positional keys live in separate namespaces: a scoped key never
/// equals a positional one, even with the same type, counter and identifier.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    component_type: ComponentType,
    scoped: bool,
    sibling_counter: u32,
    identifier: Option<Identity>,
    key_path: KeyPath,
}

impl ScopeKey {
    /// Positional key of an unscoped declaration.
    pub fn new(
        component_type: ComponentType,
        sibling_counter: u32,
        identifier: Option<Identity>,
        key_path: KeyPath,
    ) -> Self {
        Self {
            component_type,
            scoped: false,
            sibling_counter,
            identifier,
            key_path,
        }
    }

    /// Key of a scoped declaration. Its sibling counter is always 0.
    pub fn scoped(component_type: ComponentType, identifier: Option<Identity>, key_path: KeyPath) -> Self {
        Self {
            component_type,
            scoped: true,
            sibling_counter: 0,
            identifier,
            key_path,
        }
    }

    pub fn is_scoped(&self) -> bool {
        self.scoped
    }

    pub fn component_type(&self) -> ComponentType {
        self.component_type
    }

    pub fn sibling_counter(&self) -> u32 {
        self.sibling_counter
    }

    pub fn identifier(&self) -> Option<&Identity> {
        self.identifier.as_ref()
    }

    pub fn key_path(&self) -> &[Identity] {
        &self.key_path
    }
}

impl fmt::Debug for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.component_type, self.sibling_counter)?;
        if let Some(identifier) = &self.identifier {
            write!(f, "({identifier:?})")?;
        }
        if !self.key_path.is_empty() {
            write!(f, "{:?}", self.key_path.as_slice())?;
        }
        Ok(())
    }
}

/// Per-owner sibling counters.
///
/// Counters are keyed by `(type, identifier)` and live on the owner's frame, so
/// inserting an unrelated sibling never shifts another type's counters.
#[derive(Default)]
pub(crate) struct SiblingCounters {
    counters: crate::collections::map::HashMap<(ComponentType, Option<Identity>), u32>,
}

impl SiblingCounters {
    pub(crate) fn next(&mut self, component_type: ComponentType, identifier: Option<&Identity>) -> u32 {
        let slot = self
            .counters
            .entry((component_type, identifier.cloned()))
            .or_insert(0);
        let value = *slot;
        *slot += 1;
        value
    }
}
