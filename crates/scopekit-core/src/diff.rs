//! Differences between two generations of a tree.

use std::fmt;
use std::sync::Arc;

use crate::collections::map::HashSet;
use crate::component::{BoundsAnimation, ComponentRef};
use crate::root::{ScopeRoot, BOUNDS_ANIMATION_PREDICATE};
use crate::tree::TreeNodeId;

/// A component present in both generations at the same logical position.
#[derive(Clone)]
pub struct UpdatedPair {
    pub previous: ComponentRef,
    pub current: ComponentRef,
}

impl PartialEq for UpdatedPair {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.previous, &other.previous) && Arc::ptr_eq(&self.current, &other.current)
    }
}

impl fmt::Debug for UpdatedPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} -> {:?}", self.previous, self.current)
    }
}

/// Components that appeared, changed generation, or disappeared.
///
/// Each list is in pre-order of the tree it comes from. Components are
/// compared by instance.
#[derive(Clone, Debug, Default)]
pub struct ComponentTreeDiff {
    pub appeared: Vec<ComponentRef>,
    pub updated: Vec<UpdatedPair>,
    pub disappeared: Vec<ComponentRef>,
}

impl ComponentTreeDiff {
    pub fn is_empty(&self) -> bool {
        self.appeared.is_empty() && self.updated.is_empty() && self.disappeared.is_empty()
    }
}

impl PartialEq for ComponentTreeDiff {
    fn eq(&self, other: &Self) -> bool {
        fn same(a: &[ComponentRef], b: &[ComponentRef]) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| Arc::ptr_eq(a, b))
        }
        same(&self.appeared, &other.appeared)
            && self.updated == other.updated
            && same(&self.disappeared, &other.disappeared)
    }
}

/// Compares `new` against `previous` by walking both trees by key.
///
/// First match wins: a node pairs with the first previous sibling under the
/// same key, unless an earlier new sibling already took it. A node without a
/// partner appears together with its whole subtree. Previous nodes left
/// unpaired disappear.
pub fn diff(new: &ScopeRoot, previous: Option<&ScopeRoot>) -> ComponentTreeDiff {
    let mut walk = DiffWalk {
        new,
        previous,
        paired: HashSet::default(),
        diff: ComponentTreeDiff::default(),
    };
    walk.children(TreeNodeId::ROOT, previous.map(|_| TreeNodeId::ROOT));

    let DiffWalk { paired, mut diff, .. } = walk;
    if let Some(previous) = previous {
        // Arena order is construction order, which is pre-order.
        diff.disappeared = previous
            .nodes()
            .filter(|node| !node.is_root() && !paired.contains(&node.id()))
            .filter_map(|node| node.component().cloned())
            .collect();
    }
    diff
}

struct DiffWalk<'a> {
    new: &'a ScopeRoot,
    previous: Option<&'a ScopeRoot>,
    paired: HashSet<TreeNodeId>,
    diff: ComponentTreeDiff,
}

impl DiffWalk<'_> {
    fn children(&mut self, parent: TreeNodeId, previous_parent: Option<TreeNodeId>) {
        let (new, previous) = (self.new, self.previous);
        for &child in new.children_of(parent) {
            let Some(node) = new.node(child) else {
                continue;
            };
            let partner = match (previous, previous_parent, node.key()) {
                (Some(previous), Some(owner), Some(key)) => previous
                    .child_with_key(owner, key)
                    .filter(|candidate| !self.paired.contains(candidate)),
                _ => None,
            };
            if let Some(component) = node.component() {
                let previous_component = partner
                    .and_then(|id| previous?.node(id)?.component())
                    .cloned();
                match previous_component {
                    Some(previous) => self.diff.updated.push(UpdatedPair {
                        previous,
                        current: ComponentRef::clone(component),
                    }),
                    None => self.diff.appeared.push(ComponentRef::clone(component)),
                }
            }
            if let Some(partner) = partner {
                self.paired.insert(partner);
            }
            self.children(child, partner);
        }
    }
}

/// First active bounds animation requested by a component of `new` against
/// its counterpart (same handle) in `previous`.
pub fn bounds_animation_from_previous(new: &ScopeRoot, previous: &ScopeRoot) -> Option<BoundsAnimation> {
    new.nodes_matching(BOUNDS_ANIMATION_PREDICATE).find_map(|node| {
        let handle = node.handle()?;
        let component = node.component()?;
        let prior = previous.component_for_handle(handle.id())?;
        component
            .bounds_animation_from_previous(prior.as_ref())
            .filter(BoundsAnimation::is_active)
    })
}
