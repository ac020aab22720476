//! Read-only checks over a finished generation.
//!
//! * collisions: two children of one owner share a [`ScopeKey`], so the later
//!   one could not be matched to its previous generation;
//! * duplicates: one component instance is reachable twice through
//!   [`Component::for_each_child`](crate::Component::for_each_child).

use std::fmt;

use crate::collections::map::{HashMap, HashSet};
use crate::component::{instance_id, ComponentRef};
use crate::key::{ComponentType, ScopeKey};
use crate::root::ScopeRoot;
use crate::tree::TreeNodeId;

/// Path from the top of the tree down to a reported component.
///
/// Frames whose component is not registered in the generation are `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComponentBacktrace {
    frames: Vec<Option<ScopeKey>>,
}

impl ComponentBacktrace {
    pub fn frames(&self) -> &[Option<ScopeKey>] {
        &self.frames
    }

    pub fn component_types(&self) -> impl Iterator<Item = Option<ComponentType>> + '_ {
        self.frames
            .iter()
            .map(|frame| frame.as_ref().map(ScopeKey::component_type))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn for_node(root: &ScopeRoot, node: TreeNodeId) -> Self {
        let mut frames = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            let Some(node) = root.node(id) else { break };
            if node.is_root() {
                break;
            }
            frames.push(node.key().cloned());
            current = node.parent();
        }
        frames.reverse();
        Self { frames }
    }
}

impl fmt::Display for ComponentBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, frame) in self.frames.iter().enumerate() {
            if index > 0 {
                f.write_str(" > ")?;
            }
            match frame {
                Some(key) => write!(f, "{key:?}")?,
                None => f.write_str("?")?,
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct CollisionReport {
    /// The later of the colliding components.
    pub component: ComponentRef,
    pub key: ScopeKey,
    /// Owner of both colliding components; `None` when they sit at the top of
    /// the tree.
    pub lowest_common_ancestor: Option<ComponentRef>,
    pub backtrace: ComponentBacktrace,
}

#[derive(Clone, Debug)]
pub struct DuplicateReport {
    pub component: ComponentRef,
    /// Hierarchy path of the second occurrence.
    pub backtrace: ComponentBacktrace,
}

#[derive(Clone, Debug)]
pub enum Diagnostic {
    Collision(CollisionReport),
    Duplicate(DuplicateReport),
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Collision(report) => {
                write!(f, "scope collision: {:?} declared more than once under ", report.key)?;
                match &report.lowest_common_ancestor {
                    Some(owner) => write!(f, "{owner:?}")?,
                    None => f.write_str("the root")?,
                }
                write!(f, "; add an identifier to tell them apart ({})", report.backtrace)
            }
            Diagnostic::Duplicate(report) => write!(
                f,
                "component {:?} is placed more than once in the hierarchy ({})",
                report.component, report.backtrace
            ),
        }
    }
}

/// Every node whose key was already taken by an earlier sibling.
pub fn find_collisions(root: &ScopeRoot) -> Vec<CollisionReport> {
    let mut reports = Vec::new();
    for node in root.nodes() {
        let (Some(key), Some(parent), Some(component)) = (node.key(), node.parent(), node.component())
        else {
            continue;
        };
        if root.child_with_key(parent, key) == Some(node.id()) {
            continue;
        }
        reports.push(CollisionReport {
            component: ComponentRef::clone(component),
            key: key.clone(),
            lowest_common_ancestor: root.node(parent).and_then(|owner| owner.component()).cloned(),
            backtrace: ComponentBacktrace::for_node(root, node.id()),
        });
    }
    reports
}

/// Every component instance reached a second time while walking the
/// hierarchy from the root component.
pub fn find_duplicates(root: &ScopeRoot) -> Vec<DuplicateReport> {
    let Some(top) = root.root_component() else {
        return Vec::new();
    };
    let registered: HashMap<usize, TreeNodeId> = root
        .nodes()
        .filter_map(|node| Some((instance_id(node.component()?), node.id())))
        .collect();
    let mut walk = DuplicateWalk {
        root,
        registered,
        seen: HashSet::default(),
        path: Vec::new(),
        reports: Vec::new(),
    };
    walk.visit(top);
    walk.reports
}

/// Runs the checks enabled by the flags, collisions first.
pub fn detect(root: &ScopeRoot, collisions: bool, duplicates: bool) -> Vec<Diagnostic> {
    let mut found = Vec::new();
    if collisions {
        found.extend(find_collisions(root).into_iter().map(Diagnostic::Collision));
    }
    if duplicates {
        found.extend(find_duplicates(root).into_iter().map(Diagnostic::Duplicate));
    }
    found
}

struct DuplicateWalk<'a> {
    root: &'a ScopeRoot,
    registered: HashMap<usize, TreeNodeId>,
    seen: HashSet<usize>,
    path: Vec<usize>,
    reports: Vec<DuplicateReport>,
}

impl DuplicateWalk<'_> {
    fn visit(&mut self, component: &ComponentRef) {
        let id = instance_id(component);
        self.path.push(id);
        if self.seen.insert(id) {
            component.for_each_child(&mut |child| self.visit(child));
        } else {
            self.reports.push(DuplicateReport {
                component: ComponentRef::clone(component),
                backtrace: self.backtrace(),
            });
        }
        self.path.pop();
    }

    fn backtrace(&self) -> ComponentBacktrace {
        let frames = self
            .path
            .iter()
            .map(|id| {
                let node = self.registered.get(id)?;
                self.root.node(*node)?.key().cloned()
            })
            .collect();
        ComponentBacktrace { frames }
    }
}
