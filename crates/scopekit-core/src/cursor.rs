//! The scope cursor: where in the tree a build currently is.
//!
//! Each frame pairs the node under construction with the node that occupied
//! the same logical position in the previous generation. Frames are strictly
//! nested; [`FrameGuard`] and [`KeyGuard`] tie every push to a pop that runs on
//! all exit paths, unwinding included.

use crate::build::BuildContext;
use crate::key::{KeyPath, SiblingCounters};
use crate::tree::TreeNodeId;

pub(crate) struct Frame {
    pub(crate) node: TreeNodeId,
    pub(crate) previous: Option<TreeNodeId>,
    pub(crate) counters: SiblingCounters,
    pub(crate) key_path: KeyPath,
}

impl Frame {
    fn new(node: TreeNodeId, previous: Option<TreeNodeId>) -> Self {
        Self {
            node,
            previous,
            counters: SiblingCounters::default(),
            key_path: KeyPath::new(),
        }
    }
}

/// Push/pop counters of one build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CursorStats {
    pub pushes: usize,
    pub pops: usize,
    /// Frames currently open, the build's root frame included.
    pub depth: usize,
}

impl CursorStats {
    pub fn is_balanced(&self) -> bool {
        self.pushes == self.pops
    }
}

pub(crate) struct ScopeCursor {
    frames: Vec<Frame>,
    pushes: usize,
    pops: usize,
}

impl ScopeCursor {
    pub(crate) fn new() -> Self {
        Self {
            frames: Vec::new(),
            pushes: 0,
            pops: 0,
        }
    }

    pub(crate) fn push(&mut self, node: TreeNodeId, previous: Option<TreeNodeId>) {
        self.pushes += 1;
        self.frames.push(Frame::new(node, previous));
    }

    pub(crate) fn pop(&mut self) -> Option<Frame> {
        let frame = self.frames.pop()?;
        self.pops += 1;
        Some(frame)
    }

    pub(crate) fn current(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    pub(crate) fn stats(&self) -> CursorStats {
        CursorStats {
            pushes: self.pushes,
            pops: self.pops,
            depth: self.frames.len(),
        }
    }
}

/// Keeps a component's frame open while its children are constructed.
///
/// [`complete`](Self::complete) pops the frame on the normal path. Dropping an
/// incomplete guard (early return or panic) pops the frame and discards the
/// half-built node together with any descendants.
#[must_use = "FrameGuard pops the scope frame on drop"]
pub(crate) struct FrameGuard<'a> {
    ctx: &'a BuildContext,
    node: TreeNodeId,
    completed: bool,
}

impl<'a> FrameGuard<'a> {
    pub(crate) fn enter(ctx: &'a BuildContext, node: TreeNodeId, previous: Option<TreeNodeId>) -> Self {
        ctx.push_frame(node, previous);
        Self {
            ctx,
            node,
            completed: false,
        }
    }

    pub(crate) fn complete(mut self) {
        self.completed = true;
        self.ctx.pop_frame(self.node);
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.ctx.abandon_frame(self.node);
        }
    }
}

/// Pops a key pushed with [`BuildContext::with_key`] on drop.
#[must_use = "KeyGuard pops the key on drop"]
pub(crate) struct KeyGuard<'a> {
    ctx: &'a BuildContext,
}

impl<'a> KeyGuard<'a> {
    pub(crate) fn new(ctx: &'a BuildContext) -> Self {
        Self { ctx }
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.ctx.pop_key();
    }
}
