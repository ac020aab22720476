//! The application-facing component and controller traits.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// An immutable, fully constructed component.
///
/// Components are built through [`BuildContext::component`](crate::BuildContext::component),
/// which wraps them in a [`ComponentRef`] and attaches them to a tree node. The
/// engine never mutates a component after construction.
pub trait Component: Any + Send + Sync + fmt::Debug {
    /// Visits the already-built children this component lays out.
    ///
    /// Used by duplicate detection to find one instance placed at two
    /// positions of the hierarchy.
    fn for_each_child(&self, _visit: &mut dyn FnMut(&ComponentRef)) {}

    /// Whether this component may animate its bounds between generations.
    ///
    /// Checked once when the component is registered into its scope root so
    /// bounds animations can be found without walking the tree.
    fn provides_bounds_animation(&self) -> bool {
        false
    }

    /// Animation to apply when this component replaces `previous`, the
    /// component of the same scope in the prior generation.
    fn bounds_animation_from_previous(&self, _previous: &dyn Component) -> Option<BoundsAnimation> {
        None
    }
}

pub type ComponentRef = Arc<dyn Component>;

impl dyn Component {
    pub fn as_any(&self) -> &dyn Any {
        self
    }

    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: Component>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// Address-based identity of a component instance.
pub(crate) fn instance_id(component: &ComponentRef) -> usize {
    Arc::as_ptr(component) as *const () as usize
}

/// Long-lived object attached to a scope.
///
/// A controller is created the first time its scope resolves and is carried
/// over to every later generation of the same scope. It refers back to its
/// scope only through the [`ScopeHandleId`](crate::ScopeHandleId) handed to its
/// factory.
pub trait Controller: Any + Send + Sync {
    /// Whether the mounting layer should deliver appearance callbacks.
    fn observes_appearance(&self) -> bool {
        false
    }
}

impl dyn Controller {
    pub fn as_any(&self) -> &dyn Any {
        self
    }

    pub fn downcast_ref<T: Controller>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for dyn Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Controller")
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoundsAnimationMode {
    Default,
    Spring { damping: f32, initial_velocity: f32 },
}

/// Bounds animation requested by a component for the transition from its
/// previous generation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundsAnimation {
    pub duration: Duration,
    pub delay: Duration,
    pub mode: BoundsAnimationMode,
}

impl BoundsAnimation {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            delay: Duration::ZERO,
            mode: BoundsAnimationMode::Default,
        }
    }

    pub fn spring(duration: Duration, damping: f32, initial_velocity: f32) -> Self {
        Self {
            duration,
            delay: Duration::ZERO,
            mode: BoundsAnimationMode::Spring {
                damping,
                initial_velocity,
            },
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn is_active(&self) -> bool {
        !self.duration.is_zero()
    }
}
