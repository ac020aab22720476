use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use scopekit_core::{
    build_component, diff, BuildContext, BuildError, BuildOptions, BuildResult, BuildScheduler,
    Component, ComponentPredicate, ComponentRef, ComponentTreeDiff, ComponentType,
    ControllerPredicate, Identity, RootFamily, ScopeHandleId, ScopeRoot, StateListener,
    StateUpdateQueue, UpdateMode,
};

#[cfg(test)]
use scopekit_core::{BuildTrigger, Controller, DiagnosticsPolicy};
#[cfg(test)]
use std::cell::Cell;
#[cfg(test)]
use std::rc::Rc;

/// Scheduler that only counts rebuild requests.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    synchronous: AtomicUsize,
    asynchronous: AtomicUsize,
}

impl RecordingScheduler {
    pub fn synchronous_requests(&self) -> usize {
        self.synchronous.load(Ordering::SeqCst)
    }

    pub fn asynchronous_requests(&self) -> usize {
        self.asynchronous.load(Ordering::SeqCst)
    }
}

impl BuildScheduler for RecordingScheduler {
    fn schedule_build(&self, mode: UpdateMode) {
        let counter = match mode {
            UpdateMode::Synchronous => &self.synchronous,
            UpdateMode::Asynchronous => &self.asynchronous,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub enum TestRuleError {
    /// A rebuild was requested before [`ScopeTestRule::set_content`].
    NoContent,
    Build(BuildError),
}

impl fmt::Display for TestRuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestRuleError::NoContent => write!(f, "no content installed"),
            TestRuleError::Build(err) => write!(f, "build failed: {err}"),
        }
    }
}

impl std::error::Error for TestRuleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TestRuleError::NoContent => None,
            TestRuleError::Build(err) => Some(err),
        }
    }
}

impl From<BuildError> for TestRuleError {
    fn from(err: BuildError) -> Self {
        TestRuleError::Build(err)
    }
}

type Content = Box<dyn FnMut(&BuildContext) -> ComponentRef>;

/// Headless harness for driving generations of a component tree in tests.
///
/// The rule owns a root family whose listener is a [`StateUpdateQueue`], keeps
/// the installed content for later rebuilds, and remembers the previous
/// generation so tests can diff consecutive builds.
pub struct ScopeTestRule {
    queue: Arc<StateUpdateQueue>,
    scheduler: Arc<RecordingScheduler>,
    initial: Arc<ScopeRoot>,
    previous: Option<Arc<ScopeRoot>>,
    current: Option<BuildResult>,
    content: Option<Content>,
    options: BuildOptions,
    generations: usize,
}

impl ScopeTestRule {
    /// Rule with the default predicates and diagnostics collected on every build.
    pub fn new() -> Self {
        Self::with_predicates(
            vec![scopekit_core::BOUNDS_ANIMATION_PREDICATE],
            vec![scopekit_core::APPEARANCE_PREDICATE],
        )
    }

    pub fn with_predicates(
        component_predicates: Vec<ComponentPredicate>,
        controller_predicates: Vec<ControllerPredicate>,
    ) -> Self {
        let scheduler = Arc::new(RecordingScheduler::default());
        let queue = Arc::new(StateUpdateQueue::with_scheduler(scheduler.clone()));
        let listener: Arc<dyn StateListener> = queue.clone();
        let family = RootFamily::new(Some(listener), component_predicates, controller_predicates);
        Self {
            queue,
            scheduler,
            initial: Arc::new(ScopeRoot::new(family)),
            previous: None,
            current: None,
            content: None,
            options: BuildOptions {
                detect_collisions: true,
                detect_duplicates: true,
                ..BuildOptions::default()
            },
            generations: 0,
        }
    }

    /// Replaces the options used by every following build. The props and
    /// environment flags are managed by the rule.
    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    /// Installs `content` and builds it on top of the current generation.
    pub fn set_content(
        &mut self,
        content: impl FnMut(&BuildContext) -> ComponentRef + 'static,
    ) -> Result<&BuildResult, TestRuleError> {
        self.content = Some(Box::new(content));
        self.build(true, false)
    }

    /// Rebuilds the installed content as if new props arrived.
    pub fn rebuild(&mut self) -> Result<&BuildResult, TestRuleError> {
        self.build(true, false)
    }

    /// Rebuilds the installed content after an environment change.
    pub fn change_environment(&mut self) -> Result<&BuildResult, TestRuleError> {
        self.build(false, true)
    }

    /// Builds once if state updates are pending. Returns whether a build ran.
    pub fn pump_state_updates(&mut self) -> Result<bool, TestRuleError> {
        if !self.queue.has_pending() {
            return Ok(false);
        }
        self.build(false, false)?;
        Ok(true)
    }

    /// Queues a typed update for `handle` as a host would.
    pub fn enqueue_update<S>(&self, handle: ScopeHandleId, update: impl FnOnce(&S) -> S + Send + 'static)
    where
        S: std::any::Any + Send + Sync,
    {
        self.queue
            .enqueue(handle, scopekit_core::typed_update(update), UpdateMode::Asynchronous);
    }

    pub fn queue(&self) -> &Arc<StateUpdateQueue> {
        &self.queue
    }

    pub fn scheduler(&self) -> &RecordingScheduler {
        &self.scheduler
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    /// Number of builds run so far.
    pub fn generations(&self) -> usize {
        self.generations
    }

    /// Result of the latest build.
    pub fn result(&self) -> Option<&BuildResult> {
        self.current.as_ref()
    }

    /// Latest generation, or the empty initial root before the first build.
    pub fn scope_root(&self) -> Arc<ScopeRoot> {
        self.current
            .as_ref()
            .map(|result| Arc::clone(&result.scope_root))
            .unwrap_or_else(|| Arc::clone(&self.initial))
    }

    /// Handle of the first component of type `C` declared with `identifier`.
    pub fn handle_for<C: Component>(&self, identifier: impl Into<Identity>) -> Option<ScopeHandleId> {
        let identifier = identifier.into();
        let root = self.current.as_ref()?.scope_root.as_ref();
        root.nodes()
            .filter(|node| {
                node.key().is_some_and(|key| {
                    key.component_type() == ComponentType::of::<C>()
                        && key.identifier() == Some(&identifier)
                })
            })
            .find_map(|node| node.handle())
            .map(|handle| handle.id())
    }

    /// Latest component of type `C` owned by `handle`.
    pub fn component<C: Component>(&self, handle: ScopeHandleId) -> Option<&C> {
        self.current
            .as_ref()?
            .scope_root
            .component_for_handle(handle)?
            .downcast_ref::<C>()
    }

    /// Changes between the latest two generations.
    pub fn diff_from_previous(&self) -> ComponentTreeDiff {
        match &self.current {
            Some(result) => diff(&result.scope_root, self.previous.as_deref()),
            None => ComponentTreeDiff::default(),
        }
    }

    /// Text outline of the latest generation.
    pub fn dump_tree(&self) -> String {
        self.scope_root().dump_tree()
    }

    fn build(&mut self, props_changed: bool, environment_changed: bool) -> Result<&BuildResult, TestRuleError> {
        let Some(content) = self.content.as_mut() else {
            return Err(TestRuleError::NoContent);
        };
        let previous = self
            .current
            .as_ref()
            .map(|result| Arc::clone(&result.scope_root))
            .unwrap_or_else(|| Arc::clone(&self.initial));
        let options = BuildOptions {
            props_changed,
            environment_changed,
            ..self.options.clone()
        };
        let updates = self.queue.drain();
        let result = build_component(Some(&previous), updates, options, |ctx| content(ctx))?;
        log::debug!(
            "test build {} produced {} node(s) ({:?})",
            self.generations + 1,
            result.stats.nodes,
            result.trigger
        );
        self.generations += 1;
        self.previous = Some(previous);
        Ok(&*self.current.insert(result))
    }
}

impl Default for ScopeTestRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `f` against a fresh [`ScopeTestRule`].
pub fn run_test_build<R>(f: impl FnOnce(&mut ScopeTestRule) -> R) -> R {
    let mut rule = ScopeTestRule::new();
    f(&mut rule)
}

#[cfg(test)]
#[path = "tests/testing_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/generation_tests.rs"]
mod generation_tests;
