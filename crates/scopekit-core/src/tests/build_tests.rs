use super::*;
use crate::handle::ScopeHandle;
use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct Label {
    text: String,
}

impl Label {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_owned(),
        }
    }
}

impl Component for Label {}

#[derive(Debug)]
struct Stack {
    children: Vec<ComponentRef>,
}

impl Component for Stack {
    fn for_each_child(&self, visit: &mut dyn FnMut(&ComponentRef)) {
        for child in &self.children {
            visit(child);
        }
    }
}

#[derive(Debug)]
struct Counter {
    value: i32,
}

impl Component for Counter {}

#[derive(Debug)]
struct Section {
    child: ComponentRef,
}

impl Component for Section {
    fn for_each_child(&self, visit: &mut dyn FnMut(&ComponentRef)) {
        visit(&self.child);
    }
}

#[derive(Debug)]
struct Resizable {
    width: u32,
}

impl Component for Resizable {
    fn provides_bounds_animation(&self) -> bool {
        true
    }

    fn bounds_animation_from_previous(&self, previous: &dyn Component) -> Option<BoundsAnimation> {
        let previous = previous.downcast_ref::<Resizable>()?;
        (previous.width != self.width).then(|| BoundsAnimation::new(Duration::from_millis(250)))
    }
}

#[derive(Debug)]
struct Clock;

impl Component for Clock {}

struct Ticker;

impl Controller for Ticker {
    fn observes_appearance(&self) -> bool {
        true
    }
}

fn listening_root() -> (Arc<StateUpdateQueue>, Arc<ScopeRoot>) {
    let queue = Arc::new(StateUpdateQueue::new());
    let listener: Arc<dyn StateListener> = queue.clone();
    (queue, Arc::new(ScopeRoot::with_default_predicates(Some(listener))))
}

fn rebuild(
    previous: &Arc<ScopeRoot>,
    updates: StateUpdateMap,
    options: BuildOptions,
    content: impl FnOnce(&BuildContext) -> ComponentRef,
) -> BuildResult {
    build_component(Some(previous), updates, options, content).expect("build succeeds")
}

fn list(ctx: &BuildContext, children: impl FnOnce(&BuildContext) -> Vec<ComponentRef>) -> ComponentRef {
    ctx.component::<Stack>()
        .build(|ctx, _| Stack {
            children: children(ctx),
        })
}

fn counter(ctx: &BuildContext, identifier: &str) -> ComponentRef {
    ctx.component::<Counter>()
        .identifier(identifier)
        .initial_state(|| 0i32)
        .build(|_, handle| Counter {
            value: handle.state::<i32>().copied().unwrap_or_default(),
        })
}

fn handle_of<C: Component>(root: &ScopeRoot, identifier: &str) -> ScopeHandleId {
    let wanted = Identity::from(identifier);
    root.nodes()
        .find(|node| {
            node.key().is_some_and(|key| {
                key.component_type() == ComponentType::of::<C>() && key.identifier() == Some(&wanted)
            })
        })
        .and_then(TreeNode::handle)
        .map(ScopeHandle::id)
        .expect("no scope with that identifier")
}

fn counter_value(root: &ScopeRoot, handle: ScopeHandleId) -> i32 {
    root.component_for_handle(handle)
        .and_then(|component| component.downcast_ref::<Counter>())
        .map(|counter| counter.value)
        .expect("counter is part of the tree")
}

#[test]
fn first_build_has_empty_trigger() {
    let result = build_component(None, StateUpdateMap::new(), BuildOptions::default(), |ctx| {
        ctx.leaf(Label::new("hello"))
    })
    .expect("build succeeds");

    assert!(result.trigger.is_new_tree());
    assert_eq!(result.scope_root.len(), 1);
    assert!(result.bounds_animation.is_none());
    assert!(result.stats.cursor.is_balanced());
    assert_eq!(result.stats.cursor.depth, 0);
}

#[test]
fn build_trigger_combines_reasons() {
    let (_, empty) = listening_root();
    let none = StateUpdateMap::new();
    assert_eq!(build_trigger(None, &none, true, true), BuildTrigger::empty());
    assert_eq!(build_trigger(Some(&*empty), &none, true, true), BuildTrigger::empty());

    let populated = rebuild(&empty, StateUpdateMap::new(), BuildOptions::default(), |ctx| {
        ctx.leaf(Label::new("x"))
    })
    .scope_root;
    let mut pending = StateUpdateMap::new();
    pending.enqueue_fn(ScopeHandleId::from_raw(1), |value: &i32| *value);

    assert_eq!(
        build_trigger(Some(&*populated), &none, false, false),
        BuildTrigger::PROPS_UPDATE
    );
    assert_eq!(
        build_trigger(Some(&*populated), &pending, false, false),
        BuildTrigger::STATE_UPDATE
    );
    assert_eq!(
        build_trigger(Some(&*populated), &none, false, true),
        BuildTrigger::ENVIRONMENT_UPDATE
    );
    assert_eq!(
        build_trigger(Some(&*populated), &pending, true, true),
        BuildTrigger::all()
    );
}

#[test]
fn identity_is_stable_across_generations() {
    let (_, empty) = listening_root();
    let content = |ctx: &BuildContext| {
        list(ctx, |ctx| {
            vec![
                counter(ctx, "a"),
                ctx.leaf(Label::new("spacer")),
                counter(ctx, "b"),
            ]
        })
    };
    let first = rebuild(&empty, StateUpdateMap::new(), BuildOptions::default(), content);
    let second = rebuild(
        &first.scope_root,
        StateUpdateMap::new(),
        BuildOptions::default().props_changed(),
        content,
    );

    assert_eq!(second.trigger, BuildTrigger::PROPS_UPDATE);
    assert_eq!(second.scope_root.family_id(), first.scope_root.family_id());
    assert_ne!(second.scope_root.global_id(), first.scope_root.global_id());
    for identifier in ["a", "b"] {
        assert_eq!(
            handle_of::<Counter>(&first.scope_root, identifier),
            handle_of::<Counter>(&second.scope_root, identifier)
        );
    }

    let first_ids: Vec<_> = first
        .scope_root
        .nodes()
        .filter_map(|node| node.handle().map(ScopeHandle::id))
        .collect();
    let second_ids: Vec<_> = second
        .scope_root
        .nodes()
        .filter_map(|node| node.handle().map(ScopeHandle::id))
        .collect();
    assert_eq!(first_ids, second_ids);
}

#[test]
fn inserted_sibling_of_another_type_keeps_identities() {
    let (_, empty) = listening_root();
    let first = rebuild(&empty, StateUpdateMap::new(), BuildOptions::default(), |ctx| {
        list(ctx, |ctx| vec![ctx.leaf(Label::new("one")), counter(ctx, "c")])
    });
    let second = rebuild(&first.scope_root, StateUpdateMap::new(), BuildOptions::default(), |ctx| {
        list(ctx, |ctx| {
            vec![
                ctx.leaf(Counter { value: 9 }),
                ctx.leaf(Label::new("one")),
                counter(ctx, "c"),
            ]
        })
    });

    let label = |root: &ScopeRoot| {
        root.nodes()
            .find(|node| node.key().is_some_and(|key| key.component_type() == ComponentType::of::<Label>()))
            .and_then(TreeNode::handle)
            .map(ScopeHandle::id)
    };
    assert_eq!(label(&first.scope_root), label(&second.scope_root));
    assert_eq!(
        handle_of::<Counter>(&first.scope_root, "c"),
        handle_of::<Counter>(&second.scope_root, "c")
    );
}

#[test]
fn state_updates_fold_in_enqueue_order() {
    let (queue, empty) = listening_root();
    let content = |ctx: &BuildContext| list(ctx, |ctx| vec![counter(ctx, "a"), counter(ctx, "b")]);
    let first = rebuild(&empty, StateUpdateMap::new(), BuildOptions::default(), content);
    let a = handle_of::<Counter>(&first.scope_root, "a");
    let b = handle_of::<Counter>(&first.scope_root, "b");

    let handle = first.scope_root.handle(a).expect("handle for a");
    handle
        .update_state(|value: &i32| value + 1, UpdateMode::Asynchronous)
        .expect("family has a listener");
    handle
        .update_state(|value: &i32| value * 10, UpdateMode::Asynchronous)
        .expect("family has a listener");
    assert!(queue.has_pending());

    let second = rebuild(&first.scope_root, queue.drain(), BuildOptions::default(), content);
    assert_eq!(second.trigger, BuildTrigger::STATE_UPDATE);
    assert_eq!(counter_value(&second.scope_root, a), 10);
    assert_eq!(counter_value(&second.scope_root, b), 0);
    assert_eq!(second.stats.discarded_updates, 0);

    let third = rebuild(&second.scope_root, queue.drain(), BuildOptions::default(), content);
    assert_eq!(counter_value(&third.scope_root, a), 10);
    assert_eq!(third.trigger, BuildTrigger::PROPS_UPDATE);
}

#[test]
fn updates_for_missing_scopes_are_discarded() {
    let (_, empty) = listening_root();
    let first = rebuild(&empty, StateUpdateMap::new(), BuildOptions::default(), |ctx| counter(ctx, "a"));
    let mut updates = StateUpdateMap::new();
    updates.enqueue_fn(ScopeHandleId::from_raw(u64::MAX), |value: &i32| value + 1);

    let second = rebuild(&first.scope_root, updates, BuildOptions::default(), |ctx| counter(ctx, "a"));
    assert_eq!(second.stats.discarded_updates, 1);
    let a = handle_of::<Counter>(&second.scope_root, "a");
    assert_eq!(counter_value(&second.scope_root, a), 0);
}

#[test]
fn update_without_listener_is_an_error() {
    let result = build_component(None, StateUpdateMap::new(), BuildOptions::default(), |ctx| {
        counter(ctx, "solo")
    })
    .expect("build succeeds");
    let handle = handle_of::<Counter>(&result.scope_root, "solo");
    let err = result
        .scope_root
        .handle(handle)
        .expect("handle")
        .update_state(|value: &i32| value + 1, UpdateMode::Synchronous)
        .unwrap_err();
    assert_eq!(err, ScopeError::NoListener { handle });
}

#[test]
fn replaced_state_is_carried_to_the_next_generation() {
    let (_, empty) = listening_root();
    let content = |limit: i32| {
        move |ctx: &BuildContext| {
            ctx.component::<Counter>()
                .initial_state(|| 100i32)
                .build(|_, handle| {
                    let current = handle.state::<i32>().copied().unwrap_or_default();
                    if current > limit {
                        handle.replace_state(limit).expect("handle is unresolved");
                    }
                    Counter {
                        value: handle.state::<i32>().copied().unwrap_or_default(),
                    }
                })
        }
    };
    let first = rebuild(&empty, StateUpdateMap::new(), BuildOptions::default(), content(50));
    let second = rebuild(&first.scope_root, StateUpdateMap::new(), BuildOptions::default(), content(80));

    let value = |result: &BuildResult| {
        result
            .component
            .downcast_ref::<Counter>()
            .map(|counter| counter.value)
    };
    assert_eq!(value(&first), Some(50));
    assert_eq!(value(&second), Some(50));
}

#[test]
fn replace_state_fails_once_resolved() {
    let family = RootFamily::with_default_predicates(None);
    let mut handle = ScopeHandle::new(ComponentType::of::<Counter>(), family, TreeNodeId::ROOT, None);
    handle.replace_state(1i32).expect("unresolved handle accepts state");
    handle.resolve(None);
    assert_eq!(
        handle.replace_state(2i32),
        Err(ScopeError::AlreadyResolved { handle: handle.id() })
    );
    assert_eq!(handle.state::<i32>(), Some(&1));
}

#[test]
fn controller_is_unavailable_during_construction() {
    let (_, empty) = listening_root();
    let created = AtomicUsize::new(0);
    let during_build = RefCell::new(Vec::new());
    let content = |ctx: &BuildContext| {
        ctx.component::<Clock>()
            .controller(|_| {
                created.fetch_add(1, Ordering::SeqCst);
                Ticker
            })
            .build(|_, handle| {
                during_build.borrow_mut().push(handle.controller().map(|c| c.is_some()));
                Clock
            })
    };
    let first = rebuild(&empty, StateUpdateMap::new(), BuildOptions::default(), content);
    let second = rebuild(&first.scope_root, StateUpdateMap::new(), BuildOptions::default(), content);

    assert_eq!(created.load(Ordering::SeqCst), 1);
    let handle_id = first.scope_root.nodes().find_map(|node| node.handle()).map(ScopeHandle::id);
    let handle_id = handle_id.expect("clock scope");
    let errors = during_build.borrow();
    assert_eq!(errors.len(), 2);
    for outcome in errors.iter() {
        assert_eq!(outcome, &Err(ScopeError::UnresolvedHandle { handle: handle_id }));
    }

    let first_controller = first
        .scope_root
        .handle(handle_id)
        .and_then(|handle| handle.controller().ok().flatten())
        .cloned()
        .expect("controller exists after resolution");
    let second_controller = second
        .scope_root
        .handle(handle_id)
        .and_then(|handle| handle.controller().ok().flatten())
        .cloned()
        .expect("controller carried over");
    assert!(Arc::ptr_eq(&first_controller, &second_controller));
    assert!(first_controller.downcast_ref::<Ticker>().is_some());
    assert_eq!(second.scope_root.controllers_matching(APPEARANCE_PREDICATE).count(), 1);
}

#[test]
fn every_node_is_linked_and_finalized() {
    let (_, empty) = listening_root();
    let result = rebuild(&empty, StateUpdateMap::new(), BuildOptions::default(), |ctx| {
        list(ctx, |ctx| {
            vec![
                counter(ctx, "a"),
                list(ctx, |ctx| vec![ctx.leaf(Label::new("x")), counter(ctx, "b")]),
                ctx.with_key("footer", |ctx| ctx.leaf(Label::new("y"))),
            ]
        })
    });
    let root = &result.scope_root;
    assert_eq!(root.len(), 6);
    for node in root.nodes().filter(|node| !node.is_root()) {
        let parent = node.parent().expect("non-root nodes have a parent");
        assert!(root.children_of(parent).contains(&node.id()));
        assert!(parent < node.id());
        let handle = node.handle().expect("finalized node has a handle");
        assert!(handle.is_resolved());
        assert_eq!(handle.tree_node(), node.id());
        assert_eq!(root.node_for_handle(handle.id()).map(TreeNode::id), Some(node.id()));
        assert!(node.component().is_some());
    }
    assert!(root
        .root_component()
        .is_some_and(|component| Arc::ptr_eq(component, &result.component)));
}

#[test]
fn panicking_component_leaves_no_partial_nodes() {
    let ctx = BuildContext::new(None, StateUpdateMap::new(), BuildOptions::default());
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        ctx.component::<Stack>().build(|ctx, _| {
            let label = ctx.leaf(Label::new("before"));
            let _broken = ctx
                .component::<Section>()
                .build(|_, _| -> Section { panic!("construction failed") });
            Stack {
                children: vec![label],
            }
        })
    }));
    assert!(outcome.is_err());

    let stats = ctx.cursor_stats();
    assert_eq!(stats.depth, 1);
    assert_eq!(stats.pushes, stats.pops + 1);
    assert_eq!(ctx.current_node(), TreeNodeId::ROOT);

    let survivor = ctx.leaf(Label::new("after"));
    let result = ctx.finish(survivor).expect("build succeeds");
    assert_eq!(result.scope_root.len(), 1);
    assert!(result.stats.cursor.is_balanced());
    assert_eq!(result.scope_root.dump_tree().lines().count(), 2);
}

#[test]
fn caught_panic_in_child_keeps_the_parent() {
    let ctx = BuildContext::new(None, StateUpdateMap::new(), BuildOptions::default());
    let lost_handle = Cell::new(None);
    let stack = ctx.component::<Stack>().build(|ctx, _| {
        let failed = catch_unwind(AssertUnwindSafe(|| {
            ctx.component::<Section>().build(|ctx, _| -> Section {
                let _inner = ctx
                    .component::<Resizable>()
                    .initial_state(|| 10u32)
                    .build(|_, handle| {
                        lost_handle.set(Some(handle.id()));
                        Resizable { width: 10 }
                    });
                panic!("bad section")
            })
        }));
        assert!(failed.is_err());
        Stack {
            children: vec![ctx.leaf(Label::new("fine")), ctx.leaf(Label::new("also fine"))],
        }
    });
    let result = ctx.finish(stack).expect("build succeeds");

    let root = &result.scope_root;
    assert_eq!(root.len(), 3);
    let top = root.root_node().children()[0];
    assert_eq!(root.children_of(top).len(), 2);
    assert!(result.stats.cursor.is_balanced());

    let lost = lost_handle.get().expect("inner scope was created");
    assert!(root.node_for_handle(lost).is_none());
    assert!(root.handle(lost).is_none());
    assert!(root.component_for_handle(lost).is_none());
    assert_eq!(root.components_matching(BOUNDS_ANIMATION_PREDICATE).count(), 0);
    for node in root.nodes().filter(|node| !node.is_root()) {
        let handle = node.handle().expect("finalized node has a handle").id();
        assert_eq!(root.node_for_handle(handle).map(TreeNode::id), Some(node.id()));
    }
}

#[test]
fn updates_folded_into_abandoned_scopes_are_discarded() {
    let (_, empty) = listening_root();
    let content = |ctx: &BuildContext, fail: bool| {
        list(ctx, |ctx| {
            catch_unwind(AssertUnwindSafe(|| {
                ctx.component::<Section>().build(|ctx, _| {
                    let child = counter(ctx, "inner");
                    if fail {
                        panic!("section failed");
                    }
                    Section { child }
                })
            }))
            .ok()
            .into_iter()
            .collect()
        })
    };
    let first = rebuild(&empty, StateUpdateMap::new(), BuildOptions::default(), |ctx| content(ctx, false));
    let inner = handle_of::<Counter>(&first.scope_root, "inner");

    let mut updates = StateUpdateMap::new();
    updates.enqueue_fn(inner, |value: &i32| value + 1);
    updates.enqueue_fn(inner, |value: &i32| value + 1);
    let second = rebuild(&first.scope_root, updates, BuildOptions::default(), |ctx| content(ctx, true));

    assert_eq!(second.stats.discarded_updates, 2);
    assert!(second.scope_root.node_for_handle(inner).is_none());
    assert_eq!(second.scope_root.len(), 1);
}

#[test]
fn positional_and_scoped_siblings_of_one_type_do_not_collide() {
    let (_, empty) = listening_root();
    let content = |ctx: &BuildContext| {
        list(ctx, |ctx| {
            vec![
                ctx.leaf(Counter { value: -1 }),
                ctx.component::<Counter>()
                    .initial_state(|| 0i32)
                    .build(|_, handle| Counter {
                        value: handle.state::<i32>().copied().unwrap_or_default(),
                    }),
            ]
        })
    };
    let options = BuildOptions::default().with_diagnostics(DiagnosticsPolicy::Fail);
    let first = rebuild(&empty, StateUpdateMap::new(), options.clone(), content);
    let scoped = first
        .scope_root
        .nodes()
        .find(|node| node.key().is_some_and(ScopeKey::is_scoped))
        .and_then(TreeNode::handle)
        .map(ScopeHandle::id)
        .expect("scoped counter");

    let mut updates = StateUpdateMap::new();
    updates.enqueue_fn(scoped, |value: &i32| value + 5);
    let second = rebuild(&first.scope_root, updates, options, content);

    assert!(second.diagnostics.is_empty());
    assert_eq!(second.stats.discarded_updates, 0);
    assert_eq!(counter_value(&second.scope_root, scoped), 5);
    let keys: Vec<_> = second
        .scope_root
        .nodes()
        .filter_map(TreeNode::key)
        .filter(|key| key.component_type() == ComponentType::of::<Counter>())
        .map(|key| (key.is_scoped(), key.sibling_counter()))
        .collect();
    assert_eq!(keys, [(false, 0), (true, 0)]);
}

#[test]
fn with_key_separates_identical_scoped_siblings() {
    let (_, empty) = listening_root();
    let content = |ctx: &BuildContext| {
        list(ctx, |ctx| {
            (1..=3)
                .map(|row| ctx.with_key(row, |ctx| counter(ctx, "row")))
                .collect()
        })
    };
    let first = rebuild(
        &empty,
        StateUpdateMap::new(),
        BuildOptions::default().with_diagnostics(DiagnosticsPolicy::Fail),
        content,
    );
    let handles: Vec<_> = first
        .scope_root
        .nodes()
        .filter(|node| node.key().is_some_and(|key| key.component_type() == ComponentType::of::<Counter>()))
        .map(|node| {
            assert_eq!(node.key().map(|key| key.key_path().len()), Some(1));
            node.handle().map(ScopeHandle::id)
        })
        .collect();
    assert_eq!(handles.len(), 3);

    let second = rebuild(&first.scope_root, StateUpdateMap::new(), BuildOptions::default(), content);
    let again: Vec<_> = second
        .scope_root
        .nodes()
        .filter(|node| node.key().is_some_and(|key| key.component_type() == ComponentType::of::<Counter>()))
        .map(|node| node.handle().map(ScopeHandle::id))
        .collect();
    assert_eq!(handles, again);
}

fn section(ctx: &BuildContext, name: &'static str, runs: &Cell<usize>) -> ComponentRef {
    ctx.component::<Section>()
        .identifier(name)
        .scoped()
        .reusable()
        .build(|ctx, _| {
            runs.set(runs.get() + 1);
            Section {
                child: counter(ctx, name),
            }
        })
}

#[test]
fn clean_reusable_subtrees_are_copied_on_state_builds() {
    let (queue, empty) = listening_root();
    let runs = Cell::new(0);
    let content = |ctx: &BuildContext| {
        list(ctx, |ctx| vec![section(ctx, "left", &runs), section(ctx, "right", &runs)])
    };
    let first = rebuild(&empty, StateUpdateMap::new(), BuildOptions::default(), content);
    assert_eq!(runs.get(), 2);

    let left = handle_of::<Counter>(&first.scope_root, "left");
    let right = handle_of::<Counter>(&first.scope_root, "right");
    first
        .scope_root
        .handle(left)
        .expect("left counter")
        .update_state(|value: &i32| value + 1, UpdateMode::Synchronous)
        .expect("family has a listener");
    assert!(queue.wants_synchronous_build());

    let second = rebuild(&first.scope_root, queue.drain(), BuildOptions::default(), content);
    assert_eq!(second.trigger, BuildTrigger::STATE_UPDATE);
    assert_eq!(runs.get(), 3);
    assert_eq!(second.stats.reused_nodes, 2);
    assert_eq!(second.scope_root.len(), first.scope_root.len());
    assert_eq!(counter_value(&second.scope_root, left), 1);

    let right_section = handle_of::<Section>(&second.scope_root, "right");
    assert_eq!(right_section, handle_of::<Section>(&first.scope_root, "right"));
    let before = first.scope_root.component_for_handle(right_section).expect("right section");
    let after = second.scope_root.component_for_handle(right_section).expect("right section");
    assert!(Arc::ptr_eq(before, after));
    assert_eq!(handle_of::<Counter>(&second.scope_root, "right"), right);
    let copied = second.scope_root.handle(right).expect("copied handle");
    assert!(copied.is_resolved());
    assert_eq!(second.scope_root.node_for_handle(right).map(TreeNode::id), Some(copied.tree_node()));

    let third = rebuild(
        &second.scope_root,
        StateUpdateMap::new(),
        BuildOptions::default().props_changed(),
        content,
    );
    assert_eq!(third.stats.reused_nodes, 0);
    assert_eq!(runs.get(), 5);
}

#[test]
fn reuse_can_be_disabled() {
    let (queue, empty) = listening_root();
    let runs = Cell::new(0);
    let content = |ctx: &BuildContext| {
        list(ctx, |ctx| vec![section(ctx, "left", &runs), section(ctx, "right", &runs)])
    };
    let first = rebuild(&empty, StateUpdateMap::new(), BuildOptions::default(), content);
    let left = handle_of::<Counter>(&first.scope_root, "left");
    queue.enqueue(left, typed_update(|value: &i32| value + 2), UpdateMode::Asynchronous);

    let second = rebuild(
        &first.scope_root,
        queue.drain(),
        BuildOptions::default().without_reuse(),
        content,
    );
    assert_eq!(second.stats.reused_nodes, 0);
    assert_eq!(runs.get(), 4);
    assert_eq!(counter_value(&second.scope_root, left), 2);
}

#[test]
fn bounds_animation_is_computed_against_the_previous_generation() {
    let (_, empty) = listening_root();
    let content = |width: u32| {
        move |ctx: &BuildContext| {
            list(ctx, |ctx| {
                vec![
                    ctx.leaf(Label::new("title")),
                    ctx.component::<Resizable>()
                        .scoped()
                        .build(|_, _| Resizable { width }),
                ]
            })
        }
    };
    let first = rebuild(&empty, StateUpdateMap::new(), BuildOptions::default(), content(10));
    assert!(first.bounds_animation.is_none());
    assert_eq!(
        first
            .scope_root
            .components_matching(BOUNDS_ANIMATION_PREDICATE)
            .count(),
        1
    );

    let unchanged = rebuild(
        &first.scope_root,
        StateUpdateMap::new(),
        BuildOptions::default().props_changed(),
        content(10),
    );
    assert!(unchanged.bounds_animation.is_none());

    let resized = rebuild(
        &unchanged.scope_root,
        StateUpdateMap::new(),
        BuildOptions::default().props_changed(),
        content(20),
    );
    assert_eq!(
        resized.bounds_animation,
        Some(BoundsAnimation::new(Duration::from_millis(250)))
    );
}

#[test]
fn families_without_predicates_index_nothing() {
    let family = RootFamily::new(None, Vec::new(), Vec::new());
    let empty = Arc::new(ScopeRoot::new(family));
    let result = rebuild(&empty, StateUpdateMap::new(), BuildOptions::default(), |ctx| {
        ctx.component::<Resizable>()
            .controller(|_| Ticker)
            .build(|_, _| Resizable { width: 1 })
    });
    assert_eq!(result.scope_root.components_matching(BOUNDS_ANIMATION_PREDICATE).count(), 0);
    assert_eq!(result.scope_root.controllers_matching(APPEARANCE_PREDICATE).count(), 0);
}

#[test]
fn dump_tree_lists_keys_in_construction_order() {
    let result = build_component(None, StateUpdateMap::new(), BuildOptions::default(), |ctx| {
        list(ctx, |ctx| vec![ctx.leaf(Label::new("a")), counter(ctx, "b")])
    })
    .expect("build succeeds");
    let dump = result.scope_root.dump_tree();
    let lines: Vec<_> = dump.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].contains("root"));
    assert!(lines[1].trim_start().starts_with("[1] Stack#0"));
    assert!(lines[2].contains("Label#0"));
    assert!(lines[3].contains("Counter#0(\"b\")"));
    assert!(result.component.is::<Stack>());
    assert_eq!(
        result
            .component
            .downcast_ref::<Stack>()
            .map(|stack| stack.children.len()),
        Some(2)
    );
    let labels: Vec<_> = result
        .scope_root
        .nodes()
        .filter_map(|node| node.component()?.downcast_ref::<Label>())
        .map(|label| label.text.as_str())
        .collect();
    assert_eq!(labels, ["a"]);
}
