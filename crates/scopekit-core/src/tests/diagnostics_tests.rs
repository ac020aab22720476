use super::*;
use crate::diagnostics::{find_collisions, find_duplicates};
use std::sync::Arc;

#[derive(Debug)]
struct Photo;

impl Component for Photo {}

#[derive(Debug)]
struct Gallery {
    photos: Vec<ComponentRef>,
}

impl Component for Gallery {
    fn for_each_child(&self, visit: &mut dyn FnMut(&ComponentRef)) {
        for photo in &self.photos {
            visit(photo);
        }
    }
}

fn stateful_photo(ctx: &BuildContext) -> ComponentRef {
    ctx.component::<Photo>()
        .initial_state(|| false)
        .build(|_, _| Photo)
}

fn gallery(ctx: &BuildContext, photos: impl FnOnce(&BuildContext) -> Vec<ComponentRef>) -> ComponentRef {
    ctx.component::<Gallery>()
        .identifier("gallery")
        .build(|ctx, _| Gallery {
            photos: photos(ctx),
        })
}

fn collect_all() -> BuildOptions {
    BuildOptions::default().with_diagnostics(DiagnosticsPolicy::Collect)
}

#[test]
fn anonymous_stateless_siblings_do_not_collide() {
    let result = build_component(None, StateUpdateMap::new(), collect_all(), |ctx| {
        gallery(ctx, |ctx| vec![ctx.leaf(Photo), ctx.leaf(Photo), ctx.leaf(Photo)])
    })
    .expect("build succeeds");
    assert!(result.diagnostics.is_empty());

    let counters: Vec<_> = result
        .scope_root
        .nodes()
        .filter_map(|node| node.key())
        .filter(|key| key.component_type() == ComponentType::of::<Photo>())
        .map(ScopeKey::sibling_counter)
        .collect();
    assert_eq!(counters, [0, 1, 2]);
}

#[test]
fn scoped_siblings_without_identifier_collide() {
    let result = build_component(None, StateUpdateMap::new(), collect_all(), |ctx| {
        gallery(ctx, |ctx| {
            vec![stateful_photo(ctx), stateful_photo(ctx), stateful_photo(ctx)]
        })
    })
    .expect("build succeeds");

    assert_eq!(result.diagnostics.len(), 2);
    let reports = find_collisions(&result.scope_root);
    assert_eq!(reports.len(), 2);
    let owner = &result.component;
    let photos = &result
        .component
        .downcast_ref::<Gallery>()
        .expect("root is a gallery")
        .photos;
    for (report, photo) in reports.iter().zip(&photos[1..]) {
        assert!(Arc::ptr_eq(&report.component, photo));
        assert_eq!(report.key.component_type(), ComponentType::of::<Photo>());
        assert_eq!(report.key.sibling_counter(), 0);
        assert!(report
            .lowest_common_ancestor
            .as_ref()
            .is_some_and(|ancestor| Arc::ptr_eq(ancestor, owner)));
        let path: Vec<_> = report.backtrace.component_types().collect();
        assert_eq!(
            path,
            [Some(ComponentType::of::<Gallery>()), Some(ComponentType::of::<Photo>())]
        );
    }
    let message = result.diagnostics[0].to_string();
    assert!(message.starts_with("scope collision"), "{message}");
    assert!(message.contains("Gallery#0(\"gallery\") > Photo#0"), "{message}");
}

#[test]
fn second_mover_gets_a_fresh_handle_every_generation() {
    let content = |ctx: &BuildContext| gallery(ctx, |ctx| vec![stateful_photo(ctx), stateful_photo(ctx)]);
    let first = build_component(None, StateUpdateMap::new(), BuildOptions::default(), content)
        .expect("build succeeds");
    let second = build_component(
        Some(&first.scope_root),
        StateUpdateMap::new(),
        BuildOptions::default(),
        content,
    )
    .expect("build succeeds");

    let photo_handles = |root: &ScopeRoot| -> Vec<ScopeHandleId> {
        root.nodes()
            .filter(|node| node.key().is_some_and(|key| key.component_type() == ComponentType::of::<Photo>()))
            .filter_map(|node| node.handle().map(|handle| handle.id()))
            .collect()
    };
    let before = photo_handles(&first.scope_root);
    let after = photo_handles(&second.scope_root);
    assert_eq!(before[0], after[0]);
    assert_ne!(before[1], after[1]);
}

#[test]
fn collisions_at_the_top_have_no_ancestor() {
    let result = build_component(None, StateUpdateMap::new(), collect_all(), |ctx| {
        let first = stateful_photo(ctx);
        let _second = stateful_photo(ctx);
        first
    })
    .expect("build succeeds");
    let reports = find_collisions(&result.scope_root);
    assert_eq!(reports.len(), 1);
    assert!(reports[0].lowest_common_ancestor.is_none());
    assert!(result.diagnostics[0].to_string().contains("under the root"));
}

#[test]
fn shared_instance_is_reported_as_duplicate() {
    let result = build_component(None, StateUpdateMap::new(), collect_all(), |ctx| {
        gallery(ctx, |ctx| {
            let photo = ctx.leaf(Photo);
            vec![Arc::clone(&photo), ctx.leaf(Photo), photo]
        })
    })
    .expect("build succeeds");

    let duplicates = find_duplicates(&result.scope_root);
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].backtrace.len(), 2);
    assert!(matches!(
        result.diagnostics.as_slice(),
        [Diagnostic::Duplicate(report)] if Arc::ptr_eq(&report.component, &duplicates[0].component)
    ));
}

#[test]
fn fail_policy_turns_diagnostics_into_an_error() {
    let options = BuildOptions::default().with_diagnostics(DiagnosticsPolicy::Fail);
    let err = build_component(None, StateUpdateMap::new(), options, |ctx| {
        gallery(ctx, |ctx| vec![stateful_photo(ctx), stateful_photo(ctx)])
    })
    .unwrap_err();

    let BuildError::Diagnostics(found) = &err;
    assert_eq!(found.len(), 1);
    assert!(matches!(found[0], Diagnostic::Collision(_)));
    assert!(err.to_string().starts_with("build produced 1 diagnostic(s)"));
}

#[test]
fn disabled_detection_reports_nothing() {
    let options = BuildOptions {
        detect_collisions: false,
        detect_duplicates: false,
        diagnostics_policy: DiagnosticsPolicy::Fail,
        ..BuildOptions::default()
    };
    let result = build_component(None, StateUpdateMap::new(), options, |ctx| {
        gallery(ctx, |ctx| vec![stateful_photo(ctx), stateful_photo(ctx)])
    })
    .expect("detection is off");
    assert!(result.diagnostics.is_empty());
    assert_eq!(diagnostics::detect(&result.scope_root, true, false).len(), 1);
}
