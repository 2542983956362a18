mod common;

use std::{
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Barrier, Mutex, OnceLock, Weak},
    thread,
    time::Duration,
};

use common::*;
use pilot_lifecycle::{
    CapabilityKind, EventKind, InjectionPoint, InstantiationError, LifecycleError,
    LifecycleEvent, LifecycleOrchestrator, LifecycleSettings, LifecycleState, Qualifier, RegistryBuilder,
    ResourceType, ScopedStore, TeardownError,
};
use rstest::rstest;

fn orchestrator(registry: RegistryBuilder) -> LifecycleOrchestrator {
    init_tracing();
    LifecycleOrchestrator::builder(registry.build()).build()
}

fn qualified(name: &'static str) -> InjectionPoint {
    InjectionPoint::class(WIDGET).with_qualifier(Qualifier::named(name))
}

#[test]
fn widget_is_created_lazily_and_destroyed_exactly_once() {
    let tracker = Tracker::default();
    let orchestrator = orchestrator(widget_registry(&tracker));
    let store = ScopedStore::class("WidgetTest");
    let point = InjectionPoint::class(WIDGET);

    orchestrator.prepare(&store, &point).unwrap();
    assert_eq!(tracker.created(), 0);

    let value = orchestrator.current_value(&store, &point).unwrap().unwrap();
    let widget = value.view::<Widget>().unwrap();
    assert_eq!(widget.label, "default");
    assert_eq!(tracker.created(), 1);

    orchestrator.teardown(&store).unwrap();

    let destroyed = tracker.destroyed.lock().unwrap();
    assert_eq!(destroyed.len(), 1);
    assert!(Arc::ptr_eq(&destroyed[0], &widget));
    assert_eq!(store.state(&point), Some(LifecycleState::Destroyed));
}

#[test]
fn qualifiers_get_independent_instances() {
    let tracker = Tracker::default();
    let orchestrator = orchestrator(widget_registry(&tracker));
    let store = ScopedStore::class("WidgetTest");
    let default = InjectionPoint::class(WIDGET);
    let secondary = qualified("secondary");

    orchestrator
        .prepare_all(&store, [&default, &secondary])
        .unwrap();
    let first = orchestrator.current_value(&store, &default).unwrap().unwrap();
    let second = orchestrator.current_value(&store, &secondary).unwrap().unwrap();

    assert!(!first.ptr_eq(&second));
    assert_ne!(
        first.view::<Widget>().unwrap().id,
        second.view::<Widget>().unwrap().id
    );

    orchestrator.destroy(&store, &secondary).unwrap();
    assert_eq!(tracker.destroyed_labels(), vec!["secondary"]);
    assert!(orchestrator.current_value(&store, &default).unwrap().is_some());

    orchestrator.teardown(&store).unwrap();
    assert_eq!(tracker.destroyed_labels(), vec!["secondary", "default"]);
}

#[test]
fn descriptor_properties_reach_the_configurator() {
    let tracker = Tracker::default();
    let descriptor = BTreeMap::from([(
        "widget-secondary".to_string(),
        BTreeMap::from([("label".to_string(), "sidebar".to_string())]),
    )]);
    let orchestrator = LifecycleOrchestrator::builder(widget_registry(&tracker).build())
        .descriptor(descriptor)
        .build();
    let store = ScopedStore::class("WidgetTest");
    let point = qualified("secondary");

    orchestrator.prepare(&store, &point).unwrap();
    let value = orchestrator.current_value(&store, &point).unwrap().unwrap();

    assert_eq!(value.view::<Widget>().unwrap().label, "sidebar");
}

#[rstest]
#[case(2)]
#[case(8)]
#[case(32)]
fn concurrent_callers_share_one_instance(#[case] callers: usize) {
    let tracker = Tracker::default();
    let orchestrator = Arc::new(orchestrator(widget_registry_with(
        &tracker,
        Duration::from_millis(30),
    )));
    let store = Arc::new(ScopedStore::class("WidgetTest"));
    let point = InjectionPoint::class(WIDGET);
    orchestrator.prepare(&store, &point).unwrap();

    let barrier = Arc::new(Barrier::new(callers));
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let orchestrator = orchestrator.clone();
            let store = store.clone();
            let point = point.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                orchestrator.current_value(&store, &point).unwrap().unwrap()
            })
        })
        .collect();
    let values: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(tracker.created(), 1);
    assert!(values.iter().all(|value| value.ptr_eq(&values[0])));
}

#[test]
fn concurrent_callers_share_one_failure() {
    let tracker = Tracker::default();
    let registry = RegistryBuilder::new()
        .add_configurator(WIDGET, WidgetConfigurator)
        .add_instantiator(
            WIDGET,
            WidgetInstantiator {
                tracker: tracker.clone(),
                delay: Duration::from_millis(30),
                fail_with: Some("no display"),
            },
        )
        .add_destructor(
            WIDGET,
            WidgetDestructor {
                tracker: tracker.clone(),
                refuse: None,
            },
        );
    let orchestrator = Arc::new(orchestrator(registry));
    let store = Arc::new(ScopedStore::class("WidgetTest"));
    let point = InjectionPoint::class(WIDGET);
    orchestrator.prepare(&store, &point).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let orchestrator = orchestrator.clone();
            let store = store.clone();
            let point = point.clone();
            thread::spawn(move || orchestrator.current_value(&store, &point).unwrap_err())
        })
        .collect();

    for handle in handles {
        let err = handle.join().unwrap();
        assert!(matches!(
            err,
            LifecycleError::Instantiation {
                source: InstantiationError::Failed(_),
                ..
            }
        ));
        assert!(err.to_string().contains("no display"));
    }
    assert_eq!(tracker.created(), 1);
}

#[test]
fn notifications_follow_the_lifecycle_once() {
    let tracker = Tracker::default();
    let log = EventLog::default();
    let orchestrator = LifecycleOrchestrator::builder(widget_registry(&tracker).build())
        .observe(recorder(log.clone()))
        .build();
    let store = ScopedStore::method("notifies");
    let point = InjectionPoint::method(WIDGET);

    orchestrator.prepare(&store, &point).unwrap();
    orchestrator.current_value(&store, &point).unwrap();
    orchestrator.current_value(&store, &point).unwrap();
    orchestrator.teardown(&store).unwrap();
    orchestrator.teardown(&store).unwrap();

    let kinds: Vec<_> = log.lock().unwrap().iter().map(|(kind, _)| *kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::BeforeConfigured,
            EventKind::AfterConfigured,
            EventKind::BeforeCallableCreated,
            EventKind::AfterCallableCreated,
            EventKind::BeforeInstantiated,
            EventKind::AfterInstantiated,
            EventKind::BeforeEnhanced,
            EventKind::AfterEnhanced,
            EventKind::BeforeDestroyed,
        ]
    );
    assert!(log
        .lock()
        .unwrap()
        .iter()
        .all(|(_, point)| point == "Widget @default (method)"));
}

#[test]
fn teardown_runs_in_reverse_preparation_order() {
    let tracker = Tracker::default();
    let orchestrator = orchestrator(widget_registry(&tracker));
    let store = ScopedStore::class("WidgetTest");
    let points = [qualified("a"), qualified("b"), qualified("c")];

    orchestrator.prepare_all(&store, &points).unwrap();
    for point in &points {
        orchestrator.current_value(&store, point).unwrap();
    }
    orchestrator.teardown(&store).unwrap();

    assert_eq!(tracker.destroyed_labels(), vec!["c", "b", "a"]);
}

#[test]
fn teardown_attempts_every_point_and_aggregates_failures() {
    let tracker = Tracker::default();
    let registry = RegistryBuilder::new()
        .add_configurator(WIDGET, WidgetConfigurator)
        .add_instantiator(
            WIDGET,
            WidgetInstantiator {
                tracker: tracker.clone(),
                delay: Duration::ZERO,
                fail_with: None,
            },
        )
        .add_destructor(
            WIDGET,
            WidgetDestructor {
                tracker: tracker.clone(),
                refuse: Some("b"),
            },
        );
    let orchestrator = orchestrator(registry);
    let store = ScopedStore::class("WidgetTest");
    let points = [qualified("a"), qualified("b"), qualified("c")];
    orchestrator.prepare_all(&store, &points).unwrap();
    for point in &points {
        orchestrator.current_value(&store, point).unwrap();
    }

    let errors = orchestrator.teardown(&store).unwrap_err();

    assert_eq!(errors.errors.len(), 1);
    assert!(matches!(&errors.errors[0], TeardownError::Destroy { point, .. } if *point == points[1]));
    assert!(errors.to_string().contains("b is stuck"));
    assert_eq!(tracker.destroyed_labels(), vec!["c", "a"]);
    assert!(points
        .iter()
        .all(|point| store.state(point) == Some(LifecycleState::Destroyed)));
}

#[test]
fn timeout_is_replayed_and_no_instance_is_exposed() {
    let tracker = Tracker::default();
    let orchestrator = Arc::new(
        LifecycleOrchestrator::builder(
            widget_registry_with(&tracker, Duration::from_millis(300)).build(),
        )
        .settings(LifecycleSettings::new().with_timeout(Duration::from_millis(50)))
        .build(),
    );
    let store = Arc::new(ScopedStore::class("WidgetTest"));
    let point = InjectionPoint::class(WIDGET);
    orchestrator.prepare(&store, &point).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let orchestrator = orchestrator.clone();
            let store = store.clone();
            let point = point.clone();
            thread::spawn(move || orchestrator.current_value(&store, &point).unwrap_err())
        })
        .collect();
    for handle in handles {
        assert!(matches!(
            handle.join().unwrap(),
            LifecycleError::Instantiation {
                source: InstantiationError::Timeout { .. },
                ..
            }
        ));
    }

    // The late widget is discarded once the instantiator returns
    thread::sleep(Duration::from_millis(400));
    assert!(matches!(
        orchestrator.current_value(&store, &point),
        Err(LifecycleError::Instantiation {
            source: InstantiationError::Timeout { .. },
            ..
        })
    ));
    assert!(orchestrator.peek(&store, &point).is_none());
    assert_eq!(tracker.created(), 1);

    orchestrator.teardown(&store).unwrap();
    assert!(tracker.destroyed_labels().is_empty());
}

#[test]
fn missing_provider_only_fails_its_own_point() {
    let tracker = Tracker::default();
    let orchestrator = orchestrator(widget_registry(&tracker));
    let store = ScopedStore::class("WidgetTest");
    let gadget = InjectionPoint::class(ResourceType::named("Gadget"));
    let widget = InjectionPoint::class(WIDGET);

    let errors = orchestrator
        .prepare_all(&store, [&gadget, &widget])
        .unwrap_err();

    assert_eq!(errors.errors.len(), 1);
    match &errors.errors[0] {
        LifecycleError::ProviderNotFound(not_found) => {
            assert_eq!(not_found.kind, CapabilityKind::Configure);
            assert_eq!(not_found.registered, vec![WIDGET]);
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(matches!(
        orchestrator.current_value(&store, &gadget),
        Err(LifecycleError::ProviderNotFound(_))
    ));
    assert!(orchestrator.current_value(&store, &widget).unwrap().is_some());

    orchestrator.teardown(&store).unwrap();
    assert_eq!(tracker.destroyed_labels(), vec!["default"]);
}

#[test]
fn preparing_a_point_twice_reuses_the_entry() {
    let tracker = Tracker::default();
    let log = EventLog::default();
    let orchestrator = LifecycleOrchestrator::builder(widget_registry(&tracker).build())
        .observe(recorder(log.clone()))
        .build();
    let store = ScopedStore::class("WidgetTest");
    let point = InjectionPoint::class(WIDGET);

    orchestrator.prepare(&store, &point).unwrap();
    let first = orchestrator.current_value(&store, &point).unwrap().unwrap();
    orchestrator
        .prepare(&store, &point.clone().with_tag("Resize"))
        .unwrap();
    let second = orchestrator.current_value(&store, &point).unwrap().unwrap();

    assert!(first.ptr_eq(&second));
    assert_eq!(store.len(), 1);
    let configured = log
        .lock()
        .unwrap()
        .iter()
        .filter(|(kind, _)| *kind == EventKind::BeforeConfigured)
        .count();
    assert_eq!(configured, 1);
}

#[test]
fn stores_are_isolated_from_each_other() {
    let tracker = Tracker::default();
    let orchestrator = orchestrator(widget_registry(&tracker));
    let first_class = ScopedStore::class("FirstTest");
    let second_class = ScopedStore::class("SecondTest");
    let point = InjectionPoint::class(WIDGET);

    orchestrator.prepare(&first_class, &point).unwrap();
    orchestrator.prepare(&second_class, &point).unwrap();
    let first = orchestrator.current_value(&first_class, &point).unwrap().unwrap();
    let second = orchestrator.current_value(&second_class, &point).unwrap().unwrap();
    assert!(!first.ptr_eq(&second));

    orchestrator.teardown(&first_class).unwrap();
    assert!(orchestrator.current_value(&second_class, &point).unwrap().is_some());
    assert_eq!(tracker.destroyed.lock().unwrap().len(), 1);
}

#[test]
fn panicking_observer_does_not_wedge_the_point() {
    let tracker = Tracker::default();
    let orchestrator = LifecycleOrchestrator::builder(widget_registry(&tracker).build())
        .observe(|event: &LifecycleEvent<'_>| {
            if event.kind() == EventKind::AfterInstantiated {
                panic!("observer crashed");
            }
        })
        .build();
    let store = ScopedStore::class("WidgetTest");
    let point = InjectionPoint::class(WIDGET);
    orchestrator.prepare(&store, &point).unwrap();

    let crashed = panic::catch_unwind(AssertUnwindSafe(|| {
        orchestrator.current_value(&store, &point)
    }));
    assert!(crashed.is_err());

    let value = orchestrator.current_value(&store, &point).unwrap().unwrap();
    assert_eq!(value.view::<Widget>().unwrap().label, "default");
    assert_eq!(tracker.created(), 1);

    orchestrator.teardown(&store).unwrap();
    assert_eq!(tracker.destroyed_labels(), vec!["default"]);
}

type Context = Arc<OnceLock<(Weak<LifecycleOrchestrator>, Arc<ScopedStore>)>>;

#[test]
fn observers_may_request_points_of_the_same_store() {
    let tracker = Tracker::default();
    let main = qualified("main");
    let other = qualified("other");
    let context: Context = Arc::default();
    let requested: Arc<Mutex<Vec<String>>> = Arc::default();

    let observer = {
        let (context, requested) = (context.clone(), requested.clone());
        let (main, other) = (main.clone(), other.clone());
        move |event: &LifecycleEvent<'_>| {
            if event.point() != &main {
                return;
            }
            let point = match event.kind() {
                EventKind::BeforeEnhanced => &other,
                EventKind::AfterEnhanced => &main,
                _ => return,
            };
            let Some((orchestrator, store)) = context.get() else {
                return;
            };
            let Some(orchestrator) = orchestrator.upgrade() else {
                return;
            };
            let value = orchestrator.current_value(store, point).unwrap().unwrap();
            requested
                .lock()
                .unwrap()
                .push(value.view::<Widget>().unwrap().label.clone());
        }
    };
    let orchestrator = Arc::new(
        LifecycleOrchestrator::builder(widget_registry(&tracker).build())
            .observe(observer)
            .build(),
    );
    let store = Arc::new(ScopedStore::class("WidgetTest"));
    assert!(context
        .set((Arc::downgrade(&orchestrator), store.clone()))
        .is_ok());

    orchestrator.prepare_all(&store, [&main, &other]).unwrap();
    let value = orchestrator.current_value(&store, &main).unwrap().unwrap();

    assert_eq!(value.view::<Widget>().unwrap().label, "main");
    assert_eq!(*requested.lock().unwrap(), vec!["other", "main"]);
    assert_eq!(tracker.created(), 2);
}
