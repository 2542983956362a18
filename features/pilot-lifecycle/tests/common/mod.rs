#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, Once,
    },
    thread::sleep,
    time::Duration,
};

use pilot_lifecycle::{
    Cancellation, Configurator, DescriptorSource, Destructor, DynError, EventKind,
    InjectionPoint, Instantiator, LifecycleEvent, RegistryBuilder, ResourceType,
};

pub const WIDGET: ResourceType = ResourceType::named("Widget");

static TRACING: Once = Once::new();

/// Logs to the test output, filtered by RUST_LOG
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug)]
pub struct Widget {
    pub id: usize,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct WidgetConfig {
    pub label: String,
}

/// Shared view on what the widget providers did
#[derive(Clone, Default)]
pub struct Tracker {
    pub created: Arc<AtomicUsize>,
    pub destroyed: Arc<Mutex<Vec<Arc<Widget>>>>,
}
impl Tracker {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed_labels(&self) -> Vec<String> {
        self.destroyed
            .lock()
            .unwrap()
            .iter()
            .map(|widget| widget.label.clone())
            .collect()
    }
}

/// Labels widgets after the `label` property of `widget`, or the point's qualifier
pub struct WidgetConfigurator;
impl Configurator for WidgetConfigurator {
    type Configuration = WidgetConfig;

    fn create_configuration(
        &self,
        descriptor: &dyn DescriptorSource,
        point: &InjectionPoint,
    ) -> Result<WidgetConfig, DynError> {
        let label = descriptor
            .lookup(&format!("widget-{}", point.qualifier()), "label")
            .unwrap_or_else(|| point.qualifier().name().to_string());
        Ok(WidgetConfig { label })
    }
}

pub struct WidgetInstantiator {
    pub tracker: Tracker,
    pub delay: Duration,
    pub fail_with: Option<&'static str>,
}
impl Instantiator for WidgetInstantiator {
    type Configuration = WidgetConfig;
    type Provides = Widget;

    fn create_instance(
        &self,
        configuration: &WidgetConfig,
        _cancellation: &Cancellation,
    ) -> Result<Widget, DynError> {
        let id = self.tracker.created.fetch_add(1, Ordering::SeqCst);
        sleep(self.delay);
        if let Some(message) = self.fail_with {
            return Err(message.into());
        }
        Ok(Widget {
            id,
            label: configuration.label.clone(),
        })
    }
}

pub struct WidgetDestructor {
    pub tracker: Tracker,
    /// Widgets with this label refuse to be destroyed
    pub refuse: Option<&'static str>,
}
impl Destructor for WidgetDestructor {
    type Destroys = Widget;

    fn destroy_instance(&self, instance: Arc<Widget>) -> Result<(), DynError> {
        if self.refuse == Some(instance.label.as_str()) {
            return Err(format!("{} is stuck", instance.label).into());
        }
        self.tracker.destroyed.lock().unwrap().push(instance);
        Ok(())
    }
}

pub fn widget_registry(tracker: &Tracker) -> RegistryBuilder {
    widget_registry_with(tracker, Duration::ZERO)
}

pub fn widget_registry_with(tracker: &Tracker, delay: Duration) -> RegistryBuilder {
    RegistryBuilder::new()
        .add_configurator(WIDGET, WidgetConfigurator)
        .add_instantiator(
            WIDGET,
            WidgetInstantiator {
                tracker: tracker.clone(),
                delay,
                fail_with: None,
            },
        )
        .add_destructor(
            WIDGET,
            WidgetDestructor {
                tracker: tracker.clone(),
                refuse: None,
            },
        )
}

pub type EventLog = Arc<Mutex<Vec<(EventKind, String)>>>;

/// Observer appending every event with the point it concerns
pub fn recorder(log: EventLog) -> impl Fn(&LifecycleEvent<'_>) + Send + Sync {
    move |event: &LifecycleEvent<'_>| {
        log.lock()
            .unwrap()
            .push((event.kind(), event.point().to_string()))
    }
}
