use std::{fmt, sync::Arc};

use crate::{
    point::InjectionPoint,
    types::{Configuration, Instance},
};

/// Notifications fired while a point moves through its lifecycle
///
/// Each one fires at most once per point and pass, in state order.
#[derive(Debug, Clone, Copy)]
pub enum LifecycleEvent<'a> {
    BeforeConfigured {
        point: &'a InjectionPoint,
        configurator: &'static str,
    },
    AfterConfigured {
        point: &'a InjectionPoint,
        configuration: &'a Configuration,
    },
    BeforeCallableCreated {
        point: &'a InjectionPoint,
    },
    AfterCallableCreated {
        point: &'a InjectionPoint,
    },
    BeforeInstantiated {
        point: &'a InjectionPoint,
    },
    AfterInstantiated {
        point: &'a InjectionPoint,
        instance: &'a Instance,
    },
    BeforeEnhanced {
        point: &'a InjectionPoint,
        instance: &'a Instance,
    },
    AfterEnhanced {
        point: &'a InjectionPoint,
        instance: &'a Instance,
    },
    BeforeDestroyed {
        point: &'a InjectionPoint,
        instance: &'a Instance,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BeforeConfigured,
    AfterConfigured,
    BeforeCallableCreated,
    AfterCallableCreated,
    BeforeInstantiated,
    AfterInstantiated,
    BeforeEnhanced,
    AfterEnhanced,
    BeforeDestroyed,
}
impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl LifecycleEvent<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            LifecycleEvent::BeforeConfigured { .. } => EventKind::BeforeConfigured,
            LifecycleEvent::AfterConfigured { .. } => EventKind::AfterConfigured,
            LifecycleEvent::BeforeCallableCreated { .. } => EventKind::BeforeCallableCreated,
            LifecycleEvent::AfterCallableCreated { .. } => EventKind::AfterCallableCreated,
            LifecycleEvent::BeforeInstantiated { .. } => EventKind::BeforeInstantiated,
            LifecycleEvent::AfterInstantiated { .. } => EventKind::AfterInstantiated,
            LifecycleEvent::BeforeEnhanced { .. } => EventKind::BeforeEnhanced,
            LifecycleEvent::AfterEnhanced { .. } => EventKind::AfterEnhanced,
            LifecycleEvent::BeforeDestroyed { .. } => EventKind::BeforeDestroyed,
        }
    }

    pub fn point(&self) -> &InjectionPoint {
        match self {
            LifecycleEvent::BeforeConfigured { point, .. }
            | LifecycleEvent::AfterConfigured { point, .. }
            | LifecycleEvent::BeforeCallableCreated { point }
            | LifecycleEvent::AfterCallableCreated { point }
            | LifecycleEvent::BeforeInstantiated { point }
            | LifecycleEvent::AfterInstantiated { point, .. }
            | LifecycleEvent::BeforeEnhanced { point, .. }
            | LifecycleEvent::AfterEnhanced { point, .. }
            | LifecycleEvent::BeforeDestroyed { point, .. } => point,
        }
    }
}

/// Receives lifecycle notifications, synchronously on the thread driving the step
pub trait LifecycleObserver: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent<'_>);
}
impl<F> LifecycleObserver for F
where
    F: Fn(&LifecycleEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &LifecycleEvent<'_>) {
        self(event)
    }
}

/// Observers in subscription order
#[derive(Clone, Default)]
pub struct EventBus {
    observers: Vec<Arc<dyn LifecycleObserver>>,
}
impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(mut self, observer: impl LifecycleObserver + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    pub fn fire(&self, event: LifecycleEvent<'_>) {
        tracing::trace!("{} for {}", event.kind(), event.point());
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }
}
