use std::sync::Arc;

use crate::{
    descriptor::{DescriptorSource, EmptyDescriptor},
    errors::{InstantiationError, LifecycleError, PreparationErrors, TeardownError, TeardownErrors},
    events::{EventBus, LifecycleEvent, LifecycleObserver},
    filter::PointFilter,
    lazy::LazyCell,
    point::InjectionPoint,
    registry::CapabilityRegistry,
    settings::LifecycleSettings,
    store::{LifecycleState, ScopedStore, SlotKind, SlotValue},
    types::Instance,
};

pub struct OrchestratorBuilder {
    registry: Arc<CapabilityRegistry>,
    descriptor: Arc<dyn DescriptorSource>,
    events: EventBus,
    settings: LifecycleSettings,
}

impl OrchestratorBuilder {
    pub fn descriptor(mut self, descriptor: impl DescriptorSource + 'static) -> Self {
        self.descriptor = Arc::new(descriptor);
        self
    }

    pub fn observe(mut self, observer: impl LifecycleObserver + 'static) -> Self {
        self.events = self.events.subscribe(observer);
        self
    }

    pub fn settings(mut self, settings: LifecycleSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> LifecycleOrchestrator {
        LifecycleOrchestrator {
            registry: self.registry,
            descriptor: self.descriptor,
            events: self.events,
            settings: self.settings,
        }
    }
}

/// Drives injection points through
/// `UNCONFIGURED -> CONFIGURED -> CALLABLE_READY -> INSTANTIATED -> ENHANCED -> DESTROYED`
///
/// The orchestrator holds no per scope state, every operation works on the [ScopedStore]
/// it is handed. It can be shared between test classes behind an `Arc`.
pub struct LifecycleOrchestrator {
    registry: Arc<CapabilityRegistry>,
    descriptor: Arc<dyn DescriptorSource>,
    events: EventBus,
    settings: LifecycleSettings,
}
impl std::fmt::Debug for LifecycleOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleOrchestrator")
            .field("registry", &self.registry)
            .field("events", &self.events)
            .field("settings", &self.settings)
            .finish()
    }
}

impl LifecycleOrchestrator {
    pub fn builder(registry: impl Into<Arc<CapabilityRegistry>>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            registry: registry.into(),
            descriptor: Arc::new(EmptyDescriptor),
            events: EventBus::new(),
            settings: LifecycleSettings::default(),
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    /// Configures the point and stores its instance callable, without instantiating
    ///
    /// A point whose key is already tracked by the store is not prepared again, the
    /// existing entry is reused. A failure is remembered and replayed whenever the
    /// point is requested later.
    pub fn prepare(&self, store: &ScopedStore, point: &InjectionPoint) -> Result<(), LifecycleError> {
        let _span = tracing::debug_span!("prepare", %point, scope = store.label()).entered();

        if store.is_tracked(point) {
            tracing::warn!(
                "{} is already prepared in {} scope '{}', reusing it",
                point,
                store.kind(),
                store.label()
            );
            return match store.failure(point) {
                Some(failure) => Err(failure),
                None => Ok(()),
            };
        }

        let result = self
            .configure(store, point)
            .and_then(|_| self.prepare_callable(store, point));
        if let Err(error) = &result {
            tracing::error!("Could not prepare {point}: {error}");
            store.record_failure(point, error.clone());
        }
        result
    }

    /// Prepares every point, a failing point does not stop its siblings
    pub fn prepare_all<'a>(
        &self,
        store: &ScopedStore,
        points: impl IntoIterator<Item = &'a InjectionPoint>,
    ) -> Result<(), PreparationErrors> {
        let errors = points
            .into_iter()
            .filter_map(|point| self.prepare(store, point).err())
            .collect();
        PreparationErrors { errors }.into_result()
    }

    pub fn configure(&self, store: &ScopedStore, point: &InjectionPoint) -> Result<(), LifecycleError> {
        let _span = tracing::debug_span!("configure", %point).entered();
        store.track(point);
        expect_state(store, point, LifecycleState::Configured)?;

        let configurator = self.registry.configurator(point.resource_type())?;
        self.events.fire(LifecycleEvent::BeforeConfigured {
            point,
            configurator: configurator.name(),
        });

        let configuration = configurator
            .create_configuration(self.descriptor.as_ref(), point)
            .map_err(|error| LifecycleError::Configuration {
                point: point.clone(),
                error: Arc::new(error),
            })?;
        tracing::debug!(
            "Configured {} with {} from {}",
            point,
            configuration.info(),
            configurator.name()
        );

        store.put(point, SlotValue::Configuration(configuration.clone()));
        store.advance(point, LifecycleState::Configured)?;
        self.events.fire(LifecycleEvent::AfterConfigured {
            point,
            configuration: &configuration,
        });
        Ok(())
    }

    /// Stores a lazy callable for the instance, the instantiator does not run yet
    pub fn prepare_callable(
        &self,
        store: &ScopedStore,
        point: &InjectionPoint,
    ) -> Result<(), LifecycleError> {
        let _span = tracing::debug_span!("prepare_callable", %point).entered();
        expect_state(store, point, LifecycleState::CallableReady)?;

        let configuration = store
            .configuration(point)
            .ok_or_else(|| not_prepared(point, SlotKind::Configuration))?;
        let instantiator = self.registry.instantiator(point.resource_type())?;
        // An instance nothing can release must never be created
        self.registry.destructor(point.resource_type())?;

        self.events
            .fire(LifecycleEvent::BeforeCallableCreated { point });

        let worker_name = format!("{}-{}", self.settings.worker_name, point.resource_type());
        let cell = LazyCell::named(worker_name, move |cancellation| {
            instantiator.create_instance(&configuration, cancellation)
        });
        store.put(point, SlotValue::Callable(cell));
        store.advance(point, LifecycleState::CallableReady)?;

        self.events
            .fire(LifecycleEvent::AfterCallableCreated { point });
        Ok(())
    }

    /// Forces the instance callable, bounded by the instantiation timeout
    ///
    /// Concurrent callers share one instantiation. Once instantiated, the raw instance
    /// is returned from the cache.
    pub fn instantiate(
        &self,
        store: &ScopedStore,
        point: &InjectionPoint,
    ) -> Result<Instance, LifecycleError> {
        let _span = tracing::debug_span!("instantiate", %point).entered();
        replay_failure(store, point)?;

        let state = current_state(store, point);
        match state {
            LifecycleState::CallableReady
            | LifecycleState::Instantiated
            | LifecycleState::Enhanced => {}
            from => {
                return Err(LifecycleError::InvalidTransition {
                    point: point.clone(),
                    from,
                    to: LifecycleState::Instantiated,
                })
            }
        }

        let cell = store
            .callable(point)
            .ok_or_else(|| not_prepared(point, SlotKind::Callable))?;

        let forced = cell.get_with(
            self.settings.instantiation_timeout,
            || {
                self.events
                    .fire(LifecycleEvent::BeforeInstantiated { point })
            },
            |result| match result {
                Ok(instance) => {
                    tracing::debug!("Instantiated {} as {}", point, instance.info());
                    if let Err(error) = store.advance(point, LifecycleState::Instantiated) {
                        tracing::warn!("{error}");
                    }
                    self.events
                        .fire(LifecycleEvent::AfterInstantiated { point, instance });
                }
                Err(error) => {
                    tracing::error!("Instantiating {point} failed: {error}");
                    store.record_failure(point, instantiation_error(point, error.clone()));
                }
            },
        );

        forced
            .result
            .map_err(|error| instantiation_error(point, error))
    }

    /// Runs the raw instance through the enhancer chain, once
    ///
    /// Concurrent requests for the same point wait for the first one. `AfterEnhanced`
    /// fires once the point's lock is released, so observers may request the point again.
    pub fn enhance(&self, store: &ScopedStore, point: &InjectionPoint) -> Result<Instance, LifecycleError> {
        let _span = tracing::debug_span!("enhance", %point).entered();
        replay_failure(store, point)?;

        let lock = store.enhance_lock(point);
        let instance = {
            let _guard = lock.lock();
            match current_state(store, point) {
                LifecycleState::Enhanced => {
                    return store
                        .enhanced(point)
                        .map(|enhanced| enhanced.instance)
                        .ok_or_else(|| not_prepared(point, SlotKind::Enhanced))
                }
                LifecycleState::Instantiated => {}
                from => {
                    return Err(LifecycleError::InvalidTransition {
                        point: point.clone(),
                        from,
                        to: LifecycleState::Enhanced,
                    })
                }
            }

            let raw = store
                .callable(point)
                .and_then(|cell| cell.peek())
                .ok_or_else(|| not_prepared(point, SlotKind::Callable))?
                .map_err(|error| instantiation_error(point, error))?;

            let chain = self.registry.enhancers(point.resource_type());
            self.events.fire(LifecycleEvent::BeforeEnhanced {
                point,
                instance: &raw,
            });

            match chain.apply(raw, point) {
                Ok(enhanced) => {
                    tracing::debug!("Enhanced {} with {:?}", point, chain);
                    let instance = enhanced.instance.clone();
                    store.put(point, SlotValue::Enhanced(enhanced));
                    store.advance(point, LifecycleState::Enhanced)?;
                    instance
                }
                Err(failure) => {
                    let failure = *failure;
                    let error = LifecycleError::Enhancement {
                        point: point.clone(),
                        enhancer: failure.enhancer,
                        error: Arc::new(failure.error),
                    };
                    tracing::error!("{error}");
                    // Teardown unwinds the steps that did apply
                    store.put(point, SlotValue::Enhanced(failure.partial));
                    store.record_failure(point, error.clone());
                    return Err(error);
                }
            }
        };

        self.events.fire(LifecycleEvent::AfterEnhanced {
            point,
            instance: &instance,
        });
        Ok(instance)
    }

    /// The value test code receives for the point, instantiating and enhancing on first use
    ///
    /// Returns `None` for points the store does not know or which were destroyed.
    pub fn current_value(
        &self,
        store: &ScopedStore,
        point: &InjectionPoint,
    ) -> Result<Option<Instance>, LifecycleError> {
        let state = match store.state(point) {
            None | Some(LifecycleState::Destroyed) => return Ok(None),
            Some(state) => state,
        };
        replay_failure(store, point)?;

        match state {
            LifecycleState::Enhanced => self.enhance(store, point).map(Some),
            LifecycleState::CallableReady | LifecycleState::Instantiated => {
                self.instantiate(store, point)?;
                self.enhance(store, point).map(Some)
            }
            _ => Err(not_prepared(point, SlotKind::Callable)),
        }
    }

    /// The enhanced value if it already exists, never instantiates
    pub fn peek(&self, store: &ScopedStore, point: &InjectionPoint) -> Option<Instance> {
        match store.state(point)? {
            LifecycleState::Enhanced => store.enhanced(point).map(|enhanced| enhanced.instance),
            _ => None,
        }
    }

    pub fn state(&self, store: &ScopedStore, point: &InjectionPoint) -> Option<LifecycleState> {
        store.state(point)
    }

    /// Releases the point: de-enhances in reverse order, then destroys the raw instance
    ///
    /// Points that never got an instance are retired without calling any provider.
    pub fn destroy(&self, store: &ScopedStore, point: &InjectionPoint) -> Result<(), TeardownErrors> {
        let mut errors = Vec::new();
        self.destroy_into(store, point, &mut errors);
        TeardownErrors { errors }.into_result()
    }

    /// Destroys every point of the store, last prepared first
    ///
    /// Failures don't stop the teardown, they are reported together once every point
    /// was attempted.
    pub fn teardown(&self, store: &ScopedStore) -> Result<(), TeardownErrors> {
        let _span = tracing::debug_span!("teardown", scope = store.label()).entered();
        self.teardown_points(store, store.points())
    }

    /// Like [LifecycleOrchestrator::teardown], restricted to the points accepted by the filter
    pub fn teardown_matching(
        &self,
        store: &ScopedStore,
        filter: &dyn PointFilter,
    ) -> Result<(), TeardownErrors> {
        let _span = tracing::debug_span!("teardown_matching", scope = store.label()).entered();
        self.teardown_points(store, store.find(filter).into_vec())
    }

    fn teardown_points(
        &self,
        store: &ScopedStore,
        points: Vec<InjectionPoint>,
    ) -> Result<(), TeardownErrors> {
        let mut errors = Vec::new();
        for point in points.iter().rev() {
            self.destroy_into(store, point, &mut errors);
        }
        TeardownErrors { errors }.into_result()
    }

    fn destroy_into(
        &self,
        store: &ScopedStore,
        point: &InjectionPoint,
        errors: &mut Vec<TeardownError>,
    ) {
        let _span = tracing::debug_span!("destroy", %point).entered();
        match store.state(point) {
            None | Some(LifecycleState::Destroyed) => return,
            Some(_) => {}
        }

        let raw = store
            .callable(point)
            .and_then(|cell| cell.peek())
            .and_then(Result::ok);
        let Some(raw) = raw else {
            tracing::debug!("{point} was never instantiated, nothing to destroy");
            store.retire(point);
            return;
        };

        let enhanced = store.enhanced(point);
        let exposed = enhanced
            .as_ref()
            .map(|enhanced| enhanced.instance.clone())
            .unwrap_or_else(|| raw.clone());
        self.events.fire(LifecycleEvent::BeforeDestroyed {
            point,
            instance: &exposed,
        });

        if let Some(enhanced) = enhanced {
            let (unwound, failures) = enhanced.record.unwind(exposed, point);
            for failure in failures {
                tracing::warn!(
                    "De-enhancing {} with {} failed: {}",
                    point,
                    failure.enhancer,
                    failure.error
                );
                errors.push(TeardownError::Deenhance {
                    point: point.clone(),
                    enhancer: failure.enhancer,
                    error: Arc::new(failure.error),
                });
            }
            if !unwound.ptr_eq(&raw) {
                tracing::warn!(
                    "De-enhancing {point} did not lead back to the raw instance, destroying the raw instance"
                );
            }
        }

        match self.registry.destructor(point.resource_type()) {
            Ok(destructor) => {
                tracing::debug!("Destroying {} with {}", point, destructor.name());
                if let Err(error) = destructor.destroy_instance(&raw) {
                    tracing::warn!("Destroying {point} failed: {error}");
                    errors.push(TeardownError::Destroy {
                        point: point.clone(),
                        error: Arc::new(error),
                    });
                }
            }
            Err(not_found) => errors.push(not_found.into()),
        }

        store.retire(point);
    }
}

fn current_state(store: &ScopedStore, point: &InjectionPoint) -> LifecycleState {
    store.state(point).unwrap_or(LifecycleState::Unconfigured)
}

fn expect_state(
    store: &ScopedStore,
    point: &InjectionPoint,
    to: LifecycleState,
) -> Result<(), LifecycleError> {
    let from = current_state(store, point);
    match from.can_advance_to(to) {
        true => Ok(()),
        false => Err(LifecycleError::InvalidTransition {
            point: point.clone(),
            from,
            to,
        }),
    }
}

fn replay_failure(store: &ScopedStore, point: &InjectionPoint) -> Result<(), LifecycleError> {
    match store.failure(point) {
        Some(failure) => Err(failure),
        None => Ok(()),
    }
}

fn not_prepared(point: &InjectionPoint, slot: SlotKind) -> LifecycleError {
    LifecycleError::NotPrepared {
        point: point.clone(),
        slot,
    }
}

fn instantiation_error(point: &InjectionPoint, error: InstantiationError) -> LifecycleError {
    LifecycleError::Instantiation {
        point: point.clone(),
        source: error,
    }
}
