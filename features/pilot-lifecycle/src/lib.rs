//! Pluggable resource lifecycle for test runners
//!
//! Providers for configuring, instantiating, enhancing and destroying a resource type
//! are registered once at bootstrap. The [LifecycleOrchestrator] then takes every
//! requested [InjectionPoint] through its lifecycle inside a [ScopedStore]: configured
//! eagerly, instantiated lazily and at most once, enhanced, and destroyed in reverse
//! preparation order when the scope ends.

mod descriptor;
mod enhancer;
mod errors;
mod events;
mod filter;
mod lazy;
mod orchestrator;
mod point;
mod providers;
mod registry;
mod session;
mod settings;
mod store;
mod types;

pub use descriptor::{DescriptorSource, EmptyDescriptor};
pub use enhancer::{
    Augmented, AugmentingEnhancer, EnhanceFailure, EnhancedInstance, EnhancementRecord,
    EnhancementStep, Enhancer, EnhancerChain, UnwindFailure,
};
pub use errors::{
    Cancelled, DowncastError, InstantiationError, LifecycleError, PreparationErrors,
    ProviderNotFound, TeardownError, TeardownErrors,
};
pub use events::{EventBus, EventKind, LifecycleEvent, LifecycleObserver};
pub use filter::{
    by_annotation_presence, by_deployment_name_pattern, by_lifecycle, negate, AnnotationFilter,
    Both, DeploymentFilter, Inverse, LifecycleFilter, PointFilter, PointFilterExt, PointSet,
};
pub use lazy::{Cancellation, Forced, LazyCell};
pub use orchestrator::{LifecycleOrchestrator, OrchestratorBuilder};
pub use point::{InjectionPoint, PointKey, Scope};
pub use providers::{
    Configurator, Destructor, DynConfigurator, DynDestructor, DynInstantiator, Instantiator,
};
pub use registry::{CapabilityKind, CapabilityRegistry, Provider, RegistryBuilder};
pub use session::ClassSession;
pub use settings::LifecycleSettings;
pub use store::{LifecycleState, ScopeKind, ScopedStore, SlotKind, SlotValue};
pub use types::{Configuration, DynError, Injectable, Instance, Qualifier, ResourceType, TypeInfo};
