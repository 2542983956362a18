use std::{sync::Arc, time::Duration};

use thiserror::Error;

use crate::{
    point::InjectionPoint,
    registry::CapabilityKind,
    store::{LifecycleState, SlotKind},
    types::{DynError, ResourceType},
};

/// No provider of the requested kind is registered for a resource type
///
/// This is a configuration error of the suite, it is never retried.
#[derive(Error, Debug, Clone)]
#[error(
    "No {kind} was found for resource type '{resource_type}'. Make sure the extension providing it was registered during bootstrap. Currently registered {kind}s are for: [{}]",
    join(.registered)
)]
pub struct ProviderNotFound {
    pub resource_type: ResourceType,
    pub kind: CapabilityKind,
    /// Resource types that do have a provider of `kind`
    pub registered: Vec<ResourceType>,
}

/// A type erased value was not of the expected type
#[derive(Error, Debug, Clone)]
#[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
pub struct DowncastError {
    pub required_type: &'static str,
    pub actual_type: &'static str,
}

/// Errors of a [LazyCell](crate::lazy::LazyCell) computation
///
/// The first outcome is cached and replayed to every caller.
#[derive(Error, Debug, Clone)]
pub enum InstantiationError {
    /// The producer returned an error
    #[error("Instantiation failed - error: {0}")]
    Failed(Arc<DynError>),
    /// The producer did not finish within the deadline, its eventual outcome is discarded
    #[error("Instantiation timed out after {} seconds. Make sure the service backing the resource is running and reachable.", .after.as_secs_f64())]
    Timeout { after: Duration },
    /// The producer panicked or its worker could not report back
    #[error("Instantiation was aborted before producing a result")]
    Aborted,
}

/// Returned from an instantiator that noticed it was cancelled
#[derive(Error, Debug, Clone, Copy)]
#[error("Instantiation was cancelled")]
pub struct Cancelled;

/// Fatal errors for a single injection point
#[derive(Error, Debug, Clone)]
pub enum LifecycleError {
    #[error(transparent)]
    ProviderNotFound(#[from] ProviderNotFound),
    /// The configurator raised
    #[error("Configuring '{point}' failed - error: {error}")]
    Configuration {
        point: InjectionPoint,
        error: Arc<DynError>,
    },
    /// The instantiator raised, timed out or was aborted
    #[error("Creating '{point}' failed: {source}")]
    Instantiation {
        point: InjectionPoint,
        source: InstantiationError,
    },
    /// An enhancer raised while augmenting the raw instance
    #[error("Enhancer '{enhancer}' failed on '{point}' - error: {error}")]
    Enhancement {
        point: InjectionPoint,
        enhancer: &'static str,
        error: Arc<DynError>,
    },
    /// A lifecycle step was requested out of order
    #[error("'{point}' can not move from {from} to {to}")]
    InvalidTransition {
        point: InjectionPoint,
        from: LifecycleState,
        to: LifecycleState,
    },
    /// A step needs a slot which was never stored for the point
    #[error("'{point}' has no {slot} stored in this scope")]
    NotPrepared { point: InjectionPoint, slot: SlotKind },
    /// A filtered point set was expected to hold exactly one point
    #[error("Total injection points matched not equal to 1! Actual count: {}. Matched points: [{}]", .points.len(), join(.points))]
    NotSingle { points: Vec<InjectionPoint> },
}

/// Failure while tearing down one injection point
#[derive(Error, Debug, Clone)]
pub enum TeardownError {
    #[error("De-enhancing '{point}' with '{enhancer}' failed - error: {error}")]
    Deenhance {
        point: InjectionPoint,
        enhancer: &'static str,
        error: Arc<DynError>,
    },
    #[error("Destroying '{point}' failed - error: {error}")]
    Destroy {
        point: InjectionPoint,
        error: Arc<DynError>,
    },
    #[error(transparent)]
    ProviderNotFound(#[from] ProviderNotFound),
}

/// All teardown failures of a scope, collected after every point was attempted
#[derive(Error, Debug, Clone, Default)]
pub struct TeardownErrors {
    pub errors: Vec<TeardownError>,
}
impl std::fmt::Display for TeardownErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut display = Vec::new();
        display.push("Teardown had one or more errors:".to_string());
        for error in &self.errors {
            display.push(format!("- {}", error));
        }
        f.write_str(&display.join("\n"))
    }
}
impl TeardownErrors {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn into_result(self) -> Result<(), TeardownErrors> {
        match self.errors.is_empty() {
            true => Ok(()),
            false => Err(self),
        }
    }
}

/// Points of a scope that could not be prepared
///
/// Sibling points are still prepared, each failure is also replayed when its point is requested.
#[derive(Error, Debug, Clone, Default)]
pub struct PreparationErrors {
    pub errors: Vec<LifecycleError>,
}
impl std::fmt::Display for PreparationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut display = Vec::new();
        display.push("Preparing injection points had one or more errors:".to_string());
        for error in &self.errors {
            display.push(format!("- {}", error));
        }
        f.write_str(&display.join("\n"))
    }
}
impl PreparationErrors {
    pub(crate) fn into_result(self) -> Result<(), PreparationErrors> {
        match self.errors.is_empty() {
            true => Ok(()),
            false => Err(self),
        }
    }
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
