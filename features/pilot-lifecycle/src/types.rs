use std::{
    any::{Any, TypeId},
    fmt::{self, Debug},
    sync::Arc,
};

use crate::{enhancer::Augmented, errors::DowncastError};

/// Errors raised by provider implementations
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Instances are created on an instantiation worker and read from any test thread
/// So anything injectable needs to be Send + Sync + 'static
pub trait Injectable: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> Injectable for T {}

/// Type Name and Type Id of a concrete Rust type
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct TypeInfo {
    pub type_name: &'static str,
    pub type_id: TypeId,
}
impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}
impl TypeInfo {
    pub fn of<T: 'static + ?Sized>() -> TypeInfo {
        TypeInfo {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }
}

/// Nominal identifier of a requested resource, e.g. `WebDriver`
///
/// Providers are registered per resource type. The concrete Rust type produced for it
/// is only known once an [Instance] exists.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResourceType(&'static str);
impl ResourceType {
    pub const fn named(name: &'static str) -> Self {
        Self(name)
    }

    /// Uses the Rust type name as the resource name
    pub fn of<T: 'static + ?Sized>() -> Self {
        Self(std::any::type_name::<T>())
    }

    pub const fn name(&self) -> &'static str {
        self.0
    }
}
impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Tag distinguishing several resources of the same type within one scope
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Qualifier(&'static str);
impl Qualifier {
    pub const DEFAULT: Qualifier = Qualifier("default");

    pub const fn named(name: &'static str) -> Self {
        Self(name)
    }

    pub const fn name(&self) -> &'static str {
        self.0
    }

    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }
}
impl Default for Qualifier {
    fn default() -> Self {
        Self::DEFAULT
    }
}
impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Type erased value shared between the store, the providers and test code
#[derive(Clone)]
pub struct Instance {
    info: TypeInfo,
    instance: Arc<dyn Any + Send + Sync + 'static>,
}
impl Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Instance").field(&self.info.type_name).finish()
    }
}

impl Instance {
    pub fn new<T: Injectable>(instance: T) -> Self {
        Self::from_arc(Arc::new(instance))
    }

    pub fn from_arc<T: Injectable>(instance: Arc<T>) -> Self {
        Instance {
            info: TypeInfo::of::<T>(),
            instance,
        }
    }

    /// Runtime type of the wrapped value
    pub fn info(&self) -> TypeInfo {
        self.info
    }

    pub fn is<T: Injectable>(&self) -> bool {
        self.instance.is::<T>()
    }

    pub fn downcast<T: Injectable>(&self) -> Result<Arc<T>, DowncastError> {
        Arc::downcast::<T>(self.instance.clone()).map_err(|_| DowncastError {
            required_type: std::any::type_name::<T>(),
            actual_type: self.info.type_name,
        })
    }

    pub fn downcast_ref<T: Injectable>(&self) -> Option<&T> {
        self.instance.downcast_ref::<T>()
    }

    /// Downcasts, looking through any [Augmented] wrappers enhancers placed around the value
    pub fn view<T: Injectable>(&self) -> Result<Arc<T>, DowncastError> {
        let mut current = self;
        loop {
            if current.is::<T>() {
                return current.downcast();
            }
            match current.downcast_ref::<Augmented>() {
                Some(augmented) => current = augmented.raw(),
                None => return self.downcast(),
            }
        }
    }

    /// Object identity - two handles to the very same value
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }
}

/// Opaque configuration produced by a configurator and consumed by an instantiator
///
/// Configurations are never mutated once stored, re-configuring produces a new value.
#[derive(Clone, Debug)]
pub struct Configuration(Instance);
impl Configuration {
    pub fn new<T: Injectable>(configuration: T) -> Self {
        Self(Instance::new(configuration))
    }

    pub fn info(&self) -> TypeInfo {
        self.0.info()
    }

    pub fn downcast<T: Injectable>(&self) -> Result<Arc<T>, DowncastError> {
        self.0.downcast()
    }

    pub fn downcast_ref<T: Injectable>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    pub fn ptr_eq(&self, other: &Configuration) -> bool {
        self.0.ptr_eq(&other.0)
    }
}
