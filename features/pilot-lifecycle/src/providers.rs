use crate::{
    descriptor::DescriptorSource,
    lazy::Cancellation,
    point::InjectionPoint,
    types::{Configuration, DynError, Injectable, Instance, TypeInfo},
};

/// Produces the configuration of a resource type
pub trait Configurator: Send + Sync {
    type Configuration: Injectable;

    /// Highest precedence wins when several configurators compete for one resource type
    fn precedence(&self) -> i32 {
        0
    }

    /// Creates a fresh configuration for the given point
    fn create_configuration(
        &self,
        descriptor: &dyn DescriptorSource,
        point: &InjectionPoint,
    ) -> Result<Self::Configuration, impl Into<DynError>>;
}

/// Creates a resource instance from its configuration
pub trait Instantiator: Send + Sync {
    type Configuration: Injectable;
    type Provides: Injectable;

    fn precedence(&self) -> i32 {
        0
    }

    /// Returns the typeinfo about the instantiator's provided type
    fn supplies() -> TypeInfo {
        TypeInfo::of::<Self::Provides>()
    }

    /// Creates the instance
    ///
    /// Runs on an instantiation worker when a timeout is configured. Long running
    /// instantiators should check `cancellation` and give up once it is set, their
    /// result would be discarded anyway.
    fn create_instance(
        &self,
        configuration: &Self::Configuration,
        cancellation: &Cancellation,
    ) -> Result<Self::Provides, impl Into<DynError>>;
}

/// Releases a raw resource instance
pub trait Destructor: Send + Sync {
    type Destroys: Injectable;

    fn precedence(&self) -> i32 {
        0
    }

    fn destroy_instance(
        &self,
        instance: std::sync::Arc<Self::Destroys>,
    ) -> Result<(), impl Into<DynError>>;
}

/// Wrapper Trait for configurators, producing [Configuration]s of any type
pub trait DynConfigurator: Send + Sync {
    fn name(&self) -> &'static str;
    fn precedence(&self) -> i32;
    fn create_configuration(
        &self,
        descriptor: &dyn DescriptorSource,
        point: &InjectionPoint,
    ) -> Result<Configuration, DynError>;
}
// Impl DynConfigurator for any Configurator
impl<SpecificConfigurator: Configurator> DynConfigurator for SpecificConfigurator {
    fn name(&self) -> &'static str {
        std::any::type_name::<SpecificConfigurator>()
    }

    fn precedence(&self) -> i32 {
        Configurator::precedence(self)
    }

    fn create_configuration(
        &self,
        descriptor: &dyn DescriptorSource,
        point: &InjectionPoint,
    ) -> Result<Configuration, DynError> {
        // Forward the call to the specific implementation
        Configurator::create_configuration(self, descriptor, point)
            .map(Configuration::new)
            .map_err(Into::into)
    }
}

/// Wrapper Trait for instantiators, providing [Instance]s of any type
pub trait DynInstantiator: Send + Sync {
    fn name(&self) -> &'static str;
    fn precedence(&self) -> i32;
    fn supplies(&self) -> TypeInfo;
    fn create_instance(
        &self,
        configuration: &Configuration,
        cancellation: &Cancellation,
    ) -> Result<Instance, DynError>;
}
// Impl DynInstantiator for any Instantiator
impl<SpecificInstantiator: Instantiator> DynInstantiator for SpecificInstantiator {
    fn name(&self) -> &'static str {
        std::any::type_name::<SpecificInstantiator>()
    }

    fn precedence(&self) -> i32 {
        Instantiator::precedence(self)
    }

    fn supplies(&self) -> TypeInfo {
        <SpecificInstantiator as Instantiator>::supplies()
    }

    fn create_instance(
        &self,
        configuration: &Configuration,
        cancellation: &Cancellation,
    ) -> Result<Instance, DynError> {
        let configuration = configuration.downcast::<SpecificInstantiator::Configuration>()?;

        Instantiator::create_instance(self, &configuration, cancellation)
            .map(Instance::new)
            .map_err(Into::into)
    }
}

/// Wrapper Trait for destructors, accepting [Instance]s of any type
pub trait DynDestructor: Send + Sync {
    fn name(&self) -> &'static str;
    fn precedence(&self) -> i32;
    fn destroy_instance(&self, instance: &Instance) -> Result<(), DynError>;
}
// Impl DynDestructor for any Destructor
impl<SpecificDestructor: Destructor> DynDestructor for SpecificDestructor {
    fn name(&self) -> &'static str {
        std::any::type_name::<SpecificDestructor>()
    }

    fn precedence(&self) -> i32 {
        Destructor::precedence(self)
    }

    fn destroy_instance(&self, instance: &Instance) -> Result<(), DynError> {
        let instance = instance.downcast::<SpecificDestructor::Destroys>()?;

        Destructor::destroy_instance(self, instance).map_err(Into::into)
    }
}
