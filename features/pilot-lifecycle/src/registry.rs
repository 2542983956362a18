use std::{cmp::Reverse, collections::HashMap, fmt, sync::Arc};

use crate::{
    enhancer::{Enhancer, EnhancerChain},
    errors::ProviderNotFound,
    providers::{
        Configurator, Destructor, DynConfigurator, DynDestructor, DynInstantiator, Instantiator,
    },
    types::ResourceType,
};

/// The four provider roles a resource type can have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CapabilityKind {
    Configure,
    Instantiate,
    Destroy,
    Enhance,
}
impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::Configure => f.write_str("configurator"),
            CapabilityKind::Instantiate => f.write_str("instantiator"),
            CapabilityKind::Destroy => f.write_str("destructor"),
            CapabilityKind::Enhance => f.write_str("enhancer"),
        }
    }
}

/// A registered provider of any kind
#[derive(Clone)]
pub enum Provider {
    Configurator(Arc<dyn DynConfigurator>),
    Instantiator(Arc<dyn DynInstantiator>),
    Destructor(Arc<dyn DynDestructor>),
    Enhancer(Arc<dyn Enhancer>),
}
impl Provider {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Provider::Configurator(_) => CapabilityKind::Configure,
            Provider::Instantiator(_) => CapabilityKind::Instantiate,
            Provider::Destructor(_) => CapabilityKind::Destroy,
            Provider::Enhancer(_) => CapabilityKind::Enhance,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Configurator(provider) => provider.name(),
            Provider::Instantiator(provider) => provider.name(),
            Provider::Destructor(provider) => provider.name(),
            Provider::Enhancer(provider) => provider.name(),
        }
    }
}
impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.name())
    }
}

#[derive(Clone, Debug)]
struct Candidate {
    precedence: i32,
    provider: Provider,
}

type Candidates = HashMap<(ResourceType, CapabilityKind), Vec<Candidate>>;

/// Collects provider registrations during bootstrap
///
/// ```
/// use pilot_lifecycle::{AugmentingEnhancer, RegistryBuilder, ResourceType};
///
/// let registry = RegistryBuilder::new()
///     .add_enhancer(ResourceType::named("WebDriver"), AugmentingEnhancer::new(["screenshots"]))
///     .build();
///
/// assert_eq!(registry.enhancers(ResourceType::named("WebDriver")).len(), 1);
/// ```
#[derive(Default)]
pub struct RegistryBuilder {
    candidates: Candidates,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a candidate for its kind. Registering never fails.
    pub fn register(mut self, resource_type: ResourceType, precedence: i32, provider: Provider) -> Self {
        tracing::debug!(
            "Registering {:?} for {} with precedence {}",
            provider,
            resource_type,
            precedence
        );
        self.candidates
            .entry((resource_type, provider.kind()))
            .or_default()
            .push(Candidate {
                precedence,
                provider,
            });
        self
    }

    pub fn add_configurator<C: Configurator + 'static>(
        self,
        resource_type: ResourceType,
        configurator: C,
    ) -> Self {
        let precedence = Configurator::precedence(&configurator);
        self.register(
            resource_type,
            precedence,
            Provider::Configurator(Arc::new(configurator)),
        )
    }

    pub fn add_instantiator<I: Instantiator + 'static>(
        self,
        resource_type: ResourceType,
        instantiator: I,
    ) -> Self {
        let precedence = Instantiator::precedence(&instantiator);
        self.register(
            resource_type,
            precedence,
            Provider::Instantiator(Arc::new(instantiator)),
        )
    }

    pub fn add_destructor<D: Destructor + 'static>(
        self,
        resource_type: ResourceType,
        destructor: D,
    ) -> Self {
        let precedence = Destructor::precedence(&destructor);
        self.register(
            resource_type,
            precedence,
            Provider::Destructor(Arc::new(destructor)),
        )
    }

    pub fn add_enhancer<E: Enhancer + 'static>(self, resource_type: ResourceType, enhancer: E) -> Self {
        let precedence = enhancer.precedence();
        self.register(resource_type, precedence, Provider::Enhancer(Arc::new(enhancer)))
    }

    /// Freezes the registrations
    ///
    /// Candidates are ordered by precedence, highest first. The sort is stable, so among
    /// equal precedences the first registered stays in front.
    pub fn build(mut self) -> CapabilityRegistry {
        for candidates in self.candidates.values_mut() {
            candidates.sort_by_key(|candidate| Reverse(candidate.precedence));
        }
        CapabilityRegistry {
            candidates: self.candidates,
        }
    }
}

/// Read only provider lookup, shared by every scope after bootstrap
pub struct CapabilityRegistry {
    candidates: Candidates,
}

impl CapabilityRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Active provider of a kind for a resource type
    pub fn resolve(
        &self,
        resource_type: ResourceType,
        kind: CapabilityKind,
    ) -> Result<&Provider, ProviderNotFound> {
        let winner = self
            .candidates
            .get(&(resource_type, kind))
            .and_then(|candidates| candidates.first());

        match winner {
            Some(candidate) => {
                tracing::debug!(
                    "Resolved {:?} for {} with precedence {}",
                    candidate.provider,
                    resource_type,
                    candidate.precedence
                );
                Ok(&candidate.provider)
            }
            None => Err(ProviderNotFound {
                resource_type,
                kind,
                registered: self.registered(kind),
            }),
        }
    }

    pub fn configurator(
        &self,
        resource_type: ResourceType,
    ) -> Result<Arc<dyn DynConfigurator>, ProviderNotFound> {
        match self.resolve(resource_type, CapabilityKind::Configure)? {
            Provider::Configurator(provider) => Ok(provider.clone()),
            _ => Err(self.not_found(resource_type, CapabilityKind::Configure)),
        }
    }

    pub fn instantiator(
        &self,
        resource_type: ResourceType,
    ) -> Result<Arc<dyn DynInstantiator>, ProviderNotFound> {
        match self.resolve(resource_type, CapabilityKind::Instantiate)? {
            Provider::Instantiator(provider) => Ok(provider.clone()),
            _ => Err(self.not_found(resource_type, CapabilityKind::Instantiate)),
        }
    }

    pub fn destructor(
        &self,
        resource_type: ResourceType,
    ) -> Result<Arc<dyn DynDestructor>, ProviderNotFound> {
        match self.resolve(resource_type, CapabilityKind::Destroy)? {
            Provider::Destructor(provider) => Ok(provider.clone()),
            _ => Err(self.not_found(resource_type, CapabilityKind::Destroy)),
        }
    }

    /// Every enhancer of the resource type, possibly none
    pub fn enhancers(&self, resource_type: ResourceType) -> EnhancerChain {
        let enhancers = self
            .candidates
            .get(&(resource_type, CapabilityKind::Enhance))
            .into_iter()
            .flatten()
            .filter_map(|candidate| match &candidate.provider {
                Provider::Enhancer(enhancer) => Some(enhancer.clone()),
                _ => None,
            })
            .collect();
        EnhancerChain::new(enhancers)
    }

    /// Resource types with at least one provider of `kind`, sorted by name
    pub fn registered(&self, kind: CapabilityKind) -> Vec<ResourceType> {
        let mut types: Vec<_> = self
            .candidates
            .iter()
            .filter(|((_, candidate_kind), candidates)| {
                *candidate_kind == kind && !candidates.is_empty()
            })
            .map(|((resource_type, _), _)| *resource_type)
            .collect();
        types.sort();
        types
    }

    fn not_found(&self, resource_type: ResourceType, kind: CapabilityKind) -> ProviderNotFound {
        ProviderNotFound {
            resource_type,
            kind,
            registered: self.registered(kind),
        }
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.candidates.iter().collect();
        keys.sort_by_key(|(key, _)| **key);

        let mut map = f.debug_map();
        for ((resource_type, kind), candidates) in keys {
            map.entry(&format!("{resource_type}/{kind}"), candidates);
        }
        map.finish()
    }
}
