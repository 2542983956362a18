use std::{collections::BTreeSet, sync::Arc};

use crate::{
    point::InjectionPoint,
    types::{DynError, Injectable, Instance, ResourceType},
};

/// Reversible augmentation step applied to a raw instance after creation
///
/// `deenhance` has to undo exactly what `enhance` did: feeding the output of `enhance`
/// back must return the very same object that went in.
pub trait Enhancer: Send + Sync {
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn precedence(&self) -> i32 {
        0
    }

    /// Evaluated against the actual instance, not only the declared resource type
    fn can_apply(&self, instance: &Instance, resource_type: ResourceType) -> bool;

    fn enhance(&self, instance: Instance, point: &InjectionPoint) -> Result<Instance, DynError>;

    fn deenhance(&self, instance: Instance, point: &InjectionPoint) -> Result<Instance, DynError>;
}

/// Raw instance plus the capabilities augmented onto it
#[derive(Debug, Clone)]
pub struct Augmented {
    raw: Instance,
    capabilities: BTreeSet<&'static str>,
}
impl Augmented {
    pub fn new(raw: Instance, capabilities: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            raw,
            capabilities: capabilities.into_iter().collect(),
        }
    }

    pub fn raw(&self) -> &Instance {
        &self.raw
    }

    pub fn capabilities(&self) -> &BTreeSet<&'static str> {
        &self.capabilities
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

type Applicability = Arc<dyn Fn(&Instance, ResourceType) -> bool + Send + Sync>;

/// Wraps instances into an [Augmented] carrying a fixed capability set
pub struct AugmentingEnhancer {
    capabilities: BTreeSet<&'static str>,
    applies: Applicability,
    precedence: i32,
}
impl AugmentingEnhancer {
    /// Applies to every instance
    pub fn new(capabilities: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            capabilities: capabilities.into_iter().collect(),
            applies: Arc::new(|_, _| true),
            precedence: 0,
        }
    }

    /// Applies only to instances whose runtime type is `T`
    pub fn for_concrete<T: Injectable>(capabilities: impl IntoIterator<Item = &'static str>) -> Self {
        Self::new(capabilities).applies_when(|instance, _| instance.is::<T>())
    }

    pub fn applies_when(
        mut self,
        applies: impl Fn(&Instance, ResourceType) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.applies = Arc::new(applies);
        self
    }

    pub fn with_precedence(mut self, precedence: i32) -> Self {
        self.precedence = precedence;
        self
    }
}
impl Enhancer for AugmentingEnhancer {
    fn precedence(&self) -> i32 {
        self.precedence
    }

    fn can_apply(&self, instance: &Instance, resource_type: ResourceType) -> bool {
        (self.applies)(instance, resource_type)
    }

    fn enhance(&self, instance: Instance, _point: &InjectionPoint) -> Result<Instance, DynError> {
        Ok(Instance::new(Augmented::new(
            instance,
            self.capabilities.iter().copied(),
        )))
    }

    fn deenhance(&self, instance: Instance, _point: &InjectionPoint) -> Result<Instance, DynError> {
        // Anything we did not wrap passes through untouched
        match instance.downcast_ref::<Augmented>() {
            Some(augmented) => Ok(augmented.raw().clone()),
            None => Ok(instance),
        }
    }
}

/// One applied enhancement
#[derive(Debug, Clone)]
pub struct EnhancementStep {
    pub enhancer: &'static str,
    pub input: Instance,
    pub output: Instance,
}

/// Ordered log of applied enhancements, used to de-enhance in exact reverse order
#[derive(Clone, Default)]
pub struct EnhancementRecord {
    steps: Vec<(Arc<dyn Enhancer>, EnhancementStep)>,
}
impl std::fmt::Debug for EnhancementRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|(_, step)| step.enhancer))
            .finish()
    }
}

/// A de-enhance step that raised while unwinding
#[derive(Debug)]
pub struct UnwindFailure {
    pub enhancer: &'static str,
    pub error: DynError,
}

impl EnhancementRecord {
    pub fn steps(&self) -> impl Iterator<Item = &EnhancementStep> {
        self.steps.iter().map(|(_, step)| step)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Undoes every step, last applied first
    ///
    /// A failing step is skipped by continuing from the instance it received, so the raw
    /// instance is still recovered. Failures are returned alongside it.
    pub fn unwind(
        &self,
        enhanced: Instance,
        point: &InjectionPoint,
    ) -> (Instance, Vec<UnwindFailure>) {
        let mut current = enhanced;
        let mut failures = Vec::new();

        for (enhancer, step) in self.steps.iter().rev() {
            tracing::debug!("De-enhancing {} with {}", point, step.enhancer);
            current = match enhancer.deenhance(current, point) {
                Ok(instance) => instance,
                Err(error) => {
                    failures.push(UnwindFailure {
                        enhancer: step.enhancer,
                        error,
                    });
                    step.input.clone()
                }
            };
        }

        (current, failures)
    }
}

/// Result of running the chain on a raw instance
#[derive(Debug, Clone)]
pub struct EnhancedInstance {
    pub instance: Instance,
    pub record: EnhancementRecord,
}

/// An enhancer raised, `partial` holds the steps applied before it
#[derive(Debug)]
pub struct EnhanceFailure {
    pub enhancer: &'static str,
    pub error: DynError,
    pub partial: EnhancedInstance,
}

/// Enhancers of one resource type, highest precedence first
#[derive(Clone, Default)]
pub struct EnhancerChain {
    enhancers: Vec<Arc<dyn Enhancer>>,
}
impl std::fmt::Debug for EnhancerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.enhancers.iter().map(|enhancer| enhancer.name()))
            .finish()
    }
}

impl EnhancerChain {
    pub(crate) fn new(enhancers: Vec<Arc<dyn Enhancer>>) -> Self {
        Self { enhancers }
    }

    pub fn len(&self) -> usize {
        self.enhancers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enhancers.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.enhancers.iter().map(|enhancer| enhancer.name()).collect()
    }

    /// Folds the raw instance through every applicable enhancer
    ///
    /// Applicability is checked against the instance as it is at that step.
    pub fn apply(
        &self,
        raw: Instance,
        point: &InjectionPoint,
    ) -> Result<EnhancedInstance, Box<EnhanceFailure>> {
        let mut current = raw;
        let mut record = EnhancementRecord::default();

        for enhancer in &self.enhancers {
            if !enhancer.can_apply(&current, point.resource_type()) {
                tracing::debug!("{} does not apply to {}", enhancer.name(), point);
                continue;
            }

            tracing::debug!("Enhancing {} with {}", point, enhancer.name());
            match enhancer.enhance(current.clone(), point) {
                Ok(output) => {
                    record.steps.push((
                        enhancer.clone(),
                        EnhancementStep {
                            enhancer: enhancer.name(),
                            input: current,
                            output: output.clone(),
                        },
                    ));
                    current = output;
                }
                Err(error) => {
                    return Err(Box::new(EnhanceFailure {
                        enhancer: enhancer.name(),
                        error,
                        partial: EnhancedInstance {
                            instance: current,
                            record,
                        },
                    }))
                }
            }
        }

        Ok(EnhancedInstance {
            instance: current,
            record,
        })
    }
}
