use std::{collections::BTreeMap, sync::Arc};

/// Raw key-value configuration handed to configurators
///
/// Precedence between override sources (file, environment, ...) is up to the implementation.
pub trait DescriptorSource: Send + Sync {
    fn lookup(&self, scope_key: &str, property: &str) -> Option<String>;
}

/// A descriptor without any properties
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyDescriptor;
impl DescriptorSource for EmptyDescriptor {
    fn lookup(&self, _scope_key: &str, _property: &str) -> Option<String> {
        None
    }
}

/// Scope key -> property -> value
impl DescriptorSource for BTreeMap<String, BTreeMap<String, String>> {
    fn lookup(&self, scope_key: &str, property: &str) -> Option<String> {
        self.get(scope_key)?.get(property).cloned()
    }
}

impl<D: DescriptorSource + ?Sized> DescriptorSource for Arc<D> {
    fn lookup(&self, scope_key: &str, property: &str) -> Option<String> {
        (**self).lookup(scope_key, property)
    }
}
