use std::{collections::BTreeSet, fmt};

use crate::types::{Qualifier, ResourceType};

/// Lifetime boundary of an injection point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    /// Recreated for every test method
    Method,
    /// Lives for the whole test class
    Class,
    /// Lives while the named deployment is deployed
    Deployment,
}
impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Method => f.write_str("method"),
            Scope::Class => f.write_str("class"),
            Scope::Deployment => f.write_str("deployment"),
        }
    }
}

/// Key of a point inside one scoped store
///
/// Annotation tags are not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointKey {
    pub resource_type: ResourceType,
    pub qualifier: Qualifier,
    pub scope: Scope,
    pub deployment_name: Option<String>,
}
impl fmt::Display for PointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @{} ({}", self.resource_type, self.qualifier, self.scope)?;
        if let Some(deployment) = &self.deployment_name {
            write!(f, " of {deployment}")?;
        }
        f.write_str(")")
    }
}

/// Describes a requested resource
///
/// The host runner builds these from the fields and parameters it wants populated.
/// Within one store, `(resource_type, qualifier, scope, deployment_name)` identifies at
/// most one live resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InjectionPoint {
    resource_type: ResourceType,
    qualifier: Qualifier,
    scope: Scope,
    deployment_name: Option<String>,
    tags: BTreeSet<&'static str>,
}

impl InjectionPoint {
    pub fn new(resource_type: ResourceType, scope: Scope) -> Self {
        Self {
            resource_type,
            qualifier: Qualifier::DEFAULT,
            scope,
            deployment_name: None,
            tags: BTreeSet::new(),
        }
    }

    pub fn class(resource_type: ResourceType) -> Self {
        Self::new(resource_type, Scope::Class)
    }

    pub fn method(resource_type: ResourceType) -> Self {
        Self::new(resource_type, Scope::Method)
    }

    pub fn deployment(resource_type: ResourceType, deployment_name: impl Into<String>) -> Self {
        Self::new(resource_type, Scope::Deployment).with_deployment(deployment_name)
    }

    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifier = qualifier;
        self
    }

    pub fn with_deployment(mut self, deployment_name: impl Into<String>) -> Self {
        self.deployment_name = Some(deployment_name.into());
        self
    }

    /// Marks an annotation present on the injection site
    pub fn with_tag(mut self, tag: &'static str) -> Self {
        self.tags.insert(tag);
        self
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn qualifier(&self) -> Qualifier {
        self.qualifier
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn deployment_name(&self) -> Option<&str> {
        self.deployment_name.as_deref()
    }

    pub fn tags(&self) -> &BTreeSet<&'static str> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn key(&self) -> PointKey {
        PointKey {
            resource_type: self.resource_type,
            qualifier: self.qualifier,
            scope: self.scope,
            deployment_name: self.deployment_name.clone(),
        }
    }
}
impl fmt::Display for InjectionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.key(), f)
    }
}
