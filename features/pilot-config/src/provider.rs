use std::collections::BTreeMap;

use figment::Figment;
use pilot_lifecycle::DescriptorSource;
use serde::Deserialize;

use crate::errors::ConfigError;

/// A registry of raw properties, keyed by scope and property name
///
/// Configurators read it through [DescriptorSource]. Scopes are usually resource type
/// names, optionally suffixed by a qualifier, e.g. `webdriver-secondary`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyProvider {
    properties: BTreeMap<String, BTreeMap<String, String>>,
}

/// Top level entries of a figment, only tables become scopes
#[derive(Deserialize)]
#[serde(untagged)]
enum Section {
    Table(BTreeMap<String, PropertyValue>),
    Other(serde::de::IgnoredAny),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PropertyValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Other(serde::de::IgnoredAny),
}
impl PropertyValue {
    fn render(self) -> Option<String> {
        match self {
            PropertyValue::Bool(value) => Some(value.to_string()),
            PropertyValue::Integer(value) => Some(value.to_string()),
            PropertyValue::Float(value) => Some(value.to_string()),
            PropertyValue::Text(value) => Some(value),
            PropertyValue::Other(_) => None,
        }
    }
}

impl PropertyProvider {
    /// Initializes an empty Property Provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every table of the figment as a scope
    ///
    /// Scalar values of a table become properties. Nested tables and arrays are skipped,
    /// so are top level values outside of any table.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let sections: BTreeMap<String, Section> = figment.extract()?;

        let mut provider = Self::new();
        for (scope, section) in sections {
            let Section::Table(table) = section else {
                tracing::debug!("Skipping top level value '{scope}', it is not a table");
                continue;
            };
            for (property, value) in table {
                match value.render() {
                    Some(value) => {
                        provider.add_property(&scope, &property, value)?;
                    }
                    None => tracing::debug!("Skipping '{scope}.{property}', it is not a scalar"),
                }
            }
        }
        Ok(provider)
    }

    /// Loads the file at `path`, overridden by `PILOT_` environment variables
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        Self::from_figment(&crate::layered(path))
    }

    /// Retrieve a property of a scope
    pub fn get(&self, scope: &str, property: &str) -> Option<&str> {
        self.properties.get(scope)?.get(property).map(String::as_str)
    }

    /// All properties of a scope
    pub fn scope(&self, scope: &str) -> Option<&BTreeMap<String, String>> {
        self.properties.get(scope)
    }

    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Add a property to the registry.
    ///
    /// If the property is already set for the scope, it will return a
    /// [`ConfigError::AlreadyRegistered`] error
    pub fn add_property(
        &mut self,
        scope: &str,
        property: &str,
        value: impl Into<String>,
    ) -> Result<&mut Self, ConfigError> {
        let properties = self.properties.entry(scope.to_string()).or_default();
        if properties.contains_key(property) {
            return Err(ConfigError::AlreadyRegistered {
                scope: scope.to_string(),
                property: property.to_string(),
            });
        }

        properties.insert(property.to_string(), value.into());
        Ok(self)
    }

    /// Can optionally add a property to the registry.
    ///
    /// If the value provided is `Some(T)`, it will be the same as calling [`PropertyProvider::add_property`]
    /// If the value provided is `None`, then the function just returns `Ok(self)` for chaining
    pub fn maybe_add_property(
        &mut self,
        scope: &str,
        property: &str,
        value: Option<impl Into<String>>,
    ) -> Result<&mut Self, ConfigError> {
        match value {
            Some(value) => self.add_property(scope, property, value),
            None => Ok(self),
        }
    }
}

impl DescriptorSource for PropertyProvider {
    fn lookup(&self, scope_key: &str, property: &str) -> Option<String> {
        self.get(scope_key, property).map(str::to_string)
    }
}
