use std::{marker::PhantomData, sync::Arc};

use figment::{
    providers::Serialized,
    value::{Dict, Value},
    Figment,
};
use pilot_lifecycle::{Configurator, DescriptorSource, Injectable, InjectionPoint};
use serde::de::DeserializeOwned;

use crate::errors::ConfigError;

/// Deserializes a typed configuration from a figment section
///
/// For a point with qualifier `secondary` the section `{section}-secondary` is used if
/// it exists, otherwise `{section}`. Without either section the default is used.
///
/// Properties the descriptor holds for the chosen section override the figment's values.
/// Only keys already present in the section are looked up.
pub struct SectionConfigurator<C> {
    figment: Arc<Figment>,
    section: String,
    precedence: i32,
    _configuration: PhantomData<fn() -> C>,
}

impl<C> SectionConfigurator<C> {
    pub fn new(figment: Arc<Figment>, section: impl Into<String>) -> Self {
        Self {
            figment,
            section: section.into(),
            precedence: 0,
            _configuration: PhantomData,
        }
    }

    pub fn with_precedence(mut self, precedence: i32) -> Self {
        self.precedence = precedence;
        self
    }

    /// Section holding the configuration of the point, if any
    pub fn section_for(&self, point: &InjectionPoint) -> Option<String> {
        let qualifier = point.qualifier();
        if !qualifier.is_default() {
            let qualified = format!("{}-{}", self.section, qualifier);
            if self.figment.contains(&qualified) {
                return Some(qualified);
            }
        }
        self.figment
            .contains(&self.section)
            .then(|| self.section.clone())
    }
}

impl<C: DeserializeOwned + Default + Injectable> Configurator for SectionConfigurator<C> {
    type Configuration = C;

    fn precedence(&self) -> i32 {
        self.precedence
    }

    fn create_configuration(
        &self,
        descriptor: &dyn DescriptorSource,
        point: &InjectionPoint,
    ) -> Result<C, ConfigError> {
        match self.section_for(point) {
            Some(section) => {
                tracing::debug!("Configuring {point} from [{section}]");
                let values = self.figment.focus(&section);
                let overrides = overrides(descriptor, &section, values.extract()?);
                Ok(values.merge(Serialized::defaults(overrides)).extract()?)
            }
            None => {
                tracing::debug!("No [{}] section for {point}, using defaults", self.section);
                Ok(C::default())
            }
        }
    }
}

/// Descriptor values for the keys of a section, typed after the value they replace
fn overrides(descriptor: &dyn DescriptorSource, section: &str, current: Dict) -> Dict {
    current
        .into_iter()
        .filter_map(|(key, value)| {
            let raw = descriptor.lookup(section, &key)?;
            let value = match value.as_str() {
                Some(_) => Value::from(raw),
                None => match raw.parse::<Value>() {
                    Ok(parsed) => parsed,
                    Err(never) => match never {},
                },
            };
            Some((key, value))
        })
        .collect()
}
