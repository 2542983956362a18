use std::time::Duration;

use figment::Figment;
use pilot_lifecycle::{DescriptorSource, LifecycleSettings};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// The `[lifecycle]` section of the suite configuration
///
/// ```toml
/// [lifecycle]
/// instantiation_timeout_secs = 60
/// debug = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteSettings {
    /// `0` waits forever
    pub instantiation_timeout_secs: u64,
    /// Waits forever as well, so a debugger can sit on a breakpoint inside an instantiator
    pub debug: bool,
    pub worker_name: Option<String>,
}

impl Default for SuiteSettings {
    fn default() -> Self {
        Self {
            instantiation_timeout_secs: 60,
            debug: false,
            worker_name: None,
        }
    }
}

impl SuiteSettings {
    pub const SECTION: &'static str = "lifecycle";

    /// Reads the section, a missing section gives the defaults
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        if !figment.contains(Self::SECTION) {
            tracing::debug!("No [{}] section, using default settings", Self::SECTION);
            return Ok(Self::default());
        }
        Ok(figment.extract_inner(Self::SECTION)?)
    }

    /// Reads the section from raw properties
    pub fn from_descriptor(descriptor: &dyn DescriptorSource) -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        if let Some(value) = descriptor.lookup(Self::SECTION, "instantiation_timeout_secs") {
            settings.instantiation_timeout_secs = parse(&value, "instantiation_timeout_secs")?;
        }
        if let Some(value) = descriptor.lookup(Self::SECTION, "debug") {
            settings.debug = parse(&value, "debug")?;
        }
        settings.worker_name = descriptor.lookup(Self::SECTION, "worker_name");
        Ok(settings)
    }

    pub fn instantiation_timeout(&self) -> Option<Duration> {
        match self.debug || self.instantiation_timeout_secs == 0 {
            true => None,
            false => Some(Duration::from_secs(self.instantiation_timeout_secs)),
        }
    }

    pub fn into_lifecycle_settings(self) -> LifecycleSettings {
        let mut settings = match self.instantiation_timeout() {
            Some(timeout) => LifecycleSettings::new().with_timeout(timeout),
            None => LifecycleSettings::new().unbounded(),
        };
        if let Some(worker_name) = self.worker_name {
            settings = settings.with_worker_name(worker_name);
        }
        settings
    }
}

impl From<SuiteSettings> for LifecycleSettings {
    fn from(settings: SuiteSettings) -> Self {
        settings.into_lifecycle_settings()
    }
}

fn parse<T: std::str::FromStr>(value: &str, property: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|error: T::Err| ConfigError::InvalidValue {
        scope: SuiteSettings::SECTION.to_string(),
        property: property.to_string(),
        value: value.to_string(),
        reason: error.to_string(),
    })
}
