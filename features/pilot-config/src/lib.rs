//! Pilot Config feeds suite configuration into the lifecycle engine.
//!
//! All values come from a layered [figment::Figment]: a TOML file, overridden by
//! environment variables prefixed with `PILOT_`. Nested keys are separated by a double
//! underscore, `PILOT_WEBDRIVER__BROWSER=firefox` sets `browser` in `[webdriver]`.
//!
//! Pilot Config consists of the following components:
//!
//! 1. Provider - scope keyed raw properties, usable as the engine's descriptor source
//! 2. Settings - the `[lifecycle]` section, turned into engine settings
//! 3. Configurator - typed configuration deserialized from a section per qualifier
//! 4. Errors - for config errors
//!
//! # Examples
//!
//! ```rust
//! use pilot_config::{provider::PropertyProvider, settings::SuiteSettings};
//!
//! let figment = pilot_config::layered("pilot.toml");
//! let settings = SuiteSettings::from_figment(&figment).unwrap_or_default();
//! let properties = PropertyProvider::from_figment(&figment).unwrap_or_default();
//!
//! assert_eq!(settings.instantiation_timeout_secs, 60);
//! assert!(properties.get("lifecycle", "debug").is_none());
//! ```

use std::path::Path;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};

pub mod configurator;
pub mod errors;
pub mod provider;
pub mod settings;

/// Prefix of environment variables overriding file values
pub const ENV_PREFIX: &str = "PILOT_";

/// Configuration file used when none is given
pub const DEFAULT_FILE: &str = "pilot.toml";

/// The TOML file merged with prefixed environment variables, the environment wins
///
/// A missing file is not an error, only the environment is used then.
pub fn layered(path: impl AsRef<Path>) -> Figment {
    let path = path.as_ref();
    if !path.exists() {
        tracing::debug!("No configuration file at {}", path.display());
    }
    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}
