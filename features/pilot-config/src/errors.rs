/// Errors while loading or reading suite configuration
#[derive(thiserror::Error, Debug, Clone)]
pub enum ConfigError {
    /// The property was already set for the scope
    #[error("Property '{property}' is already registered for '{scope}'")]
    AlreadyRegistered { scope: String, property: String },
    /// A source could not be read or deserialized
    #[error("Reading configuration failed: {0}")]
    Figment(#[from] Box<figment::Error>),
    #[error("Property '{property}' of '{scope}' has an invalid value '{value}': {reason}")]
    InvalidValue {
        scope: String,
        property: String,
        value: String,
        reason: String,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        ConfigError::Figment(Box::new(error))
    }
}
