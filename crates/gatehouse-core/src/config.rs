/// Trait for loading service configuration from environment variables.
///
/// Implementors derive `serde::Deserialize` (field names map to uppercased
/// env var names) and call `Config::from_env()` once at startup.
///
/// # Panics
///
/// Panics if a required env var is missing or cannot be deserialized.
/// Startup is the only place this runs; a service with broken configuration
/// should not come up at all.
pub trait Config: Sized + serde::de::DeserializeOwned {
    fn from_env() -> Self {
        envy::from_env().expect("failed to load config from environment")
    }
}
