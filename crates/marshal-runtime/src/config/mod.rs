//! Configuration for a Marshal host.
//!
//! Settings are layered by [`ConfigLoader`] from defaults, configuration
//! files, `MARSHAL_*` environment variables and programmatic overrides, then
//! checked by [`validate_config`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    EngineConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, MarshalConfig,
    SpanEventConfig,
};
pub use validation::validate_config;
