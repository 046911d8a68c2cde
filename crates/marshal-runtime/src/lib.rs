//! Marshal Runtime - hosting layer for the Marshal command dispatcher.
//!
//! This crate provides:
//! - Layered configuration (`ConfigLoader`, `MarshalConfig`)
//! - Logging setup (`LoggingBuilder`)
//! - A shell-like line tokenizer
//! - [`CommandHost`]: a configured `CommandManager` with blocking and
//!   fire-and-forget entry points and a line-serving loop
//!
//! ```ignore
//! use marshal_runtime::CommandHost;
//!
//! #[tokio::main]
//! async fn main() -> marshal_runtime::RuntimeResult<()> {
//!     let host = CommandHost::builder().build()?;
//!     host.manager().add_command(CommandBuilder::new(["ping"]).handler_sync(|| "pong"))?;
//!     let result = host.run_line(ExecutionContext::default(), "ping").await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod tokenize;

pub use config::{ConfigError, ConfigLoader, ConfigResult, EngineConfig, LoggingConfig, MarshalConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use host::{CommandHost, HostBuilder, ServeStats, shutdown_signal};
pub use logging::{LoggingBuilder, SpanEvents};
pub use tokenize::{TokenizeError, tokenize};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
