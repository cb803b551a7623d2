//! Utility modules for configuration, cancellation and error handling.

pub mod cancel;
pub mod config;
pub mod error;

// Re-export commonly used error types for convenience
pub use cancel::CancellationToken;
pub use error::{ConfigError, OutputError, SourceError};
