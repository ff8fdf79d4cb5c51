//! Ragtrail Common Library
//!
//! Shared code for the Ragtrail context service including:
//! - Transcript model
//! - Evidence accumulation, grouping and digest rendering
//! - Retrieval gateway, backends and agent tools
//! - Session scopes
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod errors;
pub mod evidence;
pub mod metrics;
pub mod retrieval;
pub mod session;
pub mod transcript;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use evidence::{Digest, DigestBuilder, DigestOptions};
pub use retrieval::{RetrievalBackend, RetrievalGateway, Scope, ToolRunner};
pub use session::{SessionRegistry, SessionScope};
pub use transcript::{Message, ToolCall};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
