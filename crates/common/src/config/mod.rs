//! Configuration management for Ragtrail services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Retrieval backend configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Evidence digest configuration
    #[serde(default)]
    pub evidence: EvidenceConfig,

    /// Session scope configuration
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum concurrent requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Retrieval provider: ragflow, memory
    #[serde(default = "default_retrieval_provider")]
    pub provider: String,

    /// API key for the retrieval backend
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_retrieval_base_url")]
    pub base_url: String,

    /// Maximum chunks returned by one search
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Chunks listed per document when probing
    #[serde(default = "default_probe_page_size")]
    pub probe_page_size: usize,

    /// Documents listed per dataset
    #[serde(default = "default_document_page_size")]
    pub document_page_size: usize,

    /// Minimum similarity passed to the backend
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Ask the backend for table-of-contents enhanced retrieval
    #[serde(default)]
    pub toc_enhance: bool,

    /// Request timeout in seconds
    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures
    #[serde(default = "default_retrieval_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvidenceConfig {
    /// Facet content longer than this is truncated in the digest
    #[serde(default = "default_max_snippet_chars")]
    pub max_snippet_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Maximum live session scopes held by the registry
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Idle time after which a session scope is evicted
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 60 }
fn default_max_concurrent() -> usize { 100 }
fn default_retrieval_provider() -> String { "ragflow".to_string() }
fn default_retrieval_base_url() -> String { "http://localhost:9380".to_string() }
fn default_page_size() -> usize { 10 }
fn default_probe_page_size() -> usize { 200 }
fn default_document_page_size() -> usize { 100 }
fn default_similarity_threshold() -> f32 { 0.2 }
fn default_retrieval_timeout() -> u64 { 30 }
fn default_retrieval_retries() -> u32 { 3 }
fn default_max_snippet_chars() -> usize { 300 }
fn default_max_sessions() -> usize { 1024 }
fn default_idle_ttl() -> u64 { 1800 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "ragtrail".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            provider: default_retrieval_provider(),
            api_key: None,
            base_url: default_retrieval_base_url(),
            page_size: default_page_size(),
            probe_page_size: default_probe_page_size(),
            document_page_size: default_document_page_size(),
            similarity_threshold: default_similarity_threshold(),
            toc_enhance: false,
            timeout_secs: default_retrieval_timeout(),
            max_retries: default_retrieval_retries(),
        }
    }
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            max_snippet_chars: default_max_snippet_chars(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            idle_ttl_secs: default_idle_ttl(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__RETRIEVAL__API_KEY=ragflow-...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get retrieval timeout as Duration
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval.timeout_secs)
    }

    /// Get session idle TTL as Duration
    pub fn session_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.sessions.idle_ttl_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            retrieval: RetrievalConfig::default(),
            evidence: EvidenceConfig::default(),
            sessions: SessionConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}
