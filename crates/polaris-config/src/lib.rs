//! # polaris-config
//!
//! Configuration system for Polaris. Reads `.polaris/config.toml` and the
//! character files under `.polaris/characters/`, substitutes `${{ env_NAME }}`
//! variables, and deep-merges each character over the global defaults.

pub mod loader;
pub mod schema;
pub mod template;

pub use loader::ConfigLoader;
pub use schema::{
    CharacterConfig, ConfigWarning, LlmConfig, LoggingConfig, McpConfig, PermissionsConfig,
    PolarisConfig, ServerDescriptor, ServicesConfig, TransportKind, WarningSeverity,
};
pub use template::{deep_merge, env_vars, render};
