//! # polaris-mcp
//!
//! Tool-provider plumbing for Polaris: binds stdio and streamable-HTTP
//! transports, runs one MCP client session per configured server, answers
//! provider sampling requests with the character's model, and flattens every
//! provider's tools into a single catalog the agent loop can call.

pub mod catalog;
pub mod client;
pub mod hub;
pub mod sampling;
pub mod session;
pub mod transport;

pub use catalog::{CatalogEntry, ToolCatalog};
pub use client::PolarisClient;
pub use hub::McpHub;
pub use sampling::SamplingRelay;
pub use session::{ProviderSession, ToolProvider};
pub use transport::{BoundTransport, bind};
