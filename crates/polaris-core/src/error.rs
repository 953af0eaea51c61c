use thiserror::Error;

/// Unified error type for the entire Polaris runner.
#[derive(Error, Debug)]
pub enum PolarisError {
    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Connection errors ──────────────────────────────────────
    #[error("failed to connect to provider {server}: {reason}")]
    Connection { server: String, reason: String },

    #[error("provider session closed: {0}")]
    SessionClosed(String),

    #[error("{failures} provider(s) failed to disconnect: {details}")]
    Disconnect { failures: usize, details: String },

    // ── Tool errors ────────────────────────────────────────────
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("invalid arguments for tool {tool}: {reason}")]
    ToolArguments { tool: String, reason: String },

    #[error("tool execution failed: {tool}: {reason}")]
    ToolExecution {
        tool: String,
        reason: String,
        /// Raw provider payload, when the provider returned one.
        raw: Option<serde_json::Value>,
    },

    // ── LLM errors ─────────────────────────────────────────────
    #[error("llm provider error: {0}")]
    LlmProvider(String),

    #[error("llm rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    // ── Platform errors ────────────────────────────────────────
    #[error("platform error: {0}")]
    Platform(String),

    // ── Timeouts ───────────────────────────────────────────────
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl PolarisError {
    /// Category label used in tool outcomes and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::ConfigValidation { .. } => "ConfigurationError",
            Self::Connection { .. } => "ConnectionError",
            Self::SessionClosed(_) => "SessionClosed",
            Self::Disconnect { .. } => "DisconnectError",
            Self::ToolNotFound(_) => "ToolNotFound",
            Self::ToolArguments { .. } => "InvalidArguments",
            Self::ToolExecution { .. } => "ToolExecutionError",
            Self::LlmProvider(_) | Self::RateLimited { .. } => "GenerationError",
            Self::Platform(_) => "SinkError",
            Self::Timeout { .. } => "Timeout",
            Self::Io(_) => "IoError",
            Self::Serialization(_) => "SerializationError",
            Self::Other(_) => "Error",
        }
    }

    /// Provider-supplied diagnostics attached to the error, if any.
    pub fn raw(&self) -> Option<&serde_json::Value> {
        match self {
            Self::ToolExecution { raw, .. } => raw.as_ref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PolarisError>;
