use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration, maps to `.polaris/config.toml`.
///
/// Character files are deep-merged over this before being parsed as
/// [`CharacterConfig`], so every section here doubles as a character default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolarisConfig {
    pub llm: LlmConfig,
    pub mcp: McpConfig,
    pub permissions: PermissionsConfig,
    pub logging: LoggingConfig,
    pub services: ServicesConfig,
    /// Drop comments containing `[INTERNAL]` from the initial transcript.
    pub exclude_internal_comments: bool,
}

// ── Character ──────────────────────────────────────────────────

/// A configured agent persona, one per `.polaris/characters/*.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterConfig {
    /// Required. Used in logs and diagnostics.
    pub name: String,
    /// The character handles tasks carrying any of these labels.
    pub labels: Vec<String>,
    pub system_prompt: String,
    pub llm: LlmConfig,
    pub mcp: McpConfig,
    pub permissions: PermissionsConfig,
    pub exclude_internal_comments: bool,
}

// ── LLM ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "openai", "anthropic", "google" or "mock".
    pub provider: String,
    /// Provider-specific model id, e.g. "gpt-4o".
    pub model: String,
    /// Temperature (0.0 - 2.0).
    pub temperature: f32,
    /// Maximum tokens per generation.
    pub max_tokens: u32,
    /// Upper bound on generation calls per task. 0 is treated as 1.
    pub max_steps: u32,
    /// Retries on transient model errors, per generation call.
    pub max_retries: u32,
    /// Deadline per generation call in seconds. 0 = no deadline.
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            model: String::new(),
            temperature: 0.0,
            max_tokens: 4096,
            max_steps: 1,
            max_retries: 2,
            request_timeout_secs: 300,
        }
    }
}

// ── MCP ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    /// Tool providers, connected in this order.
    pub servers: Vec<ServerDescriptor>,
}

/// How to reach one tool provider and which of its tools to expose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub transport: TransportKind,
    /// Executable for stdio providers.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for stdio providers, layered over the safe defaults.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Endpoint for http providers.
    #[serde(default)]
    pub url: Option<String>,
    /// Bearer token for http providers.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Allow-list. Absent = every tool; present = only names mapped to `true`.
    #[serde(default)]
    pub tools: Option<BTreeMap<String, bool>>,
    /// Deadline for each protocol operation against this provider.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Child process speaking the protocol over stdin/stdout.
    Stdio,
    /// Streamable HTTP endpoint.
    #[serde(alias = "sse", alias = "streamable-http")]
    Http,
}

impl ServerDescriptor {
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::Stdio,
            command: Some(command.into()),
            args,
            env: BTreeMap::new(),
            url: None,
            auth_token: None,
            tools: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::Http,
            command: None,
            args: vec![],
            env: BTreeMap::new(),
            url: Some(url.into()),
            auth_token: None,
            tools: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Check that the descriptor names a reachable endpoint for its transport.
    /// Nothing is spawned or dialled.
    pub fn validate(&self) -> Result<(), ConfigWarning> {
        let invalid = |field: &str, message: String| ConfigWarning {
            field: format!("mcp.servers.{}.{}", self.name, field),
            message,
            severity: WarningSeverity::Error,
            hint: None,
        };

        match self.transport {
            TransportKind::Stdio => {
                let command = self.command.as_deref().unwrap_or_default();
                if command.trim().is_empty() {
                    return Err(invalid("command", "stdio provider needs a command".into()));
                }
            }
            TransportKind::Http => {
                let raw = self.url.as_deref().unwrap_or_default();
                if raw.trim().is_empty() {
                    return Err(invalid("url", "http provider needs a url".into()));
                }
                let parsed = url::Url::parse(raw)
                    .map_err(|e| invalid("url", format!("invalid url '{raw}': {e}")))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(invalid(
                        "url",
                        format!("unsupported scheme '{}'", parsed.scheme()),
                    ));
                }
            }
        }
        Ok(())
    }
}

// ── Permissions ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsConfig {
    /// Parsed and carried; not enforced by the runner.
    pub max_responses_per_issue: u32,
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Services ───────────────────────────────────────────────────

/// Credentials and endpoints for external services.
/// The config file takes priority; environment variables fill the gaps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Can also be set via OPENAI_API_KEY.
    pub openai_api_key: Option<String>,
    /// Can also be set via OPENAI_BASE_URL.
    pub openai_base_url: Option<String>,
    /// Can also be set via ANTHROPIC_API_KEY.
    pub anthropic_api_key: Option<String>,
    /// Can also be set via ANTHROPIC_BASE_URL.
    pub anthropic_base_url: Option<String>,
    /// Can also be set via GOOGLE_GENERATIVE_AI_API_KEY.
    pub google_api_key: Option<String>,
    /// Can also be set via GOOGLE_BASE_URL.
    pub google_base_url: Option<String>,
    /// Can also be set via GITHUB_TOKEN.
    pub github_token: Option<String>,
}

// ── Validation ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
        };
        write!(f, "{} {}: {}", tag, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, " ({})", h)?;
        }
        Ok(())
    }
}

/// Split warnings into a hard error (first `Error` severity) and the rest.
fn finish(warnings: Vec<ConfigWarning>) -> Result<Vec<ConfigWarning>, ConfigWarning> {
    if let Some(err) = warnings
        .iter()
        .find(|w| w.severity == WarningSeverity::Error)
    {
        return Err(err.clone());
    }
    Ok(warnings)
}

fn check_llm(llm: &LlmConfig, warnings: &mut Vec<ConfigWarning>) {
    if llm.temperature < 0.0 || llm.temperature > 2.0 {
        warnings.push(ConfigWarning {
            field: "llm.temperature".into(),
            message: format!("temperature {} is out of range", llm.temperature),
            severity: WarningSeverity::Error,
            hint: Some("Temperature must be between 0.0 and 2.0".into()),
        });
    }
    if llm.max_tokens == 0 {
        warnings.push(ConfigWarning {
            field: "llm.max_tokens".into(),
            message: "max_tokens is 0, the model won't produce output".into(),
            severity: WarningSeverity::Error,
            hint: Some("Set to e.g. 4096".into()),
        });
    }
    if llm.max_steps == 0 {
        warnings.push(ConfigWarning {
            field: "llm.max_steps".into(),
            message: "max_steps is 0, treating it as 1".into(),
            severity: WarningSeverity::Warning,
            hint: None,
        });
    }
}

fn check_servers(mcp: &McpConfig, warnings: &mut Vec<ConfigWarning>) {
    let mut seen = std::collections::HashSet::new();
    for (i, server) in mcp.servers.iter().enumerate() {
        if server.name.is_empty() {
            warnings.push(ConfigWarning {
                field: format!("mcp.servers[{i}].name"),
                message: "server name is empty".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        } else if !seen.insert(server.name.as_str()) {
            warnings.push(ConfigWarning {
                field: format!("mcp.servers[{i}].name"),
                message: format!("duplicate server name '{}'", server.name),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }
        if let Err(e) = server.validate() {
            warnings.push(e);
        }
        if server.timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: format!("mcp.servers[{i}].timeout_secs"),
                message: "timeout_secs must be greater than 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Default is 60".into()),
            });
        }
    }
}

impl PolarisConfig {
    /// Validate the global config. `Err` carries the first hard error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigWarning> {
        let mut warnings = Vec::new();

        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        check_llm(&self.llm, &mut warnings);
        check_servers(&self.mcp, &mut warnings);
        finish(warnings)
    }
}

impl CharacterConfig {
    /// Validate a fully merged character.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigWarning> {
        let mut warnings = Vec::new();

        if self.name.trim().is_empty() {
            warnings.push(ConfigWarning {
                field: "name".into(),
                message: "name is required in character config".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }
        if self.labels.is_empty() {
            warnings.push(ConfigWarning {
                field: "labels".into(),
                message: "no labels configured, the character will never run".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }
        if self.llm.provider.is_empty() {
            warnings.push(ConfigWarning {
                field: "llm.provider".into(),
                message: "provider is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Use 'openai', 'anthropic' or 'google'".into()),
            });
        }
        if self.llm.model.is_empty() {
            warnings.push(ConfigWarning {
                field: "llm.model".into(),
                message: "model is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'gpt-4o'".into()),
            });
        }

        check_llm(&self.llm, &mut warnings);
        check_servers(&self.mcp, &mut warnings);
        finish(warnings)
    }

    /// Whether any configured label appears on the task.
    pub fn matches_labels(&self, task_labels: &[String]) -> bool {
        self.labels.iter().any(|l| task_labels.contains(l))
    }
}
