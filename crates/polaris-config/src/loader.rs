use polaris_core::{PolarisError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::schema::{CharacterConfig, ConfigWarning, McpConfig, PolarisConfig};
use crate::template::{deep_merge, render};

pub const CONFIG_DIR: &str = ".polaris";
pub const CONFIG_FILE: &str = "config.toml";
pub const CHARACTERS_DIR: &str = "characters";

const SERVERS_FIELD: &str = "mcp.servers";

/// Loads the global config and the characters layered on top of it.
pub struct ConfigLoader {
    config_dir: PathBuf,
    /// Rendered global file, kept as a table so characters can merge over it.
    raw: toml::Value,
    config: PolarisConfig,
    vars: HashMap<String, String>,
}

impl ConfigLoader {
    /// Resolve the config directory: explicit path > POLARIS_CONFIG_DIR > <workspace>/.polaris
    pub fn resolve_dir(workspace: &Path, explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("POLARIS_CONFIG_DIR") {
            return PathBuf::from(p);
        }
        workspace.join(CONFIG_DIR)
    }

    /// Load `config.toml` from `config_dir`, falling back to defaults.
    pub fn load(config_dir: &Path, vars: HashMap<String, String>) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        let mut raw = if config_path.exists() {
            info!(?config_path, "loading configuration");
            parse_file(&config_path, &vars)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            toml::Value::Table(toml::Table::new())
        };

        Self::apply_env_overrides(&mut raw);

        let mut config: PolarisConfig = raw.clone().try_into().map_err(|e| {
            PolarisError::Config(format!("failed to parse {}: {}", config_path.display(), e))
        })?;
        Self::apply_service_env(&mut config);

        match config.validate() {
            Ok(warnings) => log_warnings(&warnings),
            Err(e) => {
                return Err(PolarisError::ConfigValidation {
                    field: e.field,
                    reason: e.message,
                });
            }
        }

        Ok(Self {
            config_dir: config_dir.to_path_buf(),
            raw,
            config,
            vars,
        })
    }

    pub fn get(&self) -> &PolarisConfig {
        &self.config
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn characters_dir(&self) -> PathBuf {
        self.config_dir.join(CHARACTERS_DIR)
    }

    /// Load every `*.toml` under the characters directory, sorted by file name.
    ///
    /// A file that fails to render, parse or validate is logged and skipped,
    /// except for tool provider errors: a bad `[[mcp.servers]]` entry fails
    /// the whole load.
    pub fn load_characters(&self) -> Result<Vec<CharacterConfig>> {
        let dir = self.characters_dir();
        if !dir.exists() {
            warn!(?dir, "characters directory does not exist");
            return Ok(vec![]);
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut characters = Vec::new();
        for path in paths {
            match self.load_character(&path) {
                Ok(character) => {
                    info!(character = %character.name, "character loaded");
                    characters.push(character);
                }
                Err(e) if is_server_error(&e) => {
                    error!(file = %path.display(), error = %e, "invalid tool provider");
                    return Err(e);
                }
                Err(e) => {
                    error!(file = %path.display(), error = %e, "failed to load character");
                }
            }
        }
        Ok(characters)
    }

    /// Render one character file, merge it over the global config and validate it.
    pub fn load_character(&self, path: &Path) -> Result<CharacterConfig> {
        let overlay = parse_file(path, &self.vars)?;
        let mut merged = self.raw.clone();
        deep_merge(&mut merged, overlay);

        if let Some(mcp) = merged.get("mcp") {
            let _: McpConfig = mcp.clone().try_into().map_err(|e| {
                PolarisError::ConfigValidation {
                    field: SERVERS_FIELD.into(),
                    reason: format!("{}: {}", path.display(), e),
                }
            })?;
        }

        let character: CharacterConfig = merged.try_into().map_err(|e| {
            PolarisError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;

        match character.validate() {
            Ok(warnings) => {
                log_warnings(&warnings);
                Ok(character)
            }
            Err(e) => Err(PolarisError::ConfigValidation {
                field: e.field,
                reason: format!("{}: {}", path.display(), e.message),
            }),
        }
    }

    /// Apply env var overrides (POLARIS_LLM_PROVIDER, POLARIS_LLM_MODEL, POLARIS_LOG_LEVEL).
    /// They land in the global table, so character files still win.
    fn apply_env_overrides(raw: &mut toml::Value) {
        let pairs = [
            ("POLARIS_LLM_PROVIDER", "llm", "provider"),
            ("POLARIS_LLM_MODEL", "llm", "model"),
            ("POLARIS_LOG_LEVEL", "logging", "level"),
        ];
        for (var, section, key) in pairs {
            if let Ok(v) = std::env::var(var) {
                let mut overlay = toml::Table::new();
                let mut inner = toml::Table::new();
                inner.insert(key.to_string(), toml::Value::String(v));
                overlay.insert(section.to_string(), toml::Value::Table(inner));
                deep_merge(raw, toml::Value::Table(overlay));
            }
        }
    }

    /// Credentials: the config file takes priority, env is the fallback.
    fn apply_service_env(config: &mut PolarisConfig) {
        let services = &mut config.services;
        let slots = [
            (&mut services.openai_api_key, "OPENAI_API_KEY"),
            (&mut services.openai_base_url, "OPENAI_BASE_URL"),
            (&mut services.anthropic_api_key, "ANTHROPIC_API_KEY"),
            (&mut services.anthropic_base_url, "ANTHROPIC_BASE_URL"),
            (&mut services.google_api_key, "GOOGLE_GENERATIVE_AI_API_KEY"),
            (&mut services.google_base_url, "GOOGLE_BASE_URL"),
            (&mut services.github_token, "GITHUB_TOKEN"),
        ];
        for (slot, var) in slots {
            if slot.is_none()
                && let Ok(v) = std::env::var(var)
                && !v.is_empty()
            {
                *slot = Some(v);
            }
        }
    }
}

fn parse_file(path: &Path, vars: &HashMap<String, String>) -> Result<toml::Value> {
    let content = std::fs::read_to_string(path)?;
    let rendered = render(&content, vars)?;
    toml::from_str::<toml::Value>(&rendered)
        .map_err(|e| PolarisError::Config(format!("failed to parse {}: {}", path.display(), e)))
}

/// Tool provider descriptor errors are fatal, unlike other character errors.
fn is_server_error(err: &PolarisError) -> bool {
    matches!(err, PolarisError::ConfigValidation { field, .. } if field.starts_with(SERVERS_FIELD))
}

fn log_warnings(warnings: &[ConfigWarning]) {
    for w in warnings {
        warn!("{}", w);
    }
}
