//! Turning a [`ServerDescriptor`] into a live duplex channel.

use polaris_config::{ServerDescriptor, TransportKind};
use polaris_core::{PolarisError, Result};
use rmcp::transport::TokioChildProcess;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Variables a stdio provider inherits from the runner's environment.
#[cfg(not(windows))]
pub const INHERITED_ENV_VARS: &[&str] = &["HOME", "LOGNAME", "PATH", "SHELL", "TERM", "USER"];

#[cfg(windows)]
pub const INHERITED_ENV_VARS: &[&str] = &[
    "APPDATA",
    "HOMEDRIVE",
    "HOMEPATH",
    "LOCALAPPDATA",
    "PATH",
    "PROCESSOR_ARCHITECTURE",
    "SYSTEMDRIVE",
    "SYSTEMROOT",
    "TEMP",
    "USERNAME",
    "USERPROFILE",
];

/// An established channel, ready for the protocol handshake.
pub enum BoundTransport {
    /// Spawned child; closing the session terminates it.
    Stdio(TokioChildProcess),
    /// HTTP endpoint; the stream is opened when the session starts.
    Http(StreamableHttpClientTransportConfig),
}

impl std::fmt::Debug for BoundTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio(p) => f.debug_tuple("Stdio").field(&p.id()).finish(),
            Self::Http(cfg) => f.debug_tuple("Http").field(&cfg.uri).finish(),
        }
    }
}

/// The safe subset of the runner's environment. Values that look like
/// exported shell functions are skipped.
pub fn default_env() -> BTreeMap<String, String> {
    INHERITED_ENV_VARS
        .iter()
        .filter_map(|key| {
            let value = std::env::var(key).ok()?;
            (!value.starts_with("()")).then(|| (key.to_string(), value))
        })
        .collect()
}

/// Child environment: safe defaults, then descriptor overrides.
pub fn child_env(descriptor: &ServerDescriptor) -> BTreeMap<String, String> {
    let mut env = default_env();
    env.extend(
        descriptor
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    env
}

/// Check a descriptor without touching the outside world.
pub fn validate(descriptor: &ServerDescriptor) -> Result<()> {
    descriptor
        .validate()
        .map_err(|w| PolarisError::ConfigValidation {
            field: w.field,
            reason: w.message,
        })
}

/// Establish the channel described by `descriptor`.
///
/// For stdio this spawns the child with a cleared environment rebuilt from
/// [`child_env`]; the child's stderr is inherited.
pub fn bind(descriptor: &ServerDescriptor) -> Result<BoundTransport> {
    validate(descriptor)?;

    match descriptor.transport {
        TransportKind::Stdio => {
            let command = descriptor.command.as_deref().unwrap_or_default();
            let mut cmd = Command::new(command);
            cmd.args(&descriptor.args)
                .env_clear()
                .envs(child_env(descriptor))
                .kill_on_drop(true);

            debug!(server = %descriptor.name, command, args = ?descriptor.args, "spawning stdio provider");
            let (process, _stderr) = TokioChildProcess::builder(cmd)
                .stderr(Stdio::inherit())
                .spawn()
                .map_err(|e| PolarisError::Connection {
                    server: descriptor.name.clone(),
                    reason: format!("failed to spawn '{command}': {e}"),
                })?;
            Ok(BoundTransport::Stdio(process))
        }
        TransportKind::Http => {
            let url = descriptor.url.as_deref().unwrap_or_default();
            let mut config = StreamableHttpClientTransportConfig::with_uri(url.to_string());
            if let Some(token) = descriptor.auth_token.as_deref().filter(|t| !t.is_empty()) {
                config = config.auth_header(token);
            }
            debug!(server = %descriptor.name, url, "binding http provider");
            Ok(BoundTransport::Http(config))
        }
    }
}
