//! One live connection to a tool provider.

use async_trait::async_trait;
use polaris_config::ServerDescriptor;
use polaris_core::{PolarisError, Result, ToolSpec};
use rmcp::model::{CallToolRequestParam, CallToolResult, Tool};
use rmcp::service::RunningService;
use rmcp::transport::{IntoTransport, StreamableHttpClientTransport};
use rmcp::{Peer, RoleClient, ServiceError, ServiceExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::PolarisClient;
use crate::sampling::SamplingRelay;
use crate::transport::{BoundTransport, bind};

/// What the aggregator needs from a connected provider.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// The descriptor's name, used for provenance and logs.
    fn name(&self) -> &str;

    /// Configured allow-list, if any.
    fn allow_list(&self) -> Option<&BTreeMap<String, bool>>;

    /// Whether the allow-list lets `tool` through.
    fn allows(&self, tool: &str) -> bool {
        match self.allow_list() {
            None => true,
            Some(list) => list.get(tool).copied().unwrap_or(false),
        }
    }

    /// The provider's current tool catalog. Never cached.
    async fn list_tools(&self) -> Result<Vec<ToolSpec>>;

    /// Invoke `name` and return the result's content blocks.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value>;

    /// Release the transport. Later calls fail with `SessionClosed`.
    async fn close(&self) -> Result<()>;
}

type Service = RunningService<RoleClient, PolarisClient>;

/// An initialized MCP client session.
pub struct ProviderSession {
    descriptor: ServerDescriptor,
    service: Mutex<Option<Service>>,
    peer: Peer<RoleClient>,
    closed: AtomicBool,
    timeout: Duration,
}

impl ProviderSession {
    /// Bind the descriptor's transport and run the initialize handshake.
    pub async fn connect(descriptor: ServerDescriptor, relay: SamplingRelay) -> Result<Self> {
        match bind(&descriptor)? {
            BoundTransport::Stdio(process) => Self::start(descriptor, process, relay).await,
            BoundTransport::Http(config) => {
                let transport = StreamableHttpClientTransport::from_config(config);
                Self::start(descriptor, transport, relay).await
            }
        }
    }

    /// Run the initialize handshake over an already established channel.
    pub async fn start<T, E, A>(
        descriptor: ServerDescriptor,
        transport: T,
        relay: SamplingRelay,
    ) -> Result<Self>
    where
        T: IntoTransport<RoleClient, E, A>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let timeout = Duration::from_secs(descriptor.timeout_secs.max(1));
        let client = PolarisClient::new(descriptor.name.clone(), relay);

        let connect_err = |reason: String| PolarisError::Connection {
            server: descriptor.name.clone(),
            reason,
        };
        let service = tokio::time::timeout(timeout, client.serve(transport))
            .await
            .map_err(|_| connect_err(format!("handshake timed out after {}s", timeout.as_secs())))?
            .map_err(|e| connect_err(e.to_string()))?;

        if let Some(info) = service.peer_info() {
            info!(
                server = %descriptor.name,
                provider = %info.server_info.name,
                version = %info.server_info.version,
                "connected to tool provider"
            );
        }

        let peer = service.peer().clone();
        Ok(Self {
            descriptor,
            service: Mutex::new(Some(service)),
            peer,
            closed: AtomicBool::new(false),
            timeout,
        })
    }

    pub fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(PolarisError::SessionClosed(self.descriptor.name.clone()));
        }
        Ok(())
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, ServiceError>>,
    {
        let result = tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| PolarisError::Timeout {
                operation: format!("{} on {}", operation, self.descriptor.name),
                secs: self.timeout.as_secs(),
            })?;
        result.map_err(|e| {
            if self.is_closed() {
                PolarisError::SessionClosed(self.descriptor.name.clone())
            } else {
                map_service_error(&self.descriptor.name, operation, e)
            }
        })
    }
}

impl std::fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSession")
            .field("server", &self.descriptor.name)
            .field("transport", &self.descriptor.transport)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Protocol-level failures become tool-level errors.
pub fn map_service_error(server: &str, operation: &str, err: ServiceError) -> PolarisError {
    match err {
        ServiceError::McpError(data) => PolarisError::ToolExecution {
            tool: operation.to_string(),
            reason: data.message.to_string(),
            raw: data.data,
        },
        ServiceError::TransportClosed | ServiceError::Cancelled { .. } => {
            PolarisError::SessionClosed(server.to_string())
        }
        ServiceError::Timeout { timeout } => PolarisError::Timeout {
            operation: format!("{operation} on {server}"),
            secs: timeout.as_secs(),
        },
        other => PolarisError::ToolExecution {
            tool: operation.to_string(),
            reason: other.to_string(),
            raw: None,
        },
    }
}

/// Catalog entry for one advertised tool.
pub fn tool_spec(tool: &Tool) -> ToolSpec {
    ToolSpec {
        name: tool.name.to_string(),
        description: tool.description.as_deref().unwrap_or_default().to_string(),
        parameters: Value::Object((*tool.input_schema).clone()),
    }
}

/// The content blocks of a call result, or an error when the provider
/// flagged the result as one.
pub fn result_content(tool: &str, result: CallToolResult) -> Result<Value> {
    let content = serde_json::to_value(&result.content)?;
    if result.is_error.unwrap_or(false) {
        let reason = result
            .content
            .iter()
            .filter_map(|c| c.as_text().map(|t| t.text.as_str()))
            .collect::<Vec<_>>()
            .join("\n");
        return Err(PolarisError::ToolExecution {
            tool: tool.to_string(),
            reason: if reason.is_empty() {
                "provider reported an error".into()
            } else {
                reason
            },
            raw: Some(content),
        });
    }
    Ok(content)
}

#[async_trait]
impl ToolProvider for ProviderSession {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn allow_list(&self) -> Option<&BTreeMap<String, bool>> {
        self.descriptor.tools.as_ref()
    }

    async fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        self.ensure_open()?;
        let tools = self.bounded("tools/list", self.peer.list_all_tools()).await?;
        debug!(server = %self.descriptor.name, count = tools.len(), "listed tools");
        Ok(tools.iter().map(tool_spec).collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        self.ensure_open()?;
        let arguments = match arguments {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                return Err(PolarisError::ToolArguments {
                    tool: name.to_string(),
                    reason: format!("arguments must be an object, got {other}"),
                });
            }
        };
        debug!(server = %self.descriptor.name, tool = name, "calling tool");
        let request = CallToolRequestParam {
            name: name.to_string().into(),
            arguments,
        };
        let result = self.bounded(name, self.peer.call_tool(request)).await?;
        result_content(name, result)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let Some(service) = self.service.lock().await.take() else {
            return Ok(());
        };
        debug!(server = %self.descriptor.name, "closing provider session");
        match service.cancel().await {
            Ok(reason) => {
                debug!(server = %self.descriptor.name, ?reason, "provider session closed");
                Ok(())
            }
            Err(e) => {
                warn!(server = %self.descriptor.name, error = %e, "provider session did not shut down cleanly");
                Err(PolarisError::SessionClosed(format!(
                    "{}: {e}",
                    self.descriptor.name
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::ErrorData;
    use rmcp::model::Content;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_tool_spec_copies_schema() {
        let schema = json!({"type": "object", "properties": {"q": {"type": "string"}}});
        let tool = Tool::new(
            "search",
            "Search things",
            Arc::new(schema.as_object().unwrap().clone()),
        );
        let spec = tool_spec(&tool);
        assert_eq!(spec.name, "search");
        assert_eq!(spec.description, "Search things");
        assert_eq!(spec.parameters, schema);
    }

    #[test]
    fn test_result_content_success() {
        let result = CallToolResult::success(vec![Content::text("y")]);
        let value = result_content("search", result).unwrap();
        assert_eq!(value, json!([{"type": "text", "text": "y"}]));
    }

    #[test]
    fn test_result_content_is_error_flag() {
        let result = CallToolResult::error(vec![Content::text("file missing")]);
        let err = result_content("read", result).unwrap_err();
        match err {
            PolarisError::ToolExecution { tool, reason, raw } => {
                assert_eq!(tool, "read");
                assert_eq!(reason, "file missing");
                assert_eq!(raw.unwrap()[0]["text"], "file missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_service_error_mapping() {
        let err = map_service_error("fs", "read", ServiceError::TransportClosed);
        assert!(matches!(err, PolarisError::SessionClosed(_)));

        let err = map_service_error(
            "fs",
            "read",
            ServiceError::McpError(ErrorData::internal_error(
                "disk on fire",
                Some(json!({"path": "/tmp"})),
            )),
        );
        assert_eq!(err.kind(), "ToolExecutionError");
        assert_eq!(err.raw(), Some(&json!({"path": "/tmp"})));

        let err = map_service_error(
            "fs",
            "read",
            ServiceError::Timeout {
                timeout: Duration::from_secs(5),
            },
        );
        assert!(matches!(err, PolarisError::Timeout { secs: 5, .. }));
    }
}
