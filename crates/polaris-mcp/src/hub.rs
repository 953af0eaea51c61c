use futures::future::join_all;
use polaris_config::ServerDescriptor;
use polaris_core::{PolarisError, Result};
use polaris_llm::ModelHandle;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::sampling::SamplingRelay;
use crate::session::{ProviderSession, ToolProvider};
use crate::transport;

/// Every provider session of one character run, in connection order.
#[derive(Default)]
pub struct McpHub {
    providers: Vec<Arc<dyn ToolProvider>>,
}

impl McpHub {
    /// Connect every descriptor in order. Each session's sampling relay is
    /// backed by `model`.
    ///
    /// All descriptors are validated before anything is spawned. If a
    /// connection fails, the sessions opened so far are closed and the error
    /// is returned.
    pub async fn connect_all(descriptors: &[ServerDescriptor], model: ModelHandle) -> Result<Self> {
        for descriptor in descriptors {
            transport::validate(descriptor)?;
        }

        let mut hub = Self::default();
        for descriptor in descriptors {
            let relay = SamplingRelay::new(model.clone());
            match ProviderSession::connect(descriptor.clone(), relay).await {
                Ok(session) => hub.providers.push(Arc::new(session)),
                Err(e) => {
                    error!(server = %descriptor.name, error = %e, "failed to connect tool provider");
                    if let Err(close_err) = hub.disconnect_all().await {
                        warn!(error = %close_err, "cleanup after failed connect was incomplete");
                    }
                    return Err(e);
                }
            }
        }

        info!(count = hub.providers.len(), "tool providers connected");
        Ok(hub)
    }

    /// Wrap already-connected providers.
    pub fn from_providers(providers: Vec<Arc<dyn ToolProvider>>) -> Self {
        Self { providers }
    }

    pub fn providers(&self) -> &[Arc<dyn ToolProvider>] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Close every session, waiting for all of them even when some fail.
    /// Failures are reported together.
    pub async fn disconnect_all(&mut self) -> Result<()> {
        let providers = std::mem::take(&mut self.providers);
        let results = join_all(providers.iter().map(|p| async move {
            p.close().await.map_err(|e| format!("{}: {e}", p.name()))
        }))
        .await;

        let failures: Vec<String> = results.into_iter().filter_map(|r| r.err()).collect();
        if failures.is_empty() {
            return Ok(());
        }
        for failure in &failures {
            warn!(failure = %failure, "tool provider failed to disconnect");
        }
        Err(PolarisError::Disconnect {
            failures: failures.len(),
            details: failures.join("; "),
        })
    }
}

impl std::fmt::Debug for McpHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| p.name()))
            .finish()
    }
}
