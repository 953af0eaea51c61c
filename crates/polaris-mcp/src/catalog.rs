//! The flat tool catalog a character's model sees, and dispatch back to the
//! provider that advertised each tool.

use futures::future::try_join_all;
use jsonschema::Validator;
use polaris_core::{PolarisError, Result, ToolCall, ToolOutcome, ToolSpec};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use crate::session::ToolProvider;

/// One catalog tool and where it came from.
pub struct CatalogEntry {
    pub spec: ToolSpec,
    /// Name of the provider that advertised the tool.
    pub server: String,
    provider: Weak<dyn ToolProvider>,
    validator: Option<Arc<Validator>>,
}

impl CatalogEntry {
    fn new(spec: ToolSpec, provider: &Arc<dyn ToolProvider>) -> Self {
        let validator = match jsonschema::options().build(&spec.parameters) {
            Ok(v) => Some(Arc::new(v)),
            Err(e) => {
                warn!(
                    tool = %spec.name,
                    server = provider.name(),
                    error = %e,
                    "tool input schema does not compile, arguments will not be checked"
                );
                None
            }
        };
        Self {
            spec,
            server: provider.name().to_string(),
            provider: Arc::downgrade(provider),
            validator,
        }
    }

    fn check_arguments(&self, arguments: &Value) -> Result<()> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };
        if validator.is_valid(arguments) {
            return Ok(());
        }
        let errors: Vec<String> = validator
            .iter_errors(arguments)
            .map(|e| format!("- {e}"))
            .collect();
        Err(PolarisError::ToolArguments {
            tool: self.spec.name.clone(),
            reason: format!("schema validation failed:\n{}", errors.join("\n")),
        })
    }
}

impl std::fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("name", &self.spec.name)
            .field("server", &self.server)
            .finish()
    }
}

/// Tools from every provider, filtered by allow-lists and keyed by name.
///
/// Holds only weak references to providers; the hub owns the sessions.
#[derive(Debug, Default)]
pub struct ToolCatalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    /// List every provider concurrently and merge the results in provider
    /// order. On a name clash the later provider wins.
    pub async fn build(providers: &[Arc<dyn ToolProvider>]) -> Result<Self> {
        let listings = try_join_all(providers.iter().map(|p| p.list_tools())).await?;

        let mut catalog = Self::default();
        for (provider, tools) in providers.iter().zip(listings) {
            let advertised = tools.len();
            let mut kept = 0usize;
            for spec in tools {
                if !provider.allows(&spec.name) {
                    continue;
                }
                kept += 1;
                catalog.insert(CatalogEntry::new(spec, provider));
            }
            debug!(server = provider.name(), advertised, kept, "aggregated provider tools");
        }
        Ok(catalog)
    }

    fn insert(&mut self, entry: CatalogEntry) {
        match self.index.get(&entry.spec.name) {
            Some(&slot) => {
                warn!(
                    tool = %entry.spec.name,
                    previous = %self.entries[slot].server,
                    replacement = %entry.server,
                    "tool name collision, later provider wins"
                );
                self.entries[slot] = entry;
            }
            None => {
                self.index.insert(entry.spec.name.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Tool specs for the model, in catalog order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.entries.iter().map(|e| e.spec.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run a model-requested call. Every failure is folded into the outcome.
    pub async fn invoke(&self, call: &ToolCall) -> ToolOutcome {
        match self.dispatch(call).await {
            Ok(content) => ToolOutcome::success(call, content),
            Err(e) => {
                warn!(tool = %call.tool_name, kind = e.kind(), error = %e, "tool call failed");
                ToolOutcome::failure(call, &e)
            }
        }
    }

    async fn dispatch(&self, call: &ToolCall) -> Result<Value> {
        let entry = self
            .get(&call.tool_name)
            .ok_or_else(|| PolarisError::ToolNotFound(call.tool_name.clone()))?;

        let arguments = match &call.arguments {
            Value::Null => json!({}),
            other => other.clone(),
        };
        entry.check_arguments(&arguments)?;

        let provider = entry
            .provider
            .upgrade()
            .ok_or_else(|| PolarisError::SessionClosed(entry.server.clone()))?;
        debug!(tool = %call.tool_name, server = %entry.server, "dispatching tool call");
        provider.call_tool(&call.tool_name, arguments).await
    }
}
