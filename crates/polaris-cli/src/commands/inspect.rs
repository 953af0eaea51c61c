use polaris_config::{CharacterConfig, ConfigLoader, TransportKind};
use polaris_core::{PolarisError, Result};
use polaris_mcp::{McpHub, ToolCatalog};
use polaris_runtime::model_for;
use tracing::warn;

fn describe_server(server: &polaris_config::ServerDescriptor) -> String {
    let target = match server.transport {
        TransportKind::Stdio => {
            let mut parts = vec![server.command.clone().unwrap_or_default()];
            parts.extend(server.args.iter().cloned());
            parts.join(" ")
        }
        TransportKind::Http => server.url.clone().unwrap_or_default(),
    };
    let filter = match &server.tools {
        None => "all tools".to_string(),
        Some(list) => {
            let allowed: Vec<&str> = list
                .iter()
                .filter(|(_, on)| **on)
                .map(|(name, _)| name.as_str())
                .collect();
            format!("only: {}", allowed.join(", "))
        }
    };
    format!("{} [{:?}] {} ({})", server.name, server.transport, target, filter)
}

pub(super) fn cmd_characters(loader: &ConfigLoader) -> Result<()> {
    let characters = loader.load_characters()?;
    if characters.is_empty() {
        println!("No characters found in {}", loader.characters_dir().display());
        return Ok(());
    }

    for c in &characters {
        println!("\x1b[1m{}\x1b[0m", c.name);
        println!("  labels:    {}", c.labels.join(", "));
        println!("  model:     {}/{}", c.llm.provider, c.llm.model);
        println!("  max_steps: {}", c.llm.max_steps.max(1));
        if c.mcp.servers.is_empty() {
            println!("  servers:   (none)");
        }
        for server in &c.mcp.servers {
            println!("  server:    {}", describe_server(server));
        }
        println!();
    }
    Ok(())
}

fn find<'a>(characters: &'a [CharacterConfig], name: &str) -> Result<&'a CharacterConfig> {
    characters.iter().find(|c| c.name == name).ok_or_else(|| {
        let known: Vec<&str> = characters.iter().map(|c| c.name.as_str()).collect();
        PolarisError::Config(format!(
            "unknown character \"{name}\" (known: {})",
            known.join(", ")
        ))
    })
}

pub(super) async fn cmd_tools(loader: &ConfigLoader, name: &str) -> Result<()> {
    let characters = loader.load_characters()?;
    let character = find(&characters, name)?;
    let model = model_for(character, &loader.get().services)?;

    let mut hub = McpHub::connect_all(&character.mcp.servers, model).await?;
    let listed = ToolCatalog::build(hub.providers()).await;
    let teardown = hub.disconnect_all().await;
    let catalog = listed?;
    if let Err(e) = teardown {
        warn!(error = %e, "some providers did not disconnect cleanly");
    }

    if catalog.is_empty() {
        println!("{name}: no tools");
        return Ok(());
    }
    println!("\x1b[1m{name}\x1b[0m ({} tools)", catalog.len());
    let width = catalog
        .entries()
        .iter()
        .map(|e| e.spec.name.len())
        .max()
        .unwrap_or(0);
    for entry in catalog.entries() {
        let description = entry.spec.description.lines().next().unwrap_or_default();
        println!(
            "  {:width$}  \x1b[90m[{}]\x1b[0m {}",
            entry.spec.name, entry.server, description
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use polaris_config::ServerDescriptor;
    use std::collections::BTreeMap;

    #[test]
    fn test_describe_stdio_server() {
        let server = ServerDescriptor::stdio("fs", "npx", vec!["mcp-fs".into(), "/work".into()]);
        assert_eq!(describe_server(&server), "fs [Stdio] npx mcp-fs /work (all tools)");
    }

    #[test]
    fn test_describe_filtered_http_server() {
        let mut server = ServerDescriptor::http("remote", "https://example.com/mcp");
        server.tools = Some(BTreeMap::from([
            ("search".to_string(), true),
            ("delete".to_string(), false),
        ]));
        assert_eq!(
            describe_server(&server),
            "remote [Http] https://example.com/mcp (only: search)"
        );
    }

    #[test]
    fn test_find_unknown_character() {
        let characters = vec![CharacterConfig {
            name: "triager".into(),
            ..Default::default()
        }];
        assert!(find(&characters, "triager").is_ok());
        let err = find(&characters, "coder").unwrap_err();
        assert!(err.to_string().contains("known: triager"));
    }
}
