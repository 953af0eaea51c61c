use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::path::PathBuf;

use polaris_config::{ConfigLoader, LoggingConfig, env_vars};
use polaris_core::WorkspaceContext;

mod inspect;
mod run;

/// Polaris: autonomous issue agent driving MCP tool providers
#[derive(Parser)]
#[command(name = "polaris", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config directory (default: <workspace>/.polaris)
    #[arg(short, long, global = true, env = "POLARIS_CONFIG_DIR")]
    config: Option<PathBuf>,

    /// Workspace root (default: GITHUB_WORKSPACE, then the current directory)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Handle the triggering event: run every matching character on its issues (default)
    Run {
        /// Work this issue number in the current repository instead of reading the event
        #[arg(long)]
        issue: Option<u64>,
    },
    /// List loaded characters and their tool providers
    Characters,
    /// Connect a character's providers and print the aggregated tool catalog
    Tools {
        /// Character name
        character: String,
    },
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    pub async fn run(self) -> polaris_core::Result<()> {
        if let Some(Commands::Completions { shell }) = self.command {
            return Self::cmd_completions(shell);
        }

        let mut context = WorkspaceContext::from_env();
        if let Some(workspace) = &self.workspace {
            context.workspace = workspace.clone();
        }

        // Load config first so we can use it for log format
        let config_dir = ConfigLoader::resolve_dir(&context.workspace, self.config.as_deref());
        let loader = ConfigLoader::load(&config_dir, env_vars())?;
        self.init_tracing(&loader.get().logging);

        match self.command.unwrap_or(Commands::Run { issue: None }) {
            Commands::Run { issue } => run::cmd_run(&loader, &context, issue).await,
            Commands::Characters => inspect::cmd_characters(&loader),
            Commands::Tools { character } => inspect::cmd_tools(&loader, &character).await,
            Commands::Completions { shell } => Self::cmd_completions(shell),
        }
    }

    /// Resolve log level: RUST_LOG > --verbose > --quiet > --log-level > config
    fn log_level<'a>(&'a self, logging: &'a LoggingConfig) -> &'a str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level.as_deref().unwrap_or(&logging.level)
        }
    }

    fn init_tracing(&self, logging: &LoggingConfig) {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(self.log_level(logging)));

        if logging.format == "json" {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_target(true)
                .init();
        } else if logging.format == "compact" {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .compact()
                .with_target(false)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
        }
    }

    fn cmd_completions(shell: Shell) -> polaris_core::Result<()> {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "polaris", &mut std::io::stdout());
        Ok(())
    }
}
