//! CLI module for Volcano
//!
//! Provides commands:
//! - `serve`: Start the HTTP server
//! - `execute`: Run one request in-process and print the response
//! - `start`: Start a workflow by type
//! - `validate`: Check a directory of definitions without serving it

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod execute;
pub mod start;
pub mod validate;

/// Volcano CLI
#[derive(Parser, Debug)]
#[command(name = "volcano")]
#[command(about = "Dual-path request engine: fast tools or durable workflows")]
#[command(version)]
pub struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server
    Serve,
    /// Process a request and print the response
    Execute {
        /// Request text, e.g. "calculate 42 + 58"
        text: String,
        /// Tenant id
        #[arg(long)]
        tenant: Option<String>,
        /// Session id
        #[arg(long)]
        session: Option<String>,
        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },
    /// Start a workflow by type
    Start {
        /// Workflow type, e.g. DataPipelineWorkflow
        workflow_type: String,
        /// Tenant id
        #[arg(long)]
        tenant: Option<String>,
        /// Workflow parameters as JSON
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// Validate a directory of definitions
    Validate {
        /// Directory containing tools/, workflows/ and config/
        dir: PathBuf,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Serve) => crate::server::run().await,
        Some(Commands::Execute {
            text,
            tenant,
            session,
            json,
        }) => execute::run(text, tenant, session, json).await,
        Some(Commands::Start {
            workflow_type,
            tenant,
            params,
        }) => start::run(workflow_type, tenant, params).await,
        Some(Commands::Validate { dir }) => validate::run(dir).await,
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_execute() {
        let cli = Cli::parse_from([
            "volcano",
            "execute",
            "calculate 1 + 2",
            "--tenant",
            "acme",
            "--json",
        ]);
        match cli.command {
            Some(Commands::Execute {
                text, tenant, json, ..
            }) => {
                assert_eq!(text, "calculate 1 + 2");
                assert_eq!(tenant.as_deref(), Some("acme"));
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_json_logs_flag() {
        let cli = Cli::parse_from(["volcano", "serve", "--json-logs"]);
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Some(Commands::Serve)));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        <Cli as clap::CommandFactory>::command().debug_assert();
    }
}
