//! `volcano start` - start a workflow by type

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use volcano_core::format_error_for_cli;

use crate::server::{build_state, load_config};

pub async fn run(workflow_type: String, tenant: Option<String>, params: String) -> Result<()> {
    let params: serde_json::Value =
        serde_json::from_str(&params).context("--params must be valid JSON")?;

    let config = load_config()?;
    let state = build_state(&config).await?;

    match state
        .engine
        .execute_workflow(
            &workflow_type,
            tenant.as_deref(),
            params,
            &CancellationToken::new(),
        )
        .await
    {
        Ok(handle) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&handle).context("Failed to serialize handle")?
            );
            Ok(())
        }
        Err(e) => {
            eprint!("{}", format_error_for_cli(&e));
            std::process::exit(1);
        }
    }
}
