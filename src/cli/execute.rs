//! `volcano execute` - process one request in-process

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use volcano_core::{Request, Response};

use crate::server::{build_state, load_config};

pub async fn run(
    text: String,
    tenant: Option<String>,
    session: Option<String>,
    json: bool,
) -> Result<()> {
    let config = load_config()?;
    let state = build_state(&config).await?;

    let mut request = Request::new(text);
    if let Some(tenant) = tenant {
        request = request.with_tenant(tenant);
    }
    if let Some(session) = session {
        request = request.with_session(session);
    }

    // Ctrl+C cancels the request instead of killing the process mid-start
    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let response = state.engine.process(request, &token).await;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&response).context("Failed to serialize response")?
        );
    } else {
        print!("{}", render(&response));
    }

    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}

fn render(response: &Response) -> String {
    if !response.success {
        let mut output = format!(
            "❌ {} [{}]\n",
            response.error.as_deref().unwrap_or("Request failed"),
            response
                .error_kind
                .map(|k| k.as_str())
                .unwrap_or("internal")
        );
        if let Some(suggestion) = &response.suggestion {
            output.push_str(&format!("💡 {suggestion}\n"));
        }
        return output;
    }

    match (&response.result, &response.workflow_id) {
        (Some(result), _) => format!("{result}\n"),
        (None, Some(workflow_id)) => format!(
            "Started workflow {} (run {}) for domain '{}'\n",
            workflow_id,
            response.run_id.as_deref().unwrap_or("-"),
            response.domain
        ),
        (None, None) => "Done\n".to_string(),
    }
}
