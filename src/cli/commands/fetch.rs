//! Fetch command - resolve one request through the interceptor

use crate::cli::args::FetchArgs;
use crate::cli::commands::Harness;
use crate::config::Config;
use crate::error::{SwcacheError, SwcacheResult};
use crate::network::{resolve_url, Fetcher, Request};
use crate::runtime::{FetchEvent, LifecycleHandler};
use crate::ui::{self, UiContext};
use futures_util::future::join_all;
use std::io::Write;
use std::sync::Arc;

/// Execute the fetch command
pub async fn execute(args: FetchArgs, config: &Config) -> SwcacheResult<()> {
    let ctx = UiContext::detect();
    let harness = Harness::new(config).await?;

    let url = resolve_url(&harness.agent.settings().scope, &args.url)?;
    let mut request = Request::new(args.method, url);
    if let Some(body) = args.body {
        request = request.with_body(body);
    }

    let (response, source) = if harness.agent.intercepts(&request) {
        let resolved = harness.agent.resolve(&request).await?;
        (resolved.response, resolved.source.to_string())
    } else {
        // Run the handler so the pass-through is observed, then do what a
        // host does with an unanswered event.
        let mut event = FetchEvent::new(request);
        Arc::clone(&harness.agent).on_fetch(&mut event);
        let (request, _, extensions) = event.into_parts();
        for result in join_all(extensions).await {
            result?;
        }
        (
            harness.network.fetch(&request).await?,
            "pass-through".to_string(),
        )
    };

    if args.output {
        let mut stdout = std::io::stdout();
        stdout
            .write_all(&response.body)
            .and_then(|_| stdout.flush())
            .map_err(|e| SwcacheError::io("writing response body", e))?;
        return Ok(());
    }

    ui::key_value(&ctx, "source", &source);
    ui::key_value(
        &ctx,
        "status",
        &format!("{} {}", response.status, response.status_text()),
    );
    ui::key_value(&ctx, "bytes", &response.body.len().to_string());
    if let Some(content_type) = response.headers.get("content-type") {
        ui::key_value(&ctx, "type", content_type);
    }

    Ok(())
}
