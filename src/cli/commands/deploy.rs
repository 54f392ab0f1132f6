//! Deploy command - run the full lifecycle through a registration

use crate::cache::CacheStorage;
use crate::cli::commands::Harness;
use crate::config::Config;
use crate::error::SwcacheResult;
use crate::runtime::Registration;
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the deploy command
pub async fn execute(config: &Config) -> SwcacheResult<()> {
    let ctx = UiContext::detect();
    let harness = Harness::new(config).await?;
    let cache = harness.agent.cache_name().to_string();

    ui::intro(&ctx, &format!("Deploying {}", cache));

    let registration = Registration::new(
        harness.agent.settings().scope.clone(),
        harness.network.clone(),
    );

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Installing and activating");
    let worker = match registration.register(harness.agent.clone()).await {
        Ok(worker) => worker,
        Err(e) => {
            spinner.stop_error("Deploy failed");
            return Err(e);
        }
    };
    spinner.stop("Lifecycle complete");

    let phase = registration
        .phase(worker)
        .map(|p| p.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    ui::key_value(&ctx, "worker", &worker.to_string());
    ui::key_value(&ctx, "phase", &phase);
    ui::key_value(&ctx, "scope", registration.scope().as_str());

    let buckets = harness.storage.keys().await?;
    ui::key_value(&ctx, "buckets", &buckets.join(", "));

    if buckets.iter().any(|b| *b != cache) {
        ui::remark(&ctx, "Old buckets remain; run `swcache activate -v` for details");
    }
    ui::outro_success(&ctx, &format!("{} deployed", cache));

    Ok(())
}
