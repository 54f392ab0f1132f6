//! Activate command - clear buckets from other versions

use crate::cli::commands::Harness;
use crate::config::Config;
use crate::error::SwcacheResult;
use crate::runtime::DetachedScope;
use crate::ui::{self, UiContext};

/// Execute the activate command
pub async fn execute(config: &Config) -> SwcacheResult<()> {
    let ctx = UiContext::detect();
    let harness = Harness::new(config).await?;

    ui::intro(&ctx, &format!("Activating {}", harness.agent.cache_name()));
    let report = harness.agent.activate(&DetachedScope).await?;

    if report.deleted.is_empty() && report.failed.is_empty() {
        ui::step_info(&ctx, "No old buckets to clear");
    }
    for name in &report.deleted {
        ui::step_ok(&ctx, &format!("Cleared old cache {}", name));
    }
    for name in &report.failed {
        ui::step_error_detail(&ctx, "Could not clear", name);
    }

    if report.failed.is_empty() {
        ui::outro_success(&ctx, &format!("{} active", report.cache));
    } else {
        ui::outro_warn(
            &ctx,
            &format!("{} active, {} old bucket(s) remain", report.cache, report.failed.len()),
        );
    }

    Ok(())
}
