//! Install command - pre-cache the manifest

use crate::cli::commands::Harness;
use crate::config::Config;
use crate::error::SwcacheResult;
use crate::runtime::DetachedScope;
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the install command
pub async fn execute(config: &Config) -> SwcacheResult<()> {
    let ctx = UiContext::detect();
    let harness = Harness::new(config).await?;
    let agent = &harness.agent;

    ui::intro(&ctx, &format!("Installing {}", agent.cache_name()));

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!(
        "Caching {} resources from {}",
        agent.settings().manifest.len(),
        agent.settings().scope
    ));

    let report = match agent.install(&DetachedScope).await {
        Ok(report) => report,
        Err(e) => {
            spinner.stop_error("Install failed");
            return Err(e);
        }
    };

    match report.precache_error {
        None => {
            spinner.stop(&format!("Cached {} resources", report.cached));
            ui::outro_success(&ctx, &format!("{} installed", report.cache));
        }
        Some(reason) => {
            spinner.stop_warn("Precache incomplete");
            ui::step_warn_hint(
                &ctx,
                &reason,
                "install continued because agent.fail_on_cache_miss is false",
            );
            ui::outro_warn(&ctx, &format!("{} installed without cached resources", report.cache));
        }
    }

    Ok(())
}
