//! Buckets command - list cache buckets

use crate::cache::{format_bytes, BucketInfo, CacheStorage, DiskCacheStorage};
use crate::cli::args::{BucketsArgs, OutputFormat};
use crate::config::{Config, ConfigManager};
use crate::error::SwcacheResult;
use crate::ui::{self, UiContext};
use console::style;
use serde::Serialize;

#[derive(Serialize)]
struct BucketRow {
    #[serde(flatten)]
    info: BucketInfo,
    current: bool,
}

/// Execute the buckets command
pub async fn execute(args: BucketsArgs, config: &Config) -> SwcacheResult<()> {
    let storage = DiskCacheStorage::new(ConfigManager::storage_dir(config)).await?;
    let current = config.agent.cache_name();

    let mut rows = Vec::new();
    for name in storage.keys().await? {
        let info = storage.bucket_info(&name).await?;
        rows.push(BucketRow {
            current: info.name == current,
            info,
        });
    }

    if rows.is_empty() {
        match args.format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => {
                let ctx = UiContext::detect();
                ui::step_info(&ctx, "No cache buckets");
                ui::remark(&ctx, "Run `swcache install` to populate one");
            }
        }
        return Ok(());
    }

    match args.format {
        OutputFormat::Table => print_table(&rows),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Plain => {
            for row in &rows {
                println!("{}", row.info.name);
            }
        }
    }

    Ok(())
}

fn print_table(rows: &[BucketRow]) {
    println!(
        "{:<32} {:<8} {:<10} {:<17} {}",
        style("BUCKET").bold(),
        style("ENTRIES").bold(),
        style("SIZE").bold(),
        style("CREATED").bold(),
        style("STATE").bold()
    );
    println!("{}", "-".repeat(78));

    for row in rows {
        let state = if row.current {
            style("current").green()
        } else {
            style("stale").yellow()
        };
        println!(
            "{:<32} {:<8} {:<10} {:<17} {}",
            row.info.name,
            row.info.entries,
            format_bytes(row.info.size_bytes),
            row.info.created_at.format("%Y-%m-%d %H:%M"),
            state
        );
    }

    println!();
    println!("{} bucket(s)", rows.len());
}
