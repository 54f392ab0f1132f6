//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager, LOCAL_CONFIG_NAME};
use crate::error::{SwcacheError, SwcacheResult};
use crate::ui::{self, UiContext};
use std::path::PathBuf;
use tokio::fs;

const VALID_KEYS: &[&str] = &[
    "general.log_format",
    "general.event_log",
    "agent.app_name",
    "agent.version",
    "agent.scope",
    "agent.fail_on_cache_miss",
    "manifest.resources",
    "network.timeout_secs",
    "network.user_agent",
    "network.max_body_bytes",
    "storage.dir",
];

/// Execute the config command
pub async fn execute(
    args: ConfigArgs,
    config: &Config,
    manager: &ConfigManager,
) -> SwcacheResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value, local }) => {
            if local {
                set_local_value(&key, &value).await?
            } else {
                set_value(manager, config, &key, &value).await?
            }
        }
    }

    Ok(())
}

fn show_config(config: &Config) -> SwcacheResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> SwcacheResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok_detail(&ctx, "Configuration initialized", &path.display().to_string());

    Ok(())
}

async fn set_value(
    manager: &ConfigManager,
    config: &Config,
    key: &str,
    value: &str,
) -> SwcacheResult<()> {
    let ctx = UiContext::detect();
    let mut config = config.clone();

    let parts: Vec<&str> = key.split('.').collect();
    match parts.as_slice() {
        ["general", "log_format"] => config.general.log_format = value.to_string(),
        ["general", "event_log"] => config.general.event_log = parse_bool(value)?,

        ["agent", "app_name"] => config.agent.app_name = value.to_string(),
        ["agent", "version"] => config.agent.version = value.to_string(),
        ["agent", "scope"] => config.agent.scope = value.to_string(),
        ["agent", "fail_on_cache_miss"] => config.agent.fail_on_cache_miss = parse_bool(value)?,

        ["manifest", "resources"] => config.manifest.resources = parse_list(value),

        ["network", "timeout_secs"] => config.network.timeout_secs = parse_u64(value)?,
        ["network", "user_agent"] => config.network.user_agent = value.to_string(),
        ["network", "max_body_bytes"] => config.network.max_body_bytes = parse_u64(value)?,

        ["storage", "dir"] => config.storage.dir = Some(PathBuf::from(value)),

        _ => {
            ui::step_error_detail(&ctx, "Unknown config key", key);
            ui::remark(&ctx, "Valid keys:");
            print_valid_keys();
            return Ok(());
        }
    }

    config.validate().map_err(SwcacheError::User)?;
    manager.save(&config).await?;
    ui::step_ok(&ctx, &format!("Set {} = {}", key, value));

    Ok(())
}

async fn set_local_value(key: &str, value: &str) -> SwcacheResult<()> {
    let ctx = UiContext::detect();

    let cwd =
        std::env::current_dir().map_err(|e| SwcacheError::io("getting current directory", e))?;
    let local_path = cwd.join(LOCAL_CONFIG_NAME);

    if !VALID_KEYS.contains(&key) {
        return Err(SwcacheError::User(format!("Unknown config key: {}", key)));
    }

    let mut doc: toml::Value = if local_path.exists() {
        let content = fs::read_to_string(&local_path)
            .await
            .map_err(|e| SwcacheError::io(format!("reading {}", local_path.display()), e))?;
        toml::from_str(&content).map_err(|e| SwcacheError::ConfigInvalid {
            path: local_path.clone(),
            reason: e.to_string(),
        })?
    } else {
        toml::Value::Table(toml::map::Map::new())
    };

    set_toml_value(&mut doc, key, value)?;

    // Only the keys set explicitly are written back
    let content = toml::to_string_pretty(&doc)?;
    fs::write(&local_path, content)
        .await
        .map_err(|e| SwcacheError::io(format!("writing {}", local_path.display()), e))?;

    ui::step_ok(
        &ctx,
        &format!("Set {} = {} in {}", key, value, local_path.display()),
    );

    Ok(())
}

/// Set a dot-separated key in a TOML tree, creating intermediate tables
fn set_toml_value(doc: &mut toml::Value, key: &str, value: &str) -> SwcacheResult<()> {
    let parts: Vec<&str> = key.split('.').collect();
    let Some((leaf, parents)) = parts.split_last() else {
        return Err(SwcacheError::User("Empty config key".to_string()));
    };

    let mut current = doc;
    for &part in parents {
        current = current
            .as_table_mut()
            .ok_or_else(|| SwcacheError::User(format!("Expected table at key: {}", part)))?
            .entry(part)
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }

    let table = current
        .as_table_mut()
        .ok_or_else(|| SwcacheError::User(format!("Expected table for key: {}", key)))?;

    let toml_value = if key == "manifest.resources" {
        toml::Value::Array(
            parse_list(value)
                .into_iter()
                .map(toml::Value::String)
                .collect(),
        )
    } else if value == "true" || value == "false" {
        toml::Value::Boolean(value == "true")
    } else if let Ok(n) = value.parse::<i64>() {
        toml::Value::Integer(n)
    } else {
        toml::Value::String(value.to_string())
    };

    table.insert((*leaf).to_string(), toml_value);
    Ok(())
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(value: &str) -> SwcacheResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(SwcacheError::User(format!(
            "Invalid boolean value: {}. Use true/false",
            value
        ))),
    }
}

fn parse_u64(value: &str) -> SwcacheResult<u64> {
    value
        .parse()
        .map_err(|_| SwcacheError::User(format!("Invalid number: {}", value)))
}

fn print_valid_keys() {
    for key in VALID_KEYS {
        eprintln!("  {}", key);
    }
}
