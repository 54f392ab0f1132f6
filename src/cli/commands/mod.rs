//! CLI command implementations

pub mod activate;
pub mod buckets;
pub mod config;
pub mod deploy;
pub mod fetch;
pub mod install;

pub use activate::execute as activate;
pub use buckets::execute as buckets;
pub use config::execute as config;
pub use deploy::execute as deploy;
pub use fetch::execute as fetch;
pub use install::execute as install;

use crate::agent::{AgentSettings, CacheAgent};
use crate::cache::DiskCacheStorage;
use crate::config::{Config, ConfigManager};
use crate::event_log::EventLog;
use crate::error::SwcacheResult;
use crate::network::NetworkFetcher;
use std::sync::Arc;
use tracing::debug;

/// Agent wired to the disk store and the real network
pub(crate) struct Harness {
    pub storage: Arc<DiskCacheStorage>,
    pub network: Arc<NetworkFetcher>,
    pub agent: Arc<CacheAgent>,
}

impl Harness {
    pub async fn new(config: &Config) -> SwcacheResult<Self> {
        let storage_dir = ConfigManager::storage_dir(config);
        debug!("Using bucket store {}", storage_dir.display());

        let storage = Arc::new(DiskCacheStorage::new(&storage_dir).await?);
        let network = Arc::new(NetworkFetcher::new(&config.network));
        let settings = AgentSettings::from_config(&config.agent, &config.manifest)?;

        let agent = CacheAgent::new(settings, storage.clone(), network.clone())
            .with_observer(Arc::new(EventLog::new(config, &storage_dir)));

        Ok(Self {
            storage,
            network,
            agent: Arc::new(agent),
        })
    }
}
