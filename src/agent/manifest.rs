//! Precache manifest

use crate::config::schema::ManifestConfig;
use crate::error::SwcacheResult;
use crate::network::resolve_url;
use std::collections::HashSet;
use url::Url;

/// Resources fetched and stored at install
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    resources: Vec<String>,
}

impl Manifest {
    pub fn new<I, S>(resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resources: resources.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &ManifestConfig) -> Self {
        Self::new(config.resources.iter().cloned())
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Absolute URLs for every entry, in manifest order.
    ///
    /// Entries that resolve to the same URL (`/` and `./` under a root
    /// scope) are fetched once; the first occurrence wins.
    pub fn resolve(&self, scope: &Url) -> SwcacheResult<Vec<Url>> {
        let mut seen = HashSet::new();
        let mut urls = Vec::with_capacity(self.resources.len());

        for entry in &self.resources {
            let url = resolve_url(scope, entry)?;
            if seen.insert(url.as_str().to_string()) {
                urls.push(url);
            }
        }

        Ok(urls)
    }
}
