use std::collections::{BTreeMap, HashMap};

use config::shared::ClusterConfig;
use tracing::{debug, info};

use crate::bail;
use crate::destination::SearchIndex;
use crate::error::{ErrorKind, EtlResult};

/// Search cluster clients of one run, created on first use and keyed by cluster name.
///
/// The registry is owned by the run that created it; dropping it releases every client.
pub struct SearchClusterRegistry<'a, I, F> {
    clusters: &'a BTreeMap<String, ClusterConfig>,
    connect: F,
    clients: HashMap<String, I>,
}

impl<'a, I, F> SearchClusterRegistry<'a, I, F>
where
    I: SearchIndex,
    F: Fn(&str, &ClusterConfig) -> EtlResult<I>,
{
    pub fn new(clusters: &'a BTreeMap<String, ClusterConfig>, connect: F) -> Self {
        Self {
            clusters,
            connect,
            clients: HashMap::new(),
        }
    }

    /// Returns the client of cluster `name`, connecting it on first use.
    pub fn get(&mut self, name: &str) -> EtlResult<&I> {
        if !self.clients.contains_key(name) {
            let Some(config) = self.clusters.get(name) else {
                bail!(ErrorKind::ConfigError, "Search cluster is not configured", name);
            };

            debug!(cluster = name, url = %config.url, "connecting search cluster");
            let client = (self.connect)(name, config)?;
            self.clients.insert(name.to_string(), client);
        }

        match self.clients.get(name) {
            Some(client) => Ok(client),
            None => bail!(ErrorKind::InvalidState, "Search cluster client vanished", name),
        }
    }

    pub fn connected(&self) -> usize {
        self.clients.len()
    }

    /// Drops every client and returns how many were connected.
    pub fn release(mut self) -> usize {
        let released = self.clients.len();
        self.clients.clear();
        info!(released, "released search cluster clients");
        released
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::destination::memory::MemorySearchIndex;

    fn clusters() -> BTreeMap<String, ClusterConfig> {
        let mut clusters = BTreeMap::new();
        clusters.insert(
            "main".to_string(),
            ClusterConfig {
                url: "http://localhost:9200".to_string(),
                username: None,
                password: None,
                timeout_secs: 60,
            },
        );
        clusters
    }

    #[test]
    fn clients_are_created_once_per_cluster() {
        let clusters = clusters();
        let connects = Cell::new(0);
        let mut registry = SearchClusterRegistry::new(&clusters, |_: &str, _: &ClusterConfig| {
            connects.set(connects.get() + 1);
            Ok(MemorySearchIndex::new())
        });

        registry.get("main").unwrap();
        registry.get("main").unwrap();

        assert_eq!(connects.get(), 1);
        assert_eq!(registry.connected(), 1);
        assert_eq!(registry.release(), 1);
    }

    #[test]
    fn unknown_clusters_are_configuration_errors() {
        let clusters = clusters();
        let mut registry =
            SearchClusterRegistry::new(&clusters, |_: &str, _: &ClusterConfig| {
                Ok(MemorySearchIndex::new())
            });

        let err = registry.get("backup").err().unwrap();

        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert_eq!(registry.connected(), 0);
    }
}
