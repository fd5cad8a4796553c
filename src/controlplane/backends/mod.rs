//! Cluster Backend Adapters
//!
//! Provides adapters for the cluster port:
//! - Aerospike: the Aerospike client against a running cluster
//! - Memory: an in-process cluster for tests and dry runs

pub mod aerospike;
pub mod memory;

pub use self::aerospike::AerospikeClient;
pub use self::memory::{ClusterCall, MemoryCluster};

use crate::config::ProviderConfig;
use crate::domain::ports::ClusterClientRef;
use crate::error::{Error, Result};
use std::sync::Arc;

/// Factory for cluster backend adapters
pub struct BackendFactory;

impl BackendFactory {
    /// Create a backend adapter by name
    pub async fn create(name: &str, config: &ProviderConfig) -> Result<ClusterClientRef> {
        match name.to_lowercase().as_str() {
            "aerospike" | "cluster" => {
                let settings = config.resolve()?;
                Ok(Arc::new(AerospikeClient::connect(settings).await?))
            }
            "memory" | "in-memory" => Ok(Arc::new(MemoryCluster::new())),
            _ => Err(Error::Configuration(format!("unknown backend '{}'", name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::ClusterClient;

    #[tokio::test]
    async fn test_factory_memory_backend() {
        let client = BackendFactory::create("memory", &ProviderConfig::default())
            .await
            .unwrap();
        assert_eq!(client.endpoint(), "memory");
        assert!(BackendFactory::create("etcd", &ProviderConfig::default())
            .await
            .is_err());
    }
}
