//! Cluster configuration directory: the source of truth for which servers
//! exist, which tables they hold, and a change-notification mechanism for
//! callers that need to react to cluster topology changes.
//!
//! A production deployment backs this with whatever service discovery /
//! coordination system the cluster uses; this crate only defines the
//! interface it needs from it.

use crate::keyspace::KeyspaceType;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterConfig {
    pub cluster_name: String,
    pub replication_factor: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub server_id: String,
    pub addr: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceConfig {
    pub namespace: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableConfig {
    pub namespace: String,
    pub table_name: String,
    pub keyspace_type: KeyspaceType,
}

pub type ClusterConfigCallback = Box<dyn Fn(&ClusterConfig) + Send + Sync>;
pub type ServerConfigCallback = Box<dyn Fn(&ServerConfig) + Send + Sync>;
pub type NamespaceConfigCallback = Box<dyn Fn(&NamespaceConfig) + Send + Sync>;
pub type TableConfigCallback = Box<dyn Fn(&TableConfig) + Send + Sync>;

pub trait ConfigDirectory: Send + Sync {
    fn local_server_id(&self) -> String;
    fn cluster_config(&self) -> ClusterConfig;
    fn list_servers(&self) -> Vec<ServerConfig>;
    fn table_config(&self, namespace: &str, table_name: &str) -> Option<TableConfig>;

    fn on_cluster_change(&self, callback: ClusterConfigCallback);
    fn on_server_change(&self, callback: ServerConfigCallback);
    fn on_namespace_change(&self, callback: NamespaceConfigCallback);
    fn on_table_change(&self, callback: TableConfigCallback);
}

/// Test double for [`ConfigDirectory`]. Not `#[cfg(test)]`: integration tests
/// under `tests/` link against the normal (non-test) build of this crate.
pub mod test_support {
    use std::sync::Mutex;

    use super::*;

    /// Fixed-contents `ConfigDirectory` double: returns the values it was
    /// constructed with and drops any registered callback without calling it,
    /// since the fixtures it backs never mutate cluster state mid-test.
    pub struct StaticConfigDirectory {
        pub local_server_id: String,
        pub cluster_config: ClusterConfig,
        pub servers: Vec<ServerConfig>,
        pub tables: Mutex<Vec<TableConfig>>,
    }

    impl ConfigDirectory for StaticConfigDirectory {
        fn local_server_id(&self) -> String {
            self.local_server_id.clone()
        }

        fn cluster_config(&self) -> ClusterConfig {
            self.cluster_config.clone()
        }

        fn list_servers(&self) -> Vec<ServerConfig> {
            self.servers.clone()
        }

        fn table_config(&self, namespace: &str, table_name: &str) -> Option<TableConfig> {
            self.tables
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.namespace == namespace && t.table_name == table_name)
                .cloned()
        }

        fn on_cluster_change(&self, _callback: ClusterConfigCallback) {}
        fn on_server_change(&self, _callback: ServerConfigCallback) {}
        fn on_namespace_change(&self, _callback: NamespaceConfigCallback) {}
        fn on_table_change(&self, _callback: TableConfigCallback) {}
    }

    #[test]
    fn static_config_directory_looks_up_known_table() {
        let dir = StaticConfigDirectory {
            local_server_id: "host-a".into(),
            cluster_config: ClusterConfig { cluster_name: "test".into(), replication_factor: 2 },
            servers: vec![ServerConfig { server_id: "host-a".into(), addr: "127.0.0.1:1".into() }],
            tables: Mutex::new(vec![TableConfig {
                namespace: "ns".into(),
                table_name: "events".into(),
                keyspace_type: KeyspaceType::String,
            }]),
        };
        assert!(dir.table_config("ns", "events").is_some());
        assert!(dir.table_config("ns", "missing").is_none());
    }
}
