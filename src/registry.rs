use crate::connection::{Connection, ConnectionOptions};
use crate::types::ConnectionConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Owner of all processor connections, keyed by credential tuple.
///
/// The registry guarantees exactly one physical connection per distinct
/// (host, port, username, password) regardless of how many shades
/// reference it. The application root owns the registry and passes it by
/// reference to wherever controllers are built; there is no process-wide
/// global.
pub struct ConnectionRegistry {
    options: ConnectionOptions,
    connections: Mutex<HashMap<ConnectionConfig, Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Create a registry with default connection options
    pub fn new() -> Self {
        Self::with_options(ConnectionOptions::default())
    }

    /// Create a registry whose connections use the given options
    pub fn with_options(options: ConnectionOptions) -> Self {
        Self {
            options,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Get the connection for a credential tuple, opening it on first use.
    ///
    /// Connections live for the registry's lifetime; they are never
    /// explicitly closed, only reconnected.
    pub fn connection(&self, config: &ConnectionConfig) -> Arc<Connection> {
        let mut connections = self.connections.lock().unwrap();
        connections
            .entry(config.clone())
            .or_insert_with(|| {
                tracing::info!(host = %config.host, username = %config.username, "opening connection");
                Arc::new(Connection::open(config.clone(), self.options.clone()))
            })
            .clone()
    }

    /// Number of distinct connections opened so far
    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
