//! Shared per-client reconciler state (§5 concurrency model): a plain
//! `Mutex<HashMap<..>>` of per-client `Mutex`-wrapped `ReportingClient`s,
//! matching the nested-lock shape of the teacher's `local_fanout::REGISTRY`
//! rather than a sharded-map crate the dependency set doesn't carry.

use std::collections::HashMap;
use std::sync::Arc;

use alarm_core::ReportingClient;
use alarm_host::config::ServerConfig;
use tokio::sync::Mutex;

pub struct ClientRegistry {
    clients: Mutex<HashMap<String, Arc<Mutex<ReportingClient>>>>,
}

impl ClientRegistry {
    /// Build the registry from `[[server.reporters]]`. Unlisted client ids
    /// are never auto-created; a datagram from one is an auth failure.
    pub fn from_config(config: &ServerConfig) -> ClientRegistry {
        let mut clients = HashMap::with_capacity(config.reporters.len());
        for reporter in &config.reporters {
            clients.insert(
                reporter.client_id.clone(),
                Arc::new(Mutex::new(ReportingClient::new(
                    reporter.client_id.clone(),
                    reporter.pin.clone(),
                ))),
            );
        }
        ClientRegistry {
            clients: Mutex::new(clients),
        }
    }

    pub async fn get(&self, client_id: &str) -> Option<Arc<Mutex<ReportingClient>>> {
        self.clients.lock().await.get(client_id).cloned()
    }

    pub async fn all(&self) -> Vec<Arc<Mutex<ReportingClient>>> {
        self.clients.lock().await.values().cloned().collect()
    }
}
