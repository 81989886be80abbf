//! Node bootstrap: storage, service and bus wiring.
//!
//! Everything the guild service depends on is assembled here and
//! injected through its constructor; nothing reaches for globals. The
//! embedding game server calls [`GuildNode::bootstrap`] with its own
//! collaborator implementations and then forwards player connect and
//! disconnect events to the service.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use guild_service::{
    BattleHost, BusPublisher, Collaborators, Economy, GuildService, InventoryVault, NullBus,
    PlayerDirectory,
};
use guild_store::GuildStore;
use tokio::task::JoinHandle;
use tracing::info;

use crate::bus::BusEndpoint;
use crate::config::Config;

/// The host-side collaborator set. The bus half of [`Collaborators`] is
/// wired during bootstrap, depending on whether the cluster is enabled.
pub struct HostServices {
    pub economy: Arc<dyn Economy>,
    pub directory: Arc<dyn PlayerDirectory>,
    pub vault: Arc<dyn InventoryVault>,
    pub host: Arc<dyn BattleHost>,
}

/// A running node: the guild service plus its background bus task.
pub struct GuildNode {
    service: Arc<GuildService>,
    bus_task: Option<JoinHandle<()>>,
}

impl GuildNode {
    /// Opens the store, wires the bus and constructs the service.
    ///
    /// The store open happens on the blocking pool; SQLite may need to
    /// create the file and run schema migrations.
    pub async fn bootstrap(config: Config, services: HostServices) -> Result<GuildNode> {
        let path = PathBuf::from(&config.storage.path);
        let store = tokio::task::spawn_blocking(move || GuildStore::open(&path))
            .await
            .map_err(|e| anyhow::anyhow!("storage worker failed: {e}"))??;
        info!(path = %config.storage.path, "guild store open");

        let endpoint = if config.cluster.enabled {
            Some(BusEndpoint::new(config.node.id.as_str(), &config.cluster))
        } else {
            info!("cluster bus disabled; running standalone");
            None
        };

        let bus: Arc<dyn BusPublisher> = match &endpoint {
            Some(endpoint) => endpoint.clone(),
            None => Arc::new(NullBus),
        };

        let service = GuildService::new(
            config.node.id.as_str(),
            config.guilds.clone(),
            Arc::new(store),
            Collaborators {
                economy: services.economy,
                directory: services.directory,
                vault: services.vault,
                host: services.host,
                bus,
            },
        );

        let bus_task = endpoint.map(|endpoint| endpoint.start(service.clone()));

        Ok(GuildNode { service, bus_task })
    }

    /// The service the host forwards player events and commands to.
    pub fn service(&self) -> &Arc<GuildService> {
        &self.service
    }

    /// Stops the background bus task. Store work already handed to the
    /// blocking pool finishes on its own.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.bus_task.take() {
            task.abort();
        }
        info!("guild node stopped");
    }
}
