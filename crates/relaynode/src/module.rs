//! The composed relay node: host, histories, router and connection.

use std::sync::Arc;

use parking_lot::Mutex;
use relay_proto::{ChatRecord, Frame, SearchHit};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::connection::{ClientIdentity, ConnectionConfig, ConnectionManager, RelayLink};
use crate::host::{Host, HostChatMessage, HostInfo, HostResult};
use crate::router::ActionRouter;
use crate::routes::{self, Services, search::MAX_RESULTS};

/// Identity details shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Id assigned by the relay, if connected at least once.
    pub client_id: Option<String>,
    /// World identifier.
    pub world_id: String,
    /// World title.
    pub world_title: String,
    /// Host application version.
    pub host_version: String,
    /// Game system identifier.
    pub system_id: String,
    /// Game system title.
    pub system_title: String,
    /// Game system version.
    pub system_version: String,
    /// Operator-chosen display name.
    pub custom_name: String,
}

/// Wires the host, the histories, the router and the connection manager
/// together and owns their lifecycle.
pub struct RelayModule {
    services: Services,
    manager: ConnectionManager,
    info: HostInfo,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl RelayModule {
    /// Build a node from configuration and a host.
    #[must_use]
    pub fn new(config: &RelayConfig, host: Arc<dyn Host>) -> Self {
        let services = Services::new(
            host,
            config.max_rolls_stored,
            config.max_chat_messages_stored,
        );
        Self::with_services(config.connection(), services)
    }

    /// Build a node around existing services with every route set mounted.
    #[must_use]
    pub fn with_services(mut connection: ConnectionConfig, services: Services) -> Self {
        let info = services.host.info();
        connection.identity = ClientIdentity {
            world_id: info.world_id.clone(),
            world_title: info.world_title.clone(),
            system_id: info.system_id.clone(),
            system_version: info.system_version.clone(),
            host_version: info.host_version.clone(),
        };

        let mut router = ActionRouter::new();
        for set in routes::all(&services) {
            router.mount(set);
        }
        debug!(actions = ?router.actions(), "router ready");

        Self {
            manager: ConnectionManager::new(connection, Arc::new(router)),
            services,
            info,
            forwarder: Mutex::new(None),
        }
    }

    /// Populate the histories, start forwarding host chat events and
    /// start the connection. Returns `false` if the connection was already
    /// running.
    pub fn start(&self) -> bool {
        {
            let mut forwarder = self.forwarder.lock();
            if forwarder.is_none() {
                let events = self.services.host.subscribe();
                let rolls = self.services.refresh_rolls();
                let messages = self.services.refresh_chat();
                info!(rolls, messages, "histories populated from chat log");
                *forwarder = Some(tokio::spawn(forward_host_events(
                    self.services.clone(),
                    self.manager.link(),
                    events,
                )));
            }
        }
        self.manager.start()
    }

    /// Stop forwarding and close the connection.
    pub async fn stop(&self) {
        if let Some(forwarder) = self.forwarder.lock().take() {
            forwarder.abort();
        }
        self.manager.stop().await;
    }

    /// The connection manager.
    #[must_use]
    pub const fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// The shared handler services.
    #[must_use]
    pub const fn services(&self) -> &Services {
        &self.services
    }

    /// Handle onto the connection.
    #[must_use]
    pub fn link(&self) -> RelayLink {
        self.manager.link()
    }

    /// Search the host index with the same limit the `search` route uses.
    ///
    /// # Errors
    ///
    /// Returns the host's error.
    pub async fn search(&self, query: &str, filter: Option<&str>) -> HostResult<Vec<SearchHit>> {
        self.services.host.search(query, filter, MAX_RESULTS).await
    }

    /// Fetch a document, `None` (logged) if it can't be read.
    pub async fn get_by_uuid(&self, uuid: &str) -> Option<Value> {
        match self.services.host.get_entity(uuid).await {
            Ok(document) => Some(document),
            Err(e) => {
                error!(uuid, error = %e, "failed to get entity");
                None
            }
        }
    }

    /// Up to `limit` recent chat messages, newest first.
    #[must_use]
    pub fn chat_messages(&self, limit: usize) -> Vec<ChatRecord> {
        self.services.chat.recent(limit)
    }

    /// Identity details for display.
    #[must_use]
    pub fn client_info(&self) -> ClientInfo {
        let connection = self.manager.config();
        ClientInfo {
            client_id: self.manager.client_id(),
            world_id: self.info.world_id.clone(),
            world_title: self.info.world_title.clone(),
            host_version: self.info.host_version.clone(),
            system_id: self.info.system_id.clone(),
            system_title: self.info.system_title.clone(),
            system_version: self.info.system_version.clone(),
            custom_name: connection.client_name.clone(),
        }
    }
}

impl std::fmt::Debug for RelayModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayModule")
            .field("manager", &self.manager)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

/// Record one host chat message in the right history; rolls are also
/// pushed to the relay as `roll-data` while connected.
pub fn record_host_message(services: &Services, link: &RelayLink, message: &HostChatMessage) {
    let Some(roll) = message.to_roll_record() else {
        debug!(id = %message.id, user = %message.user.display_name(), "chat message collected");
        services.chat.record(message.to_chat_record());
        return;
    };

    info!(id = %roll.id, formula = %roll.formula, total = roll.roll_total, "roll collected");
    services.rolls.record(roll.clone());
    if link.is_connected() {
        // Failure is already logged by the link.
        let _ = link.send(Frame::new("roll-data").with("data", roll));
    }
}

async fn forward_host_events(
    services: Services,
    link: RelayLink,
    mut events: tokio::sync::broadcast::Receiver<HostChatMessage>,
) {
    loop {
        match events.recv().await {
            Ok(message) => record_host_message(&services, &link, &message),
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "host chat events dropped, refreshing histories");
                services.refresh_rolls();
                services.refresh_chat();
            }
            Err(RecvError::Closed) => {
                debug!("host chat event stream closed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::connection::ConnectionState;
    use crate::host::{MemoryHost, NewChatMessage, RollOutcome};

    fn host() -> Arc<MemoryHost> {
        let seed = serde_json::from_value(json!({
            "world": {"worldId": "w1", "worldTitle": "Night Below", "systemId": "dnd5e",
                      "systemTitle": "D&D 5e", "systemVersion": "3.0.0", "hostVersion": "12.331"},
            "documents": [{"uuid": "Actor.a1", "documentType": "Actor", "name": "Goblin"}],
            "chat": [
                {"id": "c1", "content": "hello", "timestamp": 1},
                {"id": "r1", "content": "12", "timestamp": 2,
                 "roll": {"formula": "1d20", "total": 12, "isCritical": false, "isFumble": false, "dice": []}}
            ]
        }))
        .unwrap();
        Arc::new(MemoryHost::from_seed(seed).unwrap())
    }

    fn config() -> RelayConfig {
        RelayConfig {
            relay_url: "ws://127.0.0.1:1".to_string(),
            api_key: "k".to_string(),
            custom_name: "Table A".to_string(),
            reconnect_max_attempts: 0,
            ..RelayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_start_populates_histories() {
        let module = RelayModule::new(&config(), host());
        module.start();
        assert_eq!(module.chat_messages(10).len(), 1);
        assert_eq!(module.services().rolls.latest().unwrap().id, "r1");
        module.stop().await;
        assert_eq!(module.manager().state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_host_events_reach_histories() {
        let host = host();
        let module = RelayModule::new(&config(), Arc::clone(&host) as Arc<dyn Host>);
        module.start();

        host.create_chat_message(NewChatMessage {
            content: "later".to_string(),
            message_type: "ic".to_string(),
            ..NewChatMessage::default()
        })
        .await
        .unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while module.chat_messages(10).len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(module.chat_messages(1)[0].content, "later");
        module.stop().await;
    }

    #[test]
    fn test_roll_message_pushed_when_connected() {
        let services = Services::new(host(), 20, 100);
        let (link, mut rx) = RelayLink::loopback();
        let message = HostChatMessage {
            id: "r9".to_string(),
            user: relay_proto::UserRef::new("u1", "Gamemaster"),
            content: "20".to_string(),
            flavor: String::new(),
            message_type: Some("roll".to_string()),
            timestamp: 5,
            speaker: None,
            whisper: vec![],
            blind: false,
            roll: Some(RollOutcome {
                formula: "1d20".to_string(),
                total: 20,
                is_critical: true,
                is_fumble: false,
                dice: vec![],
            }),
        };

        record_host_message(&services, &link, &message);
        record_host_message(&services, &link, &message);

        assert_eq!(services.rolls.len(), 1);
        let pushed = rx.try_recv().unwrap();
        assert_eq!(pushed.kind, "roll-data");
        assert!(pushed.request_id.is_none());
        assert_eq!(pushed.get("data").unwrap()["rollTotal"], json!(20));
    }

    #[test]
    fn test_roll_message_not_pushed_when_disconnected() {
        let services = Services::new(host(), 20, 100);
        let link = RelayLink::disconnected();
        let message = HostChatMessage {
            id: "r10".to_string(),
            user: relay_proto::UserRef::default(),
            content: "3".to_string(),
            flavor: String::new(),
            message_type: None,
            timestamp: 6,
            speaker: None,
            whisper: vec![],
            blind: false,
            roll: Some(RollOutcome {
                formula: "1d4".to_string(),
                total: 3,
                is_critical: false,
                is_fumble: false,
                dice: vec![],
            }),
        };
        record_host_message(&services, &link, &message);
        assert_eq!(services.rolls.latest().unwrap().id, "r10");
    }

    #[tokio::test]
    async fn test_api_surface() {
        let module = RelayModule::new(&config(), host());
        assert_eq!(module.search("gob", None).await.unwrap().len(), 1);
        assert!(module.get_by_uuid("Actor.a1").await.is_some());
        assert!(module.get_by_uuid("Actor.zz").await.is_none());

        let info = module.client_info();
        assert_eq!(info.world_title, "Night Below");
        assert_eq!(info.custom_name, "Table A");
        assert!(info.client_id.is_none());
        assert_eq!(module.manager().config().identity.system_id, "dnd5e");
    }
}
