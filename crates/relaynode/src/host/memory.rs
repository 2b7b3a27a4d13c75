//! In-memory host.

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::{Mutex, RwLock};
use rand::SeedableRng;
use rand::rngs::StdRng;
use relay_proto::{SearchHit, UserRef, now_millis};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{
    Formula, Host, HostChatMessage, HostError, HostFuture, HostInfo, HostResult, NewChatMessage,
    RollOutcome,
};

const EVENT_CAPACITY: usize = 256;

/// Seed data for a [`MemoryHost`], usually read from a world file.
///
/// ```json
/// {
///   "world": {"worldId": "w1", "worldTitle": "Night Below", "systemId": "dnd5e"},
///   "user": {"id": "u1", "name": "Gamemaster"},
///   "documents": [{"uuid": "Actor.a1", "documentType": "Actor", "name": "Goblin"}],
///   "chat": []
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorldSeed {
    /// Host identity.
    pub world: HostInfo,
    /// The user messages are posted as.
    pub user: Option<UserRef>,
    /// Documents; each needs `uuid`, `documentType` and `name`.
    pub documents: Vec<Value>,
    /// Existing chat log, oldest first.
    pub chat: Vec<HostChatMessage>,
}

impl WorldSeed {
    /// Read a world file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> HostResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| HostError::Seed(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| HostError::Seed(format!("{}: {e}", path.display())))
    }
}

/// A host whose documents and chat log live in process memory.
pub struct MemoryHost {
    info: HostInfo,
    user: UserRef,
    documents: RwLock<BTreeMap<String, Value>>,
    chat: RwLock<Vec<HostChatMessage>>,
    events: broadcast::Sender<HostChatMessage>,
    rng: Mutex<StdRng>,
}

impl MemoryHost {
    /// An empty world.
    #[must_use]
    pub fn new(info: HostInfo) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            info,
            user: UserRef::new("relay", "Relay"),
            documents: RwLock::new(BTreeMap::new()),
            chat: RwLock::new(Vec::new()),
            events,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Build from seed data.
    ///
    /// # Errors
    ///
    /// Returns an error if a seeded document lacks `uuid`, `documentType`
    /// or `name`.
    pub fn from_seed(seed: WorldSeed) -> HostResult<Self> {
        let mut host = Self::new(seed.world);
        if let Some(user) = seed.user {
            host.user = user;
        }
        {
            let mut documents = host.documents.write();
            for document in seed.documents {
                let uuid = required_str(&document, "uuid")?.to_string();
                required_str(&document, "documentType")?;
                required_str(&document, "name")?;
                documents.insert(uuid, document);
            }
        }
        *host.chat.write() = seed.chat;
        info!(
            documents = host.documents.read().len(),
            messages = host.chat.read().len(),
            "world loaded"
        );
        Ok(host)
    }

    /// Fix the dice sequence.
    #[must_use]
    pub fn with_rng_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    /// Post messages as this user.
    #[must_use]
    pub fn with_user(mut self, user: UserRef) -> Self {
        self.user = user;
        self
    }

    /// Insert or replace a document directly.
    ///
    /// # Errors
    ///
    /// Returns an error if the document lacks a `uuid`.
    pub fn insert_document(&self, document: Value) -> HostResult<()> {
        let uuid = required_str(&document, "uuid")?.to_string();
        self.documents.write().insert(uuid, document);
        Ok(())
    }

    fn search_sync(&self, query: &str, filter: Option<&str>, limit: usize) -> Vec<SearchHit> {
        let needle = query.trim().to_lowercase();
        let documents = self.documents.read();
        let mut hits: Vec<(bool, SearchHit)> = documents
            .values()
            .filter_map(|doc| {
                let name = doc.get("name")?.as_str()?;
                let document_type = doc.get("documentType")?.as_str()?;
                if filter.is_some_and(|f| f != document_type) {
                    return None;
                }
                let lower = name.to_lowercase();
                if !lower.contains(&needle) {
                    return None;
                }
                let hit = SearchHit {
                    uuid: doc.get("uuid")?.as_str()?.to_string(),
                    name: name.to_string(),
                    document_type: document_type.to_string(),
                    img: doc.get("img").and_then(Value::as_str).map(str::to_string),
                    folder: doc.get("folder").and_then(Value::as_str).map(str::to_string),
                };
                Some((lower.starts_with(&needle), hit))
            })
            .collect();
        // Prefix matches first, then by name.
        hits.sort_by(|(a_prefix, a), (b_prefix, b)| {
            b_prefix.cmp(a_prefix).then_with(|| a.name.cmp(&b.name))
        });
        hits.into_iter().take(limit).map(|(_, hit)| hit).collect()
    }

    fn create_sync(
        &self,
        entity_type: &str,
        data: Value,
        folder: Option<&str>,
    ) -> HostResult<Value> {
        let Value::Object(mut fields) = data else {
            return Err(HostError::InvalidDocument("data must be an object".to_string()));
        };
        if !fields.get("name").is_some_and(Value::is_string) {
            return Err(HostError::InvalidDocument("name is required".to_string()));
        }

        let id = short_id();
        let uuid = format!("{entity_type}.{id}");
        fields.insert("_id".to_string(), Value::String(id));
        fields.insert("uuid".to_string(), Value::String(uuid.clone()));
        fields.insert(
            "documentType".to_string(),
            Value::String(entity_type.to_string()),
        );
        if let Some(folder) = folder {
            fields.insert("folder".to_string(), Value::String(folder.to_string()));
        }

        let document = Value::Object(fields);
        self.documents.write().insert(uuid.clone(), document.clone());
        debug!(uuid = %uuid, "entity created");
        Ok(document)
    }

    fn update_sync(&self, uuid: &str, data: Value) -> HostResult<Value> {
        let Value::Object(patch) = data else {
            return Err(HostError::InvalidDocument("data must be an object".to_string()));
        };
        let mut documents = self.documents.write();
        let document = documents
            .get_mut(uuid)
            .ok_or_else(|| HostError::NotFound(uuid.to_string()))?;
        if let Value::Object(fields) = document {
            merge(fields, patch);
        }
        Ok(document.clone())
    }

    fn post_sync(&self, message: NewChatMessage) -> HostChatMessage {
        let created = HostChatMessage {
            id: short_id(),
            user: self.user.clone(),
            content: message.content,
            flavor: message.flavor,
            message_type: Some(message.message_type),
            timestamp: now_millis(),
            speaker: message.speaker,
            whisper: message.whisper,
            blind: message.blind,
            roll: message.roll,
        };
        self.chat.write().push(created.clone());
        // Nobody listening is fine.
        let _ = self.events.send(created.clone());
        created
    }
}

impl Host for MemoryHost {
    fn info(&self) -> HostInfo {
        self.info.clone()
    }

    fn search<'a>(
        &'a self,
        query: &'a str,
        filter: Option<&'a str>,
        limit: usize,
    ) -> HostFuture<'a, Vec<SearchHit>> {
        Box::pin(async move { Ok(self.search_sync(query, filter, limit)) })
    }

    fn get_entity<'a>(&'a self, uuid: &'a str) -> HostFuture<'a, Value> {
        Box::pin(async move {
            self.documents
                .read()
                .get(uuid)
                .cloned()
                .ok_or_else(|| HostError::NotFound(uuid.to_string()))
        })
    }

    fn create_entity<'a>(
        &'a self,
        entity_type: &'a str,
        data: Value,
        folder: Option<&'a str>,
    ) -> HostFuture<'a, Value> {
        Box::pin(async move { self.create_sync(entity_type, data, folder) })
    }

    fn update_entity<'a>(&'a self, uuid: &'a str, data: Value) -> HostFuture<'a, Value> {
        Box::pin(async move { self.update_sync(uuid, data) })
    }

    fn delete_entity<'a>(&'a self, uuid: &'a str) -> HostFuture<'a, ()> {
        Box::pin(async move {
            self.documents
                .write()
                .remove(uuid)
                .map(|_| ())
                .ok_or_else(|| HostError::NotFound(uuid.to_string()))
        })
    }

    fn evaluate_roll<'a>(&'a self, formula: &'a str) -> HostFuture<'a, RollOutcome> {
        Box::pin(async move {
            let formula = Formula::parse(formula)?;
            let mut rng = self.rng.lock();
            Ok(formula.evaluate(&mut *rng))
        })
    }

    fn create_chat_message(&self, message: NewChatMessage) -> HostFuture<'_, HostChatMessage> {
        Box::pin(async move { Ok(self.post_sync(message)) })
    }

    fn chat_log(&self) -> Vec<HostChatMessage> {
        self.chat.read().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<HostChatMessage> {
        self.events.subscribe()
    }
}

impl std::fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHost")
            .field("world_id", &self.info.world_id)
            .field("documents", &self.documents.read().len())
            .field("messages", &self.chat.read().len())
            .finish_non_exhaustive()
    }
}

fn required_str<'a>(document: &'a Value, key: &'static str) -> HostResult<&'a str> {
    document
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| HostError::InvalidDocument(format!("document is missing '{key}'")))
}

/// Recursive object merge; non-object values overwrite.
fn merge(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        if matches!(key.as_str(), "uuid" | "_id" | "documentType") {
            continue;
        }
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => merge(existing, nested),
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// 16-character id in the host's document id style.
fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> MemoryHost {
        let seed: WorldSeed = serde_json::from_value(json!({
            "world": {"worldId": "w1", "worldTitle": "Night Below", "systemId": "dnd5e"},
            "user": {"id": "u1", "name": "Gamemaster"},
            "documents": [
                {"uuid": "Actor.a1", "documentType": "Actor", "name": "Goblin Boss", "hp": {"value": 21, "max": 21}},
                {"uuid": "Actor.a2", "documentType": "Actor", "name": "Hobgoblin"},
                {"uuid": "Item.i1", "documentType": "Item", "name": "Goblin Ear", "folder": "Loot"}
            ],
            "chat": [{"id": "c1", "content": "welcome", "timestamp": 1}]
        }))
        .unwrap();
        MemoryHost::from_seed(seed).unwrap().with_rng_seed(42)
    }

    #[tokio::test]
    async fn test_search_prefix_first_and_filter() {
        let host = seeded();
        let hits = host.search("goblin", None, 100).await.unwrap();
        let names: Vec<_> = hits.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["Goblin Boss", "Goblin Ear", "Hobgoblin"]);

        let actors = host.search("goblin", Some("Actor"), 100).await.unwrap();
        assert_eq!(actors.len(), 2);

        let limited = host.search("goblin", None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(hits[1].folder.as_deref(), Some("Loot"));
    }

    #[tokio::test]
    async fn test_entity_lifecycle() {
        let host = seeded();
        let created = host
            .create_entity("Actor", json!({"name": "Owlbear"}), Some("Monsters"))
            .await
            .unwrap();
        let uuid = created["uuid"].as_str().unwrap().to_string();
        assert!(uuid.starts_with("Actor."));
        assert_eq!(created["folder"], "Monsters");

        let updated = host
            .update_entity(&uuid, json!({"name": "Dire Owlbear", "uuid": "hijack"}))
            .await
            .unwrap();
        assert_eq!(updated["name"], "Dire Owlbear");
        assert_eq!(updated["uuid"], uuid.as_str());

        host.delete_entity(&uuid).await.unwrap();
        assert!(matches!(
            host.get_entity(&uuid).await,
            Err(HostError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_merges_nested() {
        let host = seeded();
        let updated = host
            .update_entity("Actor.a1", json!({"hp": {"value": 5}}))
            .await
            .unwrap();
        assert_eq!(updated["hp"], json!({"value": 5, "max": 21}));
    }

    #[tokio::test]
    async fn test_create_requires_name() {
        let host = seeded();
        let err = host
            .create_entity("Actor", json!({"hp": 3}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn test_chat_message_broadcast_and_logged() {
        let host = seeded();
        let mut events = host.subscribe();
        let created = host
            .create_chat_message(NewChatMessage {
                content: "hi".to_string(),
                message_type: "ic".to_string(),
                ..NewChatMessage::default()
            })
            .await
            .unwrap();

        assert_eq!(events.recv().await.unwrap(), created);
        assert_eq!(created.user.display_name(), "Gamemaster");
        let log = host.chat_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].id, created.id);
    }

    #[tokio::test]
    async fn test_evaluate_roll_errors() {
        let host = seeded();
        assert!(host.evaluate_roll("1d20+5").await.is_ok());
        assert!(matches!(
            host.evaluate_roll("banana").await,
            Err(HostError::InvalidFormula(_))
        ));
    }

    #[test]
    fn test_seed_rejects_incomplete_document() {
        let seed = WorldSeed {
            documents: vec![json!({"uuid": "Actor.x", "name": "No Type"})],
            ..WorldSeed::default()
        };
        assert!(MemoryHost::from_seed(seed).is_err());
    }

    #[test]
    fn test_seed_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.json");
        std::fs::write(&path, r#"{"world": {"worldId": "w9"}}"#).unwrap();
        let seed = WorldSeed::load(&path).unwrap();
        assert_eq!(seed.world.world_id, "w9");
        assert!(WorldSeed::load(dir.path().join("missing.json")).is_err());
    }
}
