//! Chat routes: `chat`, `chat-messages`.

use relay_proto::payloads::{ChatMessagesRequest, ChatRequest, SortOrder};
use serde_json::json;
use tracing::info;

use super::Services;
use crate::host::NewChatMessage;
use crate::router::{CallContext, HandlerResult, RouteSet};

/// Speaker alias used when a relayed message names none.
pub const DEFAULT_SPEAKER: &str = "The Gold Box AI";

/// Message types the host accepts unchanged.
pub const CORE_MESSAGE_TYPES: &[&str] = &["base", "ic", "ooc", "roll", "emote", "other", "player-chat"];

/// Non-core labels and the core type each maps to.
pub const MESSAGE_TYPE_ALIASES: &[(&str, &str)] = &[
    ("gm-message", "base"),
    ("gm", "base"),
    ("dm", "base"),
    ("whisper", "ic"),
    ("blind", "base"),
    ("private", "ic"),
];

/// Normalize a message type label. Unknown labels become `base`.
#[must_use]
pub fn map_message_type(label: &str) -> &'static str {
    if let Some(&core) = CORE_MESSAGE_TYPES.iter().find(|t| **t == label) {
        return core;
    }
    MESSAGE_TYPE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == label)
        .map_or("base", |&(_, core)| core)
}

/// The chat route set.
#[must_use]
pub fn routes(services: &Services) -> RouteSet {
    let (chat_services, list_services) = (services.clone(), services.clone());
    RouteSet::new("chat")
        .route_typed("chat", move |req: ChatRequest, ctx: CallContext| {
            chat(chat_services.clone(), req, ctx)
        })
        .route_typed("chat-messages", move |req: ChatMessagesRequest, ctx: CallContext| {
            chat_messages(list_services.clone(), req, ctx)
        })
}

async fn chat(services: Services, req: ChatRequest, ctx: CallContext) -> HandlerResult {
    let content = req.into_content();
    if content.message.trim().is_empty() {
        return Err("missing message content".into());
    }

    let speaker = content.speaker.as_deref().unwrap_or(DEFAULT_SPEAKER);
    let message_type = map_message_type(content.message_type.as_deref().unwrap_or_default());
    let preview: String = content.message.chars().take(50).collect();

    services
        .host
        .create_chat_message(NewChatMessage {
            content: content.message,
            speaker: Some(json!({ "alias": speaker })),
            message_type: message_type.to_string(),
            flavor: content.flavor.unwrap_or_default(),
            ..NewChatMessage::default()
        })
        .await?;

    info!(%preview, "chat message delivered to host");
    ctx.reply(
        ctx.result()
            .with("success", true)
            .with("message", "Chat message delivered successfully"),
    );
    Ok(())
}

async fn chat_messages(
    services: Services,
    req: ChatMessagesRequest,
    ctx: CallContext,
) -> HandlerResult {
    if req.refresh {
        let count = services.refresh_chat();
        info!(count, "chat history refreshed");
    }

    let mut messages = services.chat.snapshot();
    if req.sort == "timestamp" {
        match req.order {
            SortOrder::Desc => messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
            SortOrder::Asc => messages.sort_by_key(|m| m.timestamp),
        }
    }
    let total = messages.len();
    messages.truncate(req.limit);

    ctx.reply(
        ctx.result()
            .with("messages", messages)
            .with("total", total),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use relay_proto::{ChatRecord, Frame, UserRef};
    use serde_json::Value;
    use test_case::test_case;

    use super::*;
    use crate::host::{Host, HostChatMessage};
    use crate::routes::testing::{Harness, host, services_with};

    #[test_case("base" => "base" ; "core base")]
    #[test_case("ic" => "ic" ; "core ic")]
    #[test_case("ooc" => "ooc" ; "core ooc")]
    #[test_case("roll" => "roll" ; "core roll")]
    #[test_case("emote" => "emote" ; "core emote")]
    #[test_case("other" => "other" ; "core other")]
    #[test_case("player-chat" => "player-chat" ; "core player chat")]
    #[test_case("gm-message" => "base" ; "gm message")]
    #[test_case("gm" => "base" ; "gm")]
    #[test_case("dm" => "base" ; "dm")]
    #[test_case("blind" => "base" ; "blind")]
    #[test_case("whisper" => "ic" ; "whisper")]
    #[test_case("private" => "ic" ; "private")]
    #[test_case("" => "base" ; "empty")]
    #[test_case("IC" => "base" ; "case sensitive")]
    #[test_case("shout" => "base" ; "unknown")]
    fn test_map_message_type(label: &str) -> &'static str {
        map_message_type(label)
    }

    fn record(id: &str, timestamp: i64) -> ChatRecord {
        ChatRecord {
            id: id.to_string(),
            message_id: id.to_string(),
            user: UserRef::new("u1", "Gamemaster"),
            content: format!("message {id}"),
            flavor: String::new(),
            message_type: "ic".to_string(),
            timestamp,
            speaker: None,
            whisper: vec![],
            blind: false,
        }
    }

    async fn next_post(events: &mut tokio::sync::broadcast::Receiver<HostChatMessage>) -> HostChatMessage {
        tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_chat_nested_payload() {
        let host = host();
        let mut events = host.subscribe();
        let services = services_with(host);
        let mut harness = Harness::new(routes(&services));

        let reply = harness
            .call(
                Frame::new("chat")
                    .with_request_id("c1")
                    .with("message", json!({"message": "Roll initiative!", "type": "gm"})),
            )
            .await;
        assert_eq!(reply.kind, "chat-result");
        assert_eq!(reply.get("success"), Some(&json!(true)));

        let posted = next_post(&mut events).await;
        assert_eq!(posted.content, "Roll initiative!");
        assert_eq!(posted.message_type.as_deref(), Some("base"));
        assert_eq!(posted.speaker, Some(json!({"alias": DEFAULT_SPEAKER})));
    }

    #[tokio::test]
    async fn test_chat_flat_payload_with_speaker() {
        let host = host();
        let mut events = host.subscribe();
        let services = services_with(host);
        let mut harness = Harness::new(routes(&services));

        harness
            .call(
                Frame::new("chat")
                    .with_request_id("c2")
                    .with("message", "hello")
                    .with("speaker", "Narrator")
                    .with("type", "whisper"),
            )
            .await;

        let posted = next_post(&mut events).await;
        assert_eq!(posted.message_type.as_deref(), Some("ic"));
        assert_eq!(posted.speaker, Some(json!({"alias": "Narrator"})));
    }

    #[tokio::test]
    async fn test_chat_empty_message_fails() {
        let services = services_with(host());
        let mut harness = Harness::new(routes(&services));
        let reply = harness
            .call(Frame::new("chat").with_request_id("c3").with("message", "  "))
            .await;
        assert_eq!(reply.get("success"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_chat_messages_sorted_and_limited() {
        let services = services_with(host());
        services.chat.record(record("a", 30));
        services.chat.record(record("b", 10));
        services.chat.record(record("c", 20));
        let mut harness = Harness::new(routes(&services));

        let reply = harness
            .call(Frame::new("chat-messages").with_request_id("m1").with("limit", 2))
            .await;
        let ids: Vec<_> = reply.get("messages").unwrap().as_array().unwrap()
            .iter()
            .map(|m| m["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(reply.get("total"), Some(&json!(3)));

        let reply = harness
            .call(
                Frame::new("chat-messages")
                    .with_request_id("m2")
                    .with("order", "asc"),
            )
            .await;
        let first = &reply.get("messages").unwrap()[0];
        assert_eq!(first["id"], "b");

        let reply = harness
            .call(
                Frame::new("chat-messages")
                    .with_request_id("m4")
                    .with("order", "ASC")
                    .with("limit", Value::Null),
            )
            .await;
        assert!(reply.get("error").is_none());
        let messages = reply.get("messages").and_then(Value::as_array).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["id"], "b");
    }

    #[tokio::test]
    async fn test_chat_messages_refresh() {
        let host = host();
        host.create_chat_message(NewChatMessage {
            content: "from the log".to_string(),
            message_type: "ooc".to_string(),
            ..NewChatMessage::default()
        })
        .await
        .unwrap();
        let services = services_with(host);
        let mut harness = Harness::new(routes(&services));

        let reply = harness
            .call(Frame::new("chat-messages").with_request_id("m3").with("refresh", true))
            .await;
        let messages = reply.get("messages").and_then(Value::as_array).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["content"], "from the log");
        assert_eq!(messages[0]["type"], "ooc");
    }
}
