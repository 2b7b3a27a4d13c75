//! Dice routes: `roll`, `rolls`, `last-roll`.

use rand::Rng;
use rand::distributions::Alphanumeric;
use relay_proto::now_millis;
use relay_proto::payloads::{RollRequest, RollsRequest};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::Services;
use crate::host::{NewChatMessage, RollOutcome};
use crate::router::{CallContext, HandlerResult, RouteSet};

/// The roll route set.
#[must_use]
pub fn routes(services: &Services) -> RouteSet {
    let (roll_services, rolls_services, last_services) =
        (services.clone(), services.clone(), services.clone());
    RouteSet::new("roll")
        .route_typed("roll", move |req: RollRequest, ctx: CallContext| {
            roll(roll_services.clone(), req, ctx)
        })
        .route_typed("rolls", move |req: RollsRequest, ctx: CallContext| {
            rolls(rolls_services.clone(), req, ctx)
        })
        .route("last-roll", move |_: Value, ctx: CallContext| {
            last_roll(last_services.clone(), ctx)
        })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RollReply {
    id: String,
    chat_message_created: bool,
    roll: RolledDice,
}

#[derive(Debug, Serialize)]
struct RolledDice {
    #[serde(flatten)]
    outcome: RollOutcome,
    timestamp: i64,
}

async fn roll(services: Services, req: RollRequest, ctx: CallContext) -> HandlerResult {
    let speaker = match req.speaker.as_deref() {
        Some(uuid) => resolve_speaker(&services, uuid).await,
        None => None,
    };

    let outcome = services
        .host
        .evaluate_roll(&req.formula)
        .await
        .map_err(|e| format!("Failed to roll formula: {e}"))?;

    if req.create_chat_message {
        services
            .host
            .create_chat_message(NewChatMessage {
                content: outcome.total.to_string(),
                speaker,
                message_type: "roll".to_string(),
                flavor: req.flavor.clone().unwrap_or_default(),
                whisper: req.whisper.clone(),
                blind: false,
                roll: Some(outcome.clone()),
            })
            .await?;
    }

    info!(formula = %outcome.formula, total = outcome.total, "roll evaluated");
    let reply = RollReply {
        id: manual_roll_id(),
        chat_message_created: req.create_chat_message,
        roll: RolledDice {
            outcome,
            timestamp: now_millis(),
        },
    };
    ctx.reply(ctx.result().with("success", true).with("data", reply));
    Ok(())
}

/// Speaker descriptor for an actor or token uuid; `None` if it can't be
/// resolved.
async fn resolve_speaker(services: &Services, uuid: &str) -> Option<Value> {
    match services.host.get_entity(uuid).await {
        Ok(document) => {
            let id = document
                .get("_id")
                .and_then(Value::as_str)
                .unwrap_or(uuid);
            let alias = document.get("name").and_then(Value::as_str);
            let key = if uuid.starts_with("Token.") || uuid.contains(".Token.") {
                "token"
            } else {
                "actor"
            };
            let mut speaker = Map::new();
            speaker.insert(key.to_string(), Value::from(id));
            speaker.insert("alias".to_string(), Value::from(alias));
            Some(Value::Object(speaker))
        }
        Err(e) => {
            warn!(speaker = %uuid, error = %e, "failed to resolve speaker");
            None
        }
    }
}

async fn rolls(services: Services, req: RollsRequest, ctx: CallContext) -> HandlerResult {
    if req.clear || req.refresh {
        services.rolls.clear();
        if req.refresh {
            let count = services.refresh_rolls();
            info!(count, "roll history refreshed");
        }
    }

    ctx.reply(ctx.result().with("data", services.rolls.recent(req.limit)));
    Ok(())
}

async fn last_roll(services: Services, ctx: CallContext) -> HandlerResult {
    ctx.reply(ctx.result().with("data", services.rolls.latest()));
    Ok(())
}

/// `manual_<millis>_<13 random base36 chars>`.
fn manual_roll_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(13)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("manual_{}_{suffix}", now_millis())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use relay_proto::{Frame, RollRecord, UserRef};

    use serde_json::json;

    use super::*;
    use crate::host::Host;
    use crate::routes::testing::{Harness, host, services_with};

    fn record(id: &str, total: i64) -> RollRecord {
        RollRecord {
            id: id.to_string(),
            message_id: id.to_string(),
            user: UserRef::new("u1", "Gamemaster"),
            speaker: None,
            flavor: String::new(),
            roll_total: total,
            formula: "1d20".to_string(),
            is_critical: false,
            is_fumble: false,
            dice: vec![],
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn test_roll_success() {
        let services = services_with(host());
        let mut harness = Harness::new(routes(&services));
        let reply = harness
            .call(Frame::new("roll").with_request_id("r1").with("formula", "2d6+3"))
            .await;

        assert_eq!(reply.kind, "roll-result");
        assert!(reply.answers("r1"));
        assert_eq!(reply.get("success"), Some(&json!(true)));
        let data = reply.get("data").unwrap();
        assert!(data["id"].as_str().unwrap().starts_with("manual_"));
        assert_eq!(data["chatMessageCreated"], json!(false));
        let total = data["roll"]["total"].as_i64().unwrap();
        assert!((5..=15).contains(&total));
        assert_eq!(data["roll"]["formula"], "2d6+3");
        assert!(data["roll"]["timestamp"].is_i64());
    }

    #[tokio::test]
    async fn test_roll_bad_formula() {
        let services = services_with(host());
        let mut harness = Harness::new(routes(&services));
        let reply = harness
            .call(Frame::new("roll").with_request_id("r2").with("formula", "2x6"))
            .await;

        assert_eq!(reply.get("success"), Some(&json!(false)));
        let error = reply.get("error").and_then(Value::as_str).unwrap();
        assert!(error.starts_with("Failed to roll formula"));
    }

    #[tokio::test]
    async fn test_roll_posts_chat_message_with_speaker() {
        let host = host();
        let mut events = host.subscribe();
        let services = services_with(host);
        let mut harness = Harness::new(routes(&services));
        let reply = harness
            .call(
                Frame::new("roll")
                    .with_request_id("r3")
                    .with("formula", "1d20")
                    .with("createChatMessage", true)
                    .with("speaker", "Actor.a1"),
            )
            .await;
        assert_eq!(reply.get("data").unwrap()["chatMessageCreated"], json!(true));

        let posted = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(posted.is_roll());
        assert_eq!(posted.message_type.as_deref(), Some("roll"));
        assert_eq!(
            posted.speaker,
            Some(json!({"actor": "a1", "alias": "Goblin Boss"}))
        );
    }

    #[tokio::test]
    async fn test_rolls_limit_and_order() {
        let services = services_with(host());
        for (i, id) in ["a", "b", "c"].into_iter().enumerate() {
            services.rolls.record(record(id, i64::try_from(i).unwrap()));
        }
        let mut harness = Harness::new(routes(&services));
        let reply = harness
            .call(Frame::new("rolls").with_request_id("l1").with("limit", 2))
            .await;

        let ids: Vec<_> = reply.get("data").unwrap().as_array().unwrap()
            .iter()
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_rolls_clear() {
        let services = services_with(host());
        services.rolls.record(record("a", 1));
        let mut harness = Harness::new(routes(&services));
        let reply = harness
            .call(Frame::new("rolls").with_request_id("l2").with("clear", true))
            .await;
        assert_eq!(reply.get("data"), Some(&json!([])));
        assert!(services.rolls.is_empty());
    }

    #[tokio::test]
    async fn test_rolls_refresh_from_chat_log() {
        let host = host();
        host.create_chat_message(NewChatMessage {
            content: "7".to_string(),
            message_type: "roll".to_string(),
            roll: Some(host.evaluate_roll("1d8").await.unwrap()),
            ..NewChatMessage::default()
        })
        .await
        .unwrap();
        let services = services_with(host);
        services.rolls.record(record("stale", 1));

        let mut harness = Harness::new(routes(&services));
        let reply = harness
            .call(Frame::new("rolls").with_request_id("l3").with("refresh", true))
            .await;
        let data = reply.get("data").unwrap().as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["formula"], "1d8");
    }

    #[tokio::test]
    async fn test_last_roll() {
        let services = services_with(host());
        let mut harness = Harness::new(routes(&services));
        let empty = harness
            .call(Frame::new("last-roll").with_request_id("x1"))
            .await;
        assert_eq!(empty.get("data"), Some(&Value::Null));

        services.rolls.record(record("a", 4));
        services.rolls.record(record("b", 9));
        let reply = harness
            .call(Frame::new("last-roll").with_request_id("x2"))
            .await;
        assert_eq!(reply.kind, "last-roll-result");
        assert_eq!(reply.get("data").unwrap()["rollTotal"], json!(9));
    }

    #[test]
    fn test_manual_roll_id_shape() {
        let id = manual_roll_id();
        let parts: Vec<_> = id.splitn(3, '_').collect();
        assert_eq!(parts[0], "manual");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 13);
    }
}
