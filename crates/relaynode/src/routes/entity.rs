//! Entity routes: read, create, update and delete host documents by uuid.

use relay_proto::payloads::{CreateEntityRequest, EntityRef, UpdateEntityRequest};
use serde_json::Value;
use tracing::info;

use super::Services;
use crate::router::{CallContext, HandlerResult, RouteSet};

/// The entity route set.
#[must_use]
pub fn routes(services: &Services) -> RouteSet {
    let (get, create, update, delete) = (
        services.clone(),
        services.clone(),
        services.clone(),
        services.clone(),
    );
    RouteSet::new("entity")
        .route_typed("get-entity", move |req: EntityRef, ctx: CallContext| {
            get_entity(get.clone(), req, ctx)
        })
        .route_typed("create-entity", move |req: CreateEntityRequest, ctx: CallContext| {
            create_entity(create.clone(), req, ctx)
        })
        .route_typed("update-entity", move |req: UpdateEntityRequest, ctx: CallContext| {
            update_entity(update.clone(), req, ctx)
        })
        .route_typed("delete-entity", move |req: EntityRef, ctx: CallContext| {
            delete_entity(delete.clone(), req, ctx)
        })
}

async fn get_entity(services: Services, req: EntityRef, ctx: CallContext) -> HandlerResult {
    let document = services.host.get_entity(&req.uuid).await?;
    ctx.reply(
        ctx.result()
            .with("success", true)
            .with("uuid", &req.uuid)
            .with("data", document),
    );
    Ok(())
}

async fn create_entity(
    services: Services,
    req: CreateEntityRequest,
    ctx: CallContext,
) -> HandlerResult {
    let document = services
        .host
        .create_entity(&req.entity_type, req.data, req.folder.as_deref())
        .await?;
    let uuid = document
        .get("uuid")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    info!(uuid = %uuid, entity_type = %req.entity_type, "entity created");

    ctx.reply(
        ctx.result()
            .with("success", true)
            .with("uuid", uuid)
            .with("entity", document),
    );
    Ok(())
}

async fn update_entity(
    services: Services,
    req: UpdateEntityRequest,
    ctx: CallContext,
) -> HandlerResult {
    let document = services.host.update_entity(&req.uuid, req.data).await?;
    info!(uuid = %req.uuid, "entity updated");
    ctx.reply(
        ctx.result()
            .with("success", true)
            .with("uuid", &req.uuid)
            .with("entity", document),
    );
    Ok(())
}

async fn delete_entity(services: Services, req: EntityRef, ctx: CallContext) -> HandlerResult {
    services.host.delete_entity(&req.uuid).await?;
    info!(uuid = %req.uuid, "entity deleted");
    ctx.reply(ctx.result().with("success", true).with("uuid", &req.uuid));
    Ok(())
}
