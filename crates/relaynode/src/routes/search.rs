//! `search` over the host document index.

use relay_proto::payloads::SearchRequest;
use tracing::debug;

use super::Services;
use crate::router::{CallContext, HandlerResult, RouteSet};

/// Most hits returned for one query.
pub const MAX_RESULTS: usize = 100;

/// The search route set.
#[must_use]
pub fn routes(services: &Services) -> RouteSet {
    let services = services.clone();
    RouteSet::new("search").route_typed("search", move |req: SearchRequest, ctx: CallContext| {
        search(services.clone(), req, ctx)
    })
}

async fn search(services: Services, req: SearchRequest, ctx: CallContext) -> HandlerResult {
    let query = req.query.trim();
    if query.is_empty() {
        return Err("query is required".into());
    }

    let hits = services
        .host
        .search(query, req.filter.as_deref(), MAX_RESULTS)
        .await?;
    debug!(query, hits = hits.len(), "search complete");

    ctx.reply(
        ctx.result()
            .with("query", query)
            .with("filter", &req.filter)
            .with("results", hits),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use relay_proto::Frame;
    use serde_json::json;

    use super::*;
    use crate::routes::testing::{Harness, host, services_with};

    #[tokio::test]
    async fn test_search_hits() {
        let services = services_with(host());
        let mut harness = Harness::new(routes(&services));
        let reply = harness
            .call(Frame::new("search").with_request_id("s1").with("query", "goblin"))
            .await;

        assert_eq!(reply.kind, "search-result");
        assert!(reply.answers("s1"));
        let results = reply.get("results").unwrap().as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["documentType"], "Actor");
    }

    #[tokio::test]
    async fn test_search_filter() {
        let services = services_with(host());
        let mut harness = Harness::new(routes(&services));
        let reply = harness
            .call(
                Frame::new("search")
                    .with_request_id("s2")
                    .with("query", "goblin")
                    .with("filter", "Item"),
            )
            .await;

        let results = reply.get("results").unwrap().as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["uuid"], "Item.i1");
        assert_eq!(reply.get("filter"), Some(&json!("Item")));
    }

    #[tokio::test]
    async fn test_empty_query_fails() {
        let services = services_with(host());
        let mut harness = Harness::new(routes(&services));
        let reply = harness
            .call(Frame::new("search").with_request_id("s3").with("query", ""))
            .await;
        assert_eq!(reply.get("success"), Some(&json!(false)));
    }
}
