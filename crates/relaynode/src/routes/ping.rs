//! `ping` → `pong`.

use relay_proto::Frame;
use serde_json::Value;

use crate::router::{CallContext, RouteSet};

/// The ping route set.
#[must_use]
pub fn routes() -> RouteSet {
    RouteSet::new("ping").route("ping", |_: Value, ctx: CallContext| async move {
        ctx.reply(Frame::new("pong"));
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::RelayLink;
    use crate::router::ActionRouter;
    use crate::routes::testing::Harness;

    #[tokio::test]
    async fn test_ping_pong() {
        let mut harness = Harness::new(routes());
        let reply = harness.call(Frame::new("ping").with_request_id("p1")).await;
        assert_eq!(reply.kind, "pong");
        assert!(reply.answers("p1"));
    }

    #[tokio::test]
    async fn test_ping_while_disconnected_is_noop() {
        let mut router = ActionRouter::new();
        router.mount(routes());
        let link = RelayLink::disconnected();
        router
            .dispatch(Frame::new("ping"), &link)
            .unwrap()
            .await
            .unwrap();
        assert!(!link.is_connected());
    }
}
