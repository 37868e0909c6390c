//! Dispatch of decrypted client actions onto the registry.

use tracing::debug;

use hushroom_proto::ServerAction;

use crate::registry::ConnectionRegistry;

/// What the relay did with one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Joined,
    /// Forwarded to this many targets.
    Forwarded(usize),
    Ignored,
}

/// Routes server-layer actions. Payloads inside `c` and `w` are never
/// inspected, only re-wrapped for their targets.
#[derive(Clone)]
pub struct ActionRouter {
    registry: ConnectionRegistry,
}

impl ActionRouter {
    pub const fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    pub async fn dispatch(&self, from: &str, action: ServerAction) -> RouteOutcome {
        match action {
            ServerAction::Join { channel_hash } => {
                if self.registry.join(from, &channel_hash).await {
                    RouteOutcome::Joined
                } else {
                    RouteOutcome::Ignored
                }
            }
            ServerAction::Direct { payload, peer } => {
                if self.registry.relay_direct(from, &peer, payload).await {
                    RouteOutcome::Forwarded(1)
                } else {
                    RouteOutcome::Ignored
                }
            }
            ServerAction::Fanout { payloads } => {
                match self.registry.relay_fanout(from, payloads).await {
                    0 => RouteOutcome::Ignored,
                    n => RouteOutcome::Forwarded(n),
                }
            }
            ServerAction::Members { .. } => {
                debug!(client_id = %from, "Client sent a relay-only action, ignored");
                RouteOutcome::Ignored
            }
        }
    }

    #[cfg(test)]
    const fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::{Duration, Instant};

    use hushroom_crypto::ServerKey;
    use tokio::sync::mpsc;

    use super::*;
    use crate::registry::Outbound;

    async fn secured(
        registry: &ConnectionRegistry,
        byte: u8,
    ) -> (String, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = registry.accept(tx, Instant::now()).await.unwrap();
        registry
            .set_shared_key(&id, ServerKey::from_bytes([byte; 32]))
            .await
            .unwrap();
        (id, rx)
    }

    fn router() -> ActionRouter {
        ActionRouter::new(ConnectionRegistry::new(Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn join_then_route() {
        let router = router();
        let (a, _rx_a) = secured(router.registry(), 1).await;
        let (b, _rx_b) = secured(router.registry(), 2).await;

        let join = |hash: &str| ServerAction::Join {
            channel_hash: hash.into(),
        };
        assert_eq!(router.dispatch(&a, join("room")).await, RouteOutcome::Joined);
        assert_eq!(router.dispatch(&b, join("room")).await, RouteOutcome::Joined);
        assert_eq!(router.dispatch(&b, join("room")).await, RouteOutcome::Ignored);

        let direct = ServerAction::Direct {
            payload: "opaque".into(),
            peer: b.clone(),
        };
        assert_eq!(router.dispatch(&a, direct).await, RouteOutcome::Forwarded(1));

        let fanout = ServerAction::Fanout {
            payloads: BTreeMap::from([(b.clone(), "x".into()), ("ghost".into(), "y".into())]),
        };
        assert_eq!(router.dispatch(&a, fanout).await, RouteOutcome::Forwarded(1));
    }

    #[tokio::test]
    async fn relay_only_actions_are_ignored() {
        let router = router();
        let (a, _rx) = secured(router.registry(), 1).await;
        let list = ServerAction::Members {
            members: vec!["spoof".into()],
        };
        assert_eq!(router.dispatch(&a, list).await, RouteOutcome::Ignored);
    }

    #[tokio::test]
    async fn empty_fanout_is_ignored() {
        let router = router();
        let (a, _rx) = secured(router.registry(), 1).await;
        router
            .dispatch(
                &a,
                ServerAction::Join {
                    channel_hash: "room".into(),
                },
            )
            .await;
        let fanout = ServerAction::Fanout {
            payloads: BTreeMap::new(),
        };
        assert_eq!(router.dispatch(&a, fanout).await, RouteOutcome::Ignored);
    }
}
