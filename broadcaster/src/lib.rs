//! Per-organization realtime event fan-out.
//!
//! Generalizes this codebase's `MarketViewStore`
//! (`Arc<RwLock<HashMap<Pair, MarketMetricsView>>>`, a single latest-value
//! cache) into a list of bounded subscriber channels per tenant: `publish`
//! is non-blocking and a full subscriber is dropped, never awaited.

use std::collections::HashMap;
use std::sync::Arc;

use domain::ids::OrgId;
use serde_json::Value;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::RwLock;
use tracing::warn;

const SUBSCRIBER_CAPACITY: usize = 64;

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    BidWindowOpened { bid_window_id: String, assignment_id: String },
    BidWindowClosed { bid_window_id: String, assignment_id: String },
    AssignmentUpdated { assignment_id: String, shift_progress: String },
    DriverFlagged { user_id: String, is_flagged: bool },
}

impl Event {
    pub fn as_json(&self) -> Value {
        serde_json::to_value(self).expect("Event always serializes")
    }
}

/// Broadcasts organization-scoped events to any number of subscribers
/// (e.g. websocket sessions). At-least-once delivery within capacity; a
/// lagging subscriber can miss events rather than stall the publisher.
#[derive(Clone, Default)]
pub struct Broadcaster {
    inner: Arc<RwLock<HashMap<OrgId, Vec<Sender<Event>>>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, org_id: OrgId) -> Receiver<Event> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let mut g = self.inner.write().await;
        g.entry(org_id).or_default().push(tx);
        rx
    }

    /// Fan out `event` to every live subscriber of `org_id`. Never blocks:
    /// a subscriber at capacity is dropped and logged instead of awaited.
    pub async fn publish(&self, org_id: OrgId, event: Event) {
        let mut g = self.inner.write().await;
        let Some(subs) = g.get_mut(&org_id) else {
            return;
        };
        subs.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%org_id, "dropping broadcast event; subscriber channel full");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    pub async fn subscriber_count(&self, org_id: OrgId) -> usize {
        self.inner
            .read()
            .await
            .get(&org_id)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_same_org_subscriber_only() {
        let b = Broadcaster::new();
        let org_a = OrgId::new();
        let org_b = OrgId::new();
        let mut rx_a = b.subscribe(org_a).await;
        let mut rx_b = b.subscribe(org_b).await;

        b.publish(
            org_a,
            Event::DriverFlagged {
                user_id: "u1".into(),
                is_flagged: true,
            },
        )
        .await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_subscribers_are_pruned() {
        let b = Broadcaster::new();
        let org = OrgId::new();
        let rx = b.subscribe(org).await;
        drop(rx);

        b.publish(
            org,
            Event::AssignmentUpdated {
                assignment_id: "a1".into(),
                shift_progress: "confirmed".into(),
            },
        )
        .await;

        assert_eq!(b.subscriber_count(org).await, 0);
    }
}
