use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::driver::Driver;
use domain::ids::{NotificationId, OrgId, RouteId, UserId};
use domain::notification::{Notification, NotificationType};
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use store::Store;
use tracing::{info, warn};

use crate::transport::{PushOutcome, PushTransport};

/// Bulk sends cap concurrency to protect the transport, the same
/// bounded-fan-out shape this codebase's bulk executor/router paths use
/// (a semaphore-gated fan-out rather than an unbounded spawn loop).
const BULK_CONCURRENCY: usize = 10;

pub struct Notifier {
    store: Arc<dyn Store>,
    transport: Arc<dyn PushTransport>,
}

impl Notifier {
    pub fn new(store: Arc<dyn Store>, transport: Arc<dyn PushTransport>) -> Self {
        Self { store, transport }
    }

    /// Sends a single notification to `recipient` within `org_id`. Always
    /// persists the in-app row (best-effort on the push side): a push
    /// failure never affects the caller or the in-app record.
    pub async fn send(
        &self,
        org_id: OrgId,
        recipient: UserId,
        kind: NotificationType,
        title: impl Into<String>,
        body: impl Into<String>,
        data: Value,
        dedupe_key: Option<String>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let driver = self.store.get_driver(recipient, org_id).await?;
        let Some(driver) = driver else {
            warn!(%recipient, %org_id, "dropping notification; recipient not in organization");
            return Ok(());
        };

        let title = title.into();
        let body = body.into();

        let notification = Notification {
            id: NotificationId::new(),
            org_id,
            recipient_user_id: recipient,
            kind,
            title: title.clone(),
            body: body.clone(),
            data,
            dedupe_key,
            created_at: now,
            read_at: None,
        };

        if let Err(e) = self.store.insert_notification(notification).await {
            warn!(error = %e, %recipient, "failed to persist in-app notification");
        }

        self.push_best_effort(&driver, &title, &body).await;
        Ok(())
    }

    async fn push_best_effort(&self, driver: &Driver, title: &str, body: &str) {
        let Some(token) = driver.fcm_token.clone() else {
            return;
        };

        match self.transport.push(&token, title, body).await {
            PushOutcome::Delivered => {}
            PushOutcome::InvalidToken => {
                if let Err(e) = self
                    .store
                    .clear_driver_token_if_matches(driver.id, &token)
                    .await
                {
                    warn!(error = %e, user_id = %driver.id, "failed to clear invalid push token");
                }
            }
            PushOutcome::Transient => {
                info!(user_id = %driver.id, "push transport transient failure");
            }
            PushOutcome::TerminalOther => {
                warn!(user_id = %driver.id, "push transport terminal failure (non-token)");
            }
        }
    }

    /// Fans out the same notification to many recipients, bounded to
    /// `BULK_CONCURRENCY` in-flight sends at a time.
    pub async fn send_bulk(
        &self,
        org_id: OrgId,
        recipients: Vec<UserId>,
        kind: NotificationType,
        title: String,
        body: String,
        data: Value,
        now: DateTime<Utc>,
    ) {
        let mut in_flight = FuturesUnordered::new();
        let mut queue = recipients.into_iter();

        for recipient in queue.by_ref().take(BULK_CONCURRENCY) {
            in_flight.push(self.send(
                org_id,
                recipient,
                kind.clone(),
                title.clone(),
                body.clone(),
                data.clone(),
                None,
                now,
            ));
        }

        while in_flight.next().await.is_some() {
            if let Some(recipient) = queue.next() {
                in_flight.push(self.send(
                    org_id,
                    recipient,
                    kind.clone(),
                    title.clone(),
                    body.clone(),
                    data.clone(),
                    None,
                    now,
                ));
            }
        }
    }

    /// Resolves the route's primary manager and forwards the notification;
    /// returns `false` if no manager is assigned (spec: silent no-op).
    pub async fn send_manager_alert(
        &self,
        org_id: OrgId,
        route_id: RouteId,
        kind: NotificationType,
        title: impl Into<String>,
        body: impl Into<String>,
        data: Value,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let Some(manager_id) = self.store.get_route_manager(route_id, org_id).await? else {
            return Ok(false);
        };
        self.send(org_id, manager_id, kind, title, body, data, None, now)
            .await?;
        Ok(true)
    }
}
