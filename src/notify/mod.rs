use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::order::OrderId;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Pharmacist,
    Agent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub role: Role,
    pub id: Uuid,
}

impl Destination {
    pub fn customer(id: Uuid) -> Self {
        Self {
            role: Role::Customer,
            id,
        }
    }

    pub fn pharmacist(id: Uuid) -> Self {
        Self {
            role: Role::Pharmacist,
            id,
        }
    }

    pub fn agent(id: Uuid) -> Self {
        Self {
            role: Role::Agent,
            id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    NewOrder,
    DeliveryAssigned,
    DeliveryPickedUp,
    DeliveryDelay,
    OrderDelivered,
    OrderCancelled,
    DeliveryOtp,
    RefundProcessing,
    RefundCredited,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub dest: Destination,
    pub kind: NoticeKind,
    pub order_id: OrderId,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

impl Notice {
    pub fn new(dest: Destination, kind: NoticeKind, order_id: OrderId, message: String) -> Self {
        Self {
            dest,
            kind,
            order_id,
            message,
            sent_at: Utc::now(),
        }
    }
}

pub struct NotificationHub {
    tx: mpsc::Sender<Notice>,
    channels: DashMap<Destination, broadcast::Sender<Notice>>,
    event_buffer: usize,
}

impl NotificationHub {
    pub fn new(queue_size: usize, event_buffer: usize) -> (Self, mpsc::Receiver<Notice>) {
        let (tx, rx) = mpsc::channel(queue_size);
        (
            Self {
                tx,
                channels: DashMap::new(),
                event_buffer,
            },
            rx,
        )
    }

    /// A full queue drops the notice rather than stalling the caller.
    pub fn enqueue(&self, state: &AppState, notice: Notice) {
        match self.tx.try_send(notice) {
            Ok(()) => {
                state
                    .metrics
                    .notices_total
                    .with_label_values(&["queued"])
                    .inc();
            }
            Err(err) => {
                state
                    .metrics
                    .notices_total
                    .with_label_values(&["dropped"])
                    .inc();
                warn!(error = %err, "notice queue full, dropping");
            }
        }
    }

    pub fn subscribe(&self, dest: Destination) -> broadcast::Receiver<Notice> {
        self.channels
            .entry(dest)
            .or_insert_with(|| broadcast::channel(self.event_buffer).0)
            .subscribe()
    }

    fn publish(&self, notice: Notice) {
        if let Some(channel) = self.channels.get(&notice.dest) {
            // Zero receivers just means nobody is watching right now.
            let _ = channel.send(notice);
        }
    }
}

pub async fn run_notifier(state: Arc<AppState>, mut rx: mpsc::Receiver<Notice>) {
    while let Some(notice) = rx.recv().await {
        debug!(
            order_id = notice.order_id,
            role = ?notice.dest.role,
            kind = ?notice.kind,
            "delivering notice"
        );
        state
            .metrics
            .notices_total
            .with_label_values(&["delivered"])
            .inc();
        state.notifier.publish(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_notice() {
        let (hub, _rx) = NotificationHub::new(8, 8);
        let dest = Destination::customer(Uuid::new_v4());
        let mut sub = hub.subscribe(dest);

        hub.publish(Notice::new(
            dest,
            NoticeKind::NewOrder,
            7,
            "order placed".to_string(),
        ));

        let got = sub.recv().await.unwrap();
        assert_eq!(got.order_id, 7);
        assert_eq!(got.kind, NoticeKind::NewOrder);
    }

    #[tokio::test]
    async fn notices_do_not_cross_destinations() {
        let (hub, _rx) = NotificationHub::new(8, 8);
        let mine = Destination::agent(Uuid::new_v4());
        let theirs = Destination::agent(Uuid::new_v4());
        let mut sub = hub.subscribe(mine);
        let _other = hub.subscribe(theirs);

        hub.publish(Notice::new(
            theirs,
            NoticeKind::DeliveryAssigned,
            1,
            "pickup ready".to_string(),
        ));
        hub.publish(Notice::new(
            mine,
            NoticeKind::DeliveryPickedUp,
            2,
            "picked up".to_string(),
        ));

        let got = sub.recv().await.unwrap();
        assert_eq!(got.order_id, 2);
        assert_eq!(got.kind, NoticeKind::DeliveryPickedUp);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let (hub, _rx) = NotificationHub::new(8, 8);
        hub.publish(Notice::new(
            Destination::customer(Uuid::new_v4()),
            NoticeKind::OrderDelivered,
            3,
            "delivered".to_string(),
        ));
    }
}
