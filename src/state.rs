use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::otp::OtpVault;
use crate::engine::surge::SurgeController;
use crate::external::ExternalServices;
use crate::geo::GeoIndex;
use crate::models::actor::{Agent, Pharmacist};
use crate::models::assignment::PharmacistAssignment;
use crate::models::delivery::Delivery;
use crate::models::order::{Order, OrderAddress, OrderId};
use crate::models::refund::Refund;
use crate::notify::{Notice, NotificationHub};
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub config: Config,
    pub orders: DashMap<OrderId, Order>,
    pub addresses: DashMap<OrderId, OrderAddress>,
    pub pharmacists: DashMap<Uuid, Pharmacist>,
    pub agents: DashMap<Uuid, Agent>,
    pub assignments: DashMap<(OrderId, Uuid), PharmacistAssignment>,
    pub deliveries: DashMap<Uuid, Delivery>,
    pub refunds: DashMap<Uuid, Refund>,
    pub pharmacist_index: GeoIndex,
    pub agent_index: GeoIndex,
    pub otp: OtpVault,
    pub surge: SurgeController,
    pub notifier: NotificationHub,
    pub services: ExternalServices,
    order_seq: AtomicU64,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> (Self, mpsc::Receiver<Notice>) {
        let services = ExternalServices::local_stack(&config);
        Self::with_services(config, services)
    }

    pub fn with_services(
        config: Config,
        services: ExternalServices,
    ) -> (Self, mpsc::Receiver<Notice>) {
        let (notifier, notice_rx) =
            NotificationHub::new(config.notice_queue_size, config.event_buffer_size);

        (
            Self {
                orders: DashMap::new(),
                addresses: DashMap::new(),
                pharmacists: DashMap::new(),
                agents: DashMap::new(),
                assignments: DashMap::new(),
                deliveries: DashMap::new(),
                refunds: DashMap::new(),
                pharmacist_index: GeoIndex::new(),
                agent_index: GeoIndex::with_ttl(Duration::from_secs(
                    config.agent_location_ttl_secs,
                )),
                otp: OtpVault::new(config.otp_ttl()),
                surge: SurgeController::default(),
                notifier,
                services,
                order_seq: AtomicU64::new(1),
                metrics: Metrics::new(),
                config,
            },
            notice_rx,
        )
    }

    pub fn next_order_id(&self) -> OrderId {
        self.order_seq.fetch_add(1, Ordering::Relaxed)
    }

    pub fn notify(&self, notice: Notice) {
        self.notifier.enqueue(self, notice);
    }

    /// The one delivery currently moving the order, if any. Cancelled
    /// and completed rows stay behind as history.
    pub fn active_delivery(&self, order_id: OrderId) -> Option<Delivery> {
        self.deliveries
            .iter()
            .find(|d| d.order_id == order_id && d.is_active())
            .map(|d| d.clone())
    }
}
