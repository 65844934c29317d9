use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use tracing::debug;

use crate::models::order::OrderId;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct OtpEntry {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Per-order proof-of-handoff codes. At most one live code per order.
pub struct OtpVault {
    codes: DashMap<OrderId, OtpEntry>,
    ttl_secs: i64,
}

impl OtpVault {
    pub fn new(ttl: Duration) -> Self {
        Self {
            codes: DashMap::new(),
            ttl_secs: ttl.as_secs() as i64,
        }
    }

    pub fn generate(&self, order_id: OrderId, now: DateTime<Utc>) -> OtpEntry {
        let code = rand::rng().random_range(1000..=9999).to_string();
        let entry = OtpEntry {
            code,
            expires_at: now + chrono::Duration::seconds(self.ttl_secs),
        };
        self.codes.insert(order_id, entry.clone());
        entry
    }

    /// Single use: a correct, unexpired code is consumed by this call.
    /// Wrong or expired codes leave the stored entry untouched.
    pub fn verify(&self, order_id: OrderId, code: &str, now: DateTime<Utc>) -> bool {
        self.codes
            .remove_if(&order_id, |_, entry| {
                entry.code == code && entry.expires_at > now
            })
            .is_some()
    }

    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.codes.len();
        self.codes.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.codes.len())
    }
}

pub async fn run_sweep_loop(state: Arc<AppState>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(state.config.otp_sweep_secs));
    loop {
        ticker.tick().await;
        let swept = state.otp.sweep_expired(Utc::now());
        if swept > 0 {
            debug!(swept, "swept expired handoff codes");
        }
    }
}
