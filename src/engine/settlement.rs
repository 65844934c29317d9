use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{OrderId, PaymentStatus};
use crate::models::refund::{Refund, RefundReason, RefundStatus};
use crate::notify::{Destination, Notice, NoticeKind};
use crate::state::AppState;

/// Opens a refund for the order's full total. The money is not moved here;
/// the settlement worker credits the record once its due time passes.
pub fn initiate_refund(
    state: &AppState,
    order_id: OrderId,
    reason: RefundReason,
) -> Result<Refund, AppError> {
    let order = state
        .orders
        .get(&order_id)
        .map(|o| o.clone())
        .ok_or_else(|| AppError::NotFound(format!("order {order_id}")))?;

    if order.payment_status != PaymentStatus::Success {
        return Err(AppError::Conflict(format!(
            "order {order_id} has no captured payment to refund"
        )));
    }
    let payment_ref = order
        .payment_ref
        .clone()
        .ok_or_else(|| AppError::Internal(format!("paid order {order_id} has no payment ref")))?;

    let already_open = state.refunds.iter().any(|r| {
        r.order_id == order_id
            && matches!(r.status, RefundStatus::Processing | RefundStatus::Success)
    });
    if already_open {
        return Err(AppError::Conflict(format!(
            "refund for order {order_id} already exists"
        )));
    }

    let due_at = Utc::now() + state.config.refund_settle_delay();
    let refund = Refund::processing(order_id, payment_ref, order.total, reason, due_at);
    state.refunds.insert(refund.id, refund.clone());

    state.notify(Notice::new(
        Destination::customer(order.customer_id),
        NoticeKind::RefundProcessing,
        order_id,
        format!(
            "refund of {:.2} for order {} is processing",
            refund.amount, order.order_number
        ),
    ));

    info!(
        order_id,
        refund_id = %refund.id,
        amount = refund.amount,
        ?reason,
        "refund initiated"
    );
    Ok(refund)
}

/// Credits every Processing refund whose due time has passed. The status
/// guard runs under the row's entry lock, so overlapping invocations
/// settle each refund exactly once.
pub fn settle_due_refunds(state: &AppState, now: DateTime<Utc>) -> usize {
    let due: Vec<Uuid> = state
        .refunds
        .iter()
        .filter(|r| r.status == RefundStatus::Processing && r.due_at <= now)
        .map(|r| r.id)
        .collect();

    let mut settled = 0;
    for refund_id in due {
        let credited = {
            let Some(mut row) = state.refunds.get_mut(&refund_id) else {
                continue;
            };
            if row.status != RefundStatus::Processing || row.due_at > now {
                continue;
            }
            row.status = RefundStatus::Success;
            row.gateway_ref = Some(format!("rfnd_{}", Uuid::new_v4().simple()));
            row.settled_at = Some(now);
            row.clone()
        };

        state.metrics.refunds_settled_total.inc();
        settled += 1;

        if let Some(order) = state.orders.get(&credited.order_id) {
            state.notify(Notice::new(
                Destination::customer(order.customer_id),
                NoticeKind::RefundCredited,
                credited.order_id,
                format!(
                    "refund of {:.2} for order {} has been credited",
                    credited.amount, order.order_number
                ),
            ));
        }

        info!(
            order_id = credited.order_id,
            refund_id = %credited.id,
            amount = credited.amount,
            "refund settled"
        );
    }

    settled
}

pub async fn run_settlement_worker(state: Arc<AppState>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(state.config.settlement_poll_secs));
    loop {
        ticker.tick().await;
        let settled = settle_due_refunds(&state, Utc::now());
        if settled > 0 {
            debug!(settled, "settlement pass credited refunds");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::pricing;
    use crate::models::order::{Order, OrderStatus};

    fn paid_state() -> (AppState, OrderId) {
        let (state, _rx) = AppState::new(Config::default());
        let order_id = state.next_order_id();

        let pricing = pricing::quote(150.0, 0.0, &state.config).unwrap();
        let mut order = Order::checked_out(order_id, Uuid::new_v4(), &pricing);
        order.payment_status = PaymentStatus::Success;
        order.payment_ref = Some("PAY-20260826-DEADBEEF".to_string());
        order.status = OrderStatus::Cancelled;
        state.orders.insert(order_id, order);

        (state, order_id)
    }

    #[test]
    fn initiate_requires_a_captured_payment() {
        let (state, order_id) = paid_state();
        state.orders.get_mut(&order_id).unwrap().payment_status = PaymentStatus::Pending;

        let err = initiate_refund(&state, order_id, RefundReason::Cancelled).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn initiate_covers_the_full_total_and_defers_settlement() {
        let (state, order_id) = paid_state();
        let total = state.orders.get(&order_id).unwrap().total;

        let refund = initiate_refund(&state, order_id, RefundReason::Cancelled).unwrap();

        assert_eq!(refund.amount, total);
        assert_eq!(refund.status, RefundStatus::Processing);
        assert!(refund.gateway_ref.is_none());
        assert!(refund.due_at > Utc::now() + chrono::Duration::seconds(86_000));
    }

    #[test]
    fn a_second_refund_for_the_same_order_is_rejected() {
        let (state, order_id) = paid_state();
        initiate_refund(&state, order_id, RefundReason::Cancelled).unwrap();

        let err = initiate_refund(&state, order_id, RefundReason::Damaged).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn settlement_waits_for_the_due_time() {
        let (state, order_id) = paid_state();
        initiate_refund(&state, order_id, RefundReason::Cancelled).unwrap();

        assert_eq!(settle_due_refunds(&state, Utc::now()), 0);
    }

    #[test]
    fn a_due_refund_settles_exactly_once() {
        let (state, order_id) = paid_state();
        let refund = initiate_refund(&state, order_id, RefundReason::Cancelled).unwrap();

        let after_due = refund.due_at + chrono::Duration::seconds(1);
        assert_eq!(settle_due_refunds(&state, after_due), 1);
        assert_eq!(settle_due_refunds(&state, after_due), 0);

        let row = state.refunds.get(&refund.id).unwrap();
        assert_eq!(row.status, RefundStatus::Success);
        assert!(row.gateway_ref.as_deref().unwrap().starts_with("rfnd_"));
        assert_eq!(row.settled_at, Some(after_due));
    }
}
