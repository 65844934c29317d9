use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::delivery::CancelReason;
use crate::models::order::{Order, OrderId, OrderStatus};
use crate::notify::{Destination, Notice, NoticeKind};
use crate::state::AppState;

/// Statuses a customer-side cancellation may leave from.
pub const CANCELLABLE: &[OrderStatus] = &[
    OrderStatus::WaitingPharmacist,
    OrderStatus::Accepted,
    OrderStatus::Packed,
    OrderStatus::ReadyForDelivery,
    OrderStatus::OutForDelivery,
];

/// The only way order status changes. Succeeds iff the current status is in
/// the caller's expected `from` set and the move is in the canonical table.
///
/// The dashmap entry lock makes guard-check and write atomic per order, so
/// two racing callers serialize and the loser observes the winner's status
/// and gets `InvalidTransition` instead of a stale write.
pub fn transition(
    state: &AppState,
    order_id: OrderId,
    from: &[OrderStatus],
    to: OrderStatus,
) -> Result<Order, AppError> {
    let mut order = state
        .orders
        .get_mut(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    let current = order.status;
    if !from.contains(&current) || !current.can_advance_to(to) {
        state
            .metrics
            .transitions_total
            .with_label_values(&["rejected"])
            .inc();
        warn!(order_id, current = ?current, to = ?to, "transition rejected");
        return Err(AppError::InvalidTransition {
            order_id,
            current,
            to,
        });
    }

    order.status = to;
    state
        .metrics
        .transitions_total
        .with_label_values(&["ok"])
        .inc();
    debug!(order_id, from = ?current, to = ?to, "order status advanced");
    Ok(order.clone())
}

/// Customer-side cancellation; closes any delivery still open on the order.
pub fn cancel_order(state: &AppState, order_id: OrderId) -> Result<Order, AppError> {
    let order = transition(state, order_id, CANCELLABLE, OrderStatus::Cancelled)?;

    if let Some(active) = state.active_delivery(order_id) {
        crate::engine::delivery::close_delivery_row(
            state,
            active.id,
            CancelReason::CustomerCancelled,
        );
    }

    state.notify(Notice::new(
        Destination::customer(order.customer_id),
        NoticeKind::OrderCancelled,
        order_id,
        format!("order {} was cancelled", order.order_number),
    ));

    Ok(order)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::transition;
    use crate::config::Config;
    use crate::engine::pricing;
    use crate::error::AppError;
    use crate::models::order::{Order, OrderStatus};
    use crate::state::AppState;

    const ALL: [OrderStatus; 10] = [
        OrderStatus::Pending,
        OrderStatus::PaymentInitiated,
        OrderStatus::Paid,
        OrderStatus::WaitingPharmacist,
        OrderStatus::Accepted,
        OrderStatus::Packed,
        OrderStatus::ReadyForDelivery,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    fn state_with_order(status: OrderStatus) -> Arc<AppState> {
        let (state, _rx) = AppState::new(Config::default());
        let state = Arc::new(state);

        let pricing = pricing::quote(100.0, 0.0, &state.config).unwrap();
        let mut order = Order::checked_out(1, Uuid::new_v4(), &pricing);
        order.status = status;
        state.orders.insert(order.id, order);
        state
    }

    #[test]
    fn full_matrix_matches_the_table() {
        for from in ALL {
            for to in ALL {
                let state = state_with_order(from);
                let result = transition(&state, 1, &[from], to);

                if from.can_advance_to(to) {
                    assert!(result.is_ok(), "{from:?} -> {to:?} should be legal");
                    assert_eq!(state.orders.get(&1).unwrap().status, to);
                } else {
                    assert!(
                        matches!(result, Err(AppError::InvalidTransition { .. })),
                        "{from:?} -> {to:?} should be rejected"
                    );
                    assert_eq!(
                        state.orders.get(&1).unwrap().status,
                        from,
                        "status must be unchanged after a rejected {from:?} -> {to:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn guard_set_mismatch_is_rejected_even_for_a_legal_edge() {
        let state = state_with_order(OrderStatus::Pending);
        let result = transition(
            &state,
            1,
            &[OrderStatus::Paid],
            OrderStatus::PaymentInitiated,
        );

        assert!(matches!(result, Err(AppError::InvalidTransition { .. })));
        assert_eq!(state.orders.get(&1).unwrap().status, OrderStatus::Pending);
    }

    #[test]
    fn unknown_order_is_not_found() {
        let (state, _rx) = AppState::new(Config::default());
        let result = transition(
            &Arc::new(state),
            42,
            &[OrderStatus::Pending],
            OrderStatus::PaymentInitiated,
        );
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for terminal in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            for to in ALL {
                assert!(!terminal.can_advance_to(to), "{terminal:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn cancel_order_closes_the_open_delivery_row() {
        use crate::engine::lifecycle::cancel_order;
        use crate::models::delivery::{CancelReason, Delivery, DeliveryStatus};

        let state = state_with_order(OrderStatus::OutForDelivery);
        let delivery = Delivery::assigned(1, Uuid::new_v4(), 12);
        state.deliveries.insert(delivery.id, delivery.clone());

        let order = cancel_order(&state, 1).unwrap();

        assert_eq!(order.status, OrderStatus::Cancelled);
        let row = state.deliveries.get(&delivery.id).unwrap();
        assert_eq!(row.status, DeliveryStatus::Cancelled);
        assert_eq!(row.cancel_reason, Some(CancelReason::CustomerCancelled));
    }

    #[test]
    fn cancel_order_rejects_pre_payment_orders() {
        use crate::engine::lifecycle::cancel_order;

        let state = state_with_order(OrderStatus::Pending);
        let result = cancel_order(&state, 1);
        assert!(matches!(result, Err(AppError::InvalidTransition { .. })));
    }
}
