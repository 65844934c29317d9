use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::lifecycle;
use crate::engine::otp::OtpEntry;
use crate::error::AppError;
use crate::external::eta_or_default;
use crate::geo::GeoPoint;
use crate::models::delivery::{CancelReason, Delivery, DeliveryStatus};
use crate::models::order::{Order, OrderId, OrderStatus};
use crate::notify::{Destination, Notice, NoticeKind};
use crate::state::AppState;

#[derive(Debug)]
pub enum CancelOutcome {
    Cancelled { order: Order },
    Reassigned { delivery: Delivery },
    AdminInterventionRequired,
}

#[derive(Debug, Serialize)]
pub struct TrackInfo {
    pub order_id: OrderId,
    pub order_status: OrderStatus,
    pub delivery: Option<Delivery>,
    pub agent_position: Option<GeoPoint>,
}

pub async fn assign_delivery(state: &AppState, order_id: OrderId) -> Result<Delivery, AppError> {
    let status = state
        .orders
        .get(&order_id)
        .map(|o| o.status)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id}")))?;
    if status != OrderStatus::ReadyForDelivery {
        return Err(AppError::Conflict(format!(
            "order {order_id} is {status:?}, not ready for delivery"
        )));
    }

    start_delivery(state, order_id, None).await
}

/// Picks the nearest free agent and opens a delivery row. The order
/// transition comes last; a failed dispatch leaves the order ReadyForDelivery.
async fn start_delivery(
    state: &AppState,
    order_id: OrderId,
    exclude: Option<Uuid>,
) -> Result<Delivery, AppError> {
    let start = Instant::now();

    let address = state
        .addresses
        .get(&order_id)
        .map(|a| a.clone())
        .ok_or_else(|| AppError::NotFound(format!("address for order {order_id}")))?;

    let Some((agent_id, distance_km)) = pick_agent(state, &address.location, exclude) else {
        state
            .metrics
            .dispatch_total
            .with_label_values(&["agent", "exhausted"])
            .inc();
        warn!(order_id, "no online agents within radius");
        return Err(AppError::NoAgentsAvailable);
    };

    let agent_position = state
        .agent_index
        .position(&agent_id)
        .map(|tracked| tracked.point)
        .unwrap_or_else(|| address.location.clone());
    let eta_minutes = eta_or_default(state, &agent_position, &address.location).await;

    let order = lifecycle::transition(
        state,
        order_id,
        &[OrderStatus::ReadyForDelivery],
        OrderStatus::OutForDelivery,
    )?;

    let delivery = Delivery::assigned(order_id, agent_id, eta_minutes);
    state.deliveries.insert(delivery.id, delivery.clone());

    state.notify(Notice::new(
        Destination::agent(agent_id),
        NoticeKind::DeliveryAssigned,
        order_id,
        format!(
            "pickup for order {}, eta {} min",
            order.order_number, eta_minutes
        ),
    ));

    state
        .metrics
        .dispatch_total
        .with_label_values(&["agent", "ok"])
        .inc();
    state
        .metrics
        .dispatch_latency_seconds
        .with_label_values(&["agent"])
        .observe(start.elapsed().as_secs_f64());
    info!(order_id, agent_id = %agent_id, distance_km, eta_minutes, "delivery assigned");

    Ok(delivery)
}

/// Nearest online agent with no delivery already in flight.
fn pick_agent(
    state: &AppState,
    origin: &GeoPoint,
    exclude: Option<Uuid>,
) -> Option<(Uuid, f64)> {
    state
        .agent_index
        .nearest_k_within(origin, state.config.agent_radius_km, state.agent_index.len())
        .into_iter()
        .find(|(id, _)| {
            if Some(*id) == exclude {
                return false;
            }
            let online = state.agents.get(id).map(|a| a.online).unwrap_or(false);
            let busy = state
                .deliveries
                .iter()
                .any(|d| d.agent_id == *id && d.is_active());
            online && !busy
        })
}

pub fn confirm_pickup(
    state: &AppState,
    order_id: OrderId,
    agent_id: Uuid,
) -> Result<Delivery, AppError> {
    let delivery = state
        .active_delivery(order_id)
        .ok_or_else(|| AppError::NotFound(format!("no active delivery for order {order_id}")))?;
    if delivery.agent_id != agent_id {
        return Err(AppError::Conflict(format!(
            "delivery for order {order_id} is not held by this agent"
        )));
    }
    if delivery.status != DeliveryStatus::Assigned {
        return Err(AppError::Conflict(format!(
            "delivery for order {order_id} already picked up"
        )));
    }

    let order_status = state
        .orders
        .get(&order_id)
        .map(|o| o.status)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id}")))?;
    match order_status {
        OrderStatus::OutForDelivery => {}
        OrderStatus::ReadyForDelivery => {
            lifecycle::transition(
                state,
                order_id,
                &[OrderStatus::ReadyForDelivery],
                OrderStatus::OutForDelivery,
            )?;
        }
        other => {
            return Err(AppError::Conflict(format!(
                "order {order_id} is {other:?}, pickup not possible"
            )));
        }
    }

    let picked = {
        let mut row = state
            .deliveries
            .get_mut(&delivery.id)
            .ok_or_else(|| AppError::Internal("delivery row vanished".to_string()))?;
        row.status = DeliveryStatus::PickedUp;
        row.picked_at = Some(Utc::now());
        row.clone()
    };

    let customer_id = state.orders.get(&order_id).map(|o| o.customer_id);
    if let Some(customer_id) = customer_id {
        state.notify(Notice::new(
            Destination::customer(customer_id),
            NoticeKind::DeliveryPickedUp,
            order_id,
            "your order is on the way".to_string(),
        ));
    }

    info!(order_id, agent_id = %agent_id, "pickup confirmed");
    Ok(picked)
}

/// Agent-side cancellation. Customer-fault reasons terminate the order;
/// agent/store-fault reasons put it back in the pool and immediately try
/// another agent.
pub async fn cancel_delivery(
    state: &AppState,
    order_id: OrderId,
    agent_id: Uuid,
    reason: CancelReason,
) -> Result<CancelOutcome, AppError> {
    let delivery = state
        .active_delivery(order_id)
        .ok_or_else(|| AppError::NotFound(format!("no active delivery for order {order_id}")))?;
    if delivery.agent_id != agent_id {
        return Err(AppError::Conflict(format!(
            "delivery for order {order_id} is not held by this agent"
        )));
    }

    if !reason.allows_reassign() {
        let order = lifecycle::transition(
            state,
            order_id,
            &[OrderStatus::OutForDelivery],
            OrderStatus::Cancelled,
        )?;
        close_delivery_row(state, delivery.id, reason);

        state.notify(Notice::new(
            Destination::customer(order.customer_id),
            NoticeKind::OrderCancelled,
            order_id,
            format!("order {} was cancelled", order.order_number),
        ));
        info!(order_id, agent_id = %agent_id, ?reason, "delivery cancelled, order terminated");
        return Ok(CancelOutcome::Cancelled { order });
    }

    let order = lifecycle::transition(
        state,
        order_id,
        &[OrderStatus::OutForDelivery],
        OrderStatus::ReadyForDelivery,
    )?;
    close_delivery_row(state, delivery.id, reason);

    state.notify(Notice::new(
        Destination::customer(order.customer_id),
        NoticeKind::DeliveryDelay,
        order_id,
        format!("order {} is delayed, finding a new agent", order.order_number),
    ));

    match start_delivery(state, order_id, Some(agent_id)).await {
        Ok(replacement) => {
            info!(order_id, old_agent = %agent_id, new_agent = %replacement.agent_id, ?reason, "delivery reassigned");
            Ok(CancelOutcome::Reassigned {
                delivery: replacement,
            })
        }
        Err(AppError::NoAgentsAvailable) => {
            state
                .metrics
                .dispatch_total
                .with_label_values(&["agent", "intervention"])
                .inc();
            warn!(order_id, ?reason, "no replacement agent, admin intervention required");
            Ok(CancelOutcome::AdminInterventionRequired)
        }
        Err(err) => Err(err),
    }
}

pub(crate) fn close_delivery_row(state: &AppState, delivery_id: Uuid, reason: CancelReason) {
    if let Some(mut row) = state.deliveries.get_mut(&delivery_id) {
        row.status = DeliveryStatus::Cancelled;
        row.cancelled_at = Some(Utc::now());
        row.cancel_reason = Some(reason);
    }
}

/// Sends the handoff code to the customer. Reissuing invalidates the
/// previous code.
pub fn issue_handoff_code(
    state: &AppState,
    order_id: OrderId,
    agent_id: Uuid,
) -> Result<OtpEntry, AppError> {
    let delivery = state
        .active_delivery(order_id)
        .ok_or_else(|| AppError::NotFound(format!("no active delivery for order {order_id}")))?;
    if delivery.agent_id != agent_id {
        return Err(AppError::Conflict(format!(
            "delivery for order {order_id} is not held by this agent"
        )));
    }

    let entry = state.otp.generate(order_id, Utc::now());

    let customer_id = state.orders.get(&order_id).map(|o| o.customer_id);
    if let Some(customer_id) = customer_id {
        state.notify(Notice::new(
            Destination::customer(customer_id),
            NoticeKind::DeliveryOtp,
            order_id,
            format!("share code {} with your delivery agent", entry.code),
        ));
    }

    info!(order_id, agent_id = %agent_id, "handoff code issued");
    Ok(entry)
}

/// The code is checked before anything moves. A failed invoice render
/// after the order is Delivered degrades the result, never rolls it back.
pub async fn complete_delivery(
    state: &AppState,
    order_id: OrderId,
    agent_id: Uuid,
    code: &str,
) -> Result<Order, AppError> {
    let delivery = state
        .active_delivery(order_id)
        .ok_or_else(|| AppError::NotFound(format!("no active delivery for order {order_id}")))?;
    if delivery.agent_id != agent_id {
        return Err(AppError::Conflict(format!(
            "delivery for order {order_id} is not held by this agent"
        )));
    }
    if delivery.status != DeliveryStatus::PickedUp {
        return Err(AppError::Conflict(format!(
            "order {order_id} has not been picked up yet"
        )));
    }

    if !state.otp.verify(order_id, code, Utc::now()) {
        state
            .metrics
            .otp_verify_total
            .with_label_values(&["rejected"])
            .inc();
        return Err(AppError::OtpInvalidOrExpired);
    }
    state
        .metrics
        .otp_verify_total
        .with_label_values(&["ok"])
        .inc();

    let mut order = lifecycle::transition(
        state,
        order_id,
        &[OrderStatus::OutForDelivery],
        OrderStatus::Delivered,
    )?;

    if let Some(mut row) = state.deliveries.get_mut(&delivery.id) {
        row.status = DeliveryStatus::Delivered;
        row.delivered_at = Some(Utc::now());
    }

    match state.services.invoices.render(&order).await {
        Ok(invoice_ref) => {
            if let Some(mut stored) = state.orders.get_mut(&order_id) {
                stored.invoice_ref = Some(invoice_ref.clone());
            }
            order.invoice_ref = Some(invoice_ref);
        }
        Err(err) => {
            state
                .metrics
                .external_fallbacks_total
                .with_label_values(&["invoice"])
                .inc();
            warn!(order_id, error = %err, "invoice render failed after delivery");
        }
    }

    state.notify(Notice::new(
        Destination::customer(order.customer_id),
        NoticeKind::OrderDelivered,
        order_id,
        format!("order {} delivered", order.order_number),
    ));

    info!(order_id, agent_id = %agent_id, "delivery completed");
    Ok(order)
}

pub fn track(state: &AppState, order_id: OrderId) -> Result<TrackInfo, AppError> {
    let order_status = state
        .orders
        .get(&order_id)
        .map(|o| o.status)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id}")))?;

    let delivery = state.active_delivery(order_id);
    let agent_position = delivery
        .as_ref()
        .and_then(|d| state.agent_index.position(&d.agent_id))
        .map(|tracked| tracked.point);

    Ok(TrackInfo {
        order_id,
        order_status,
        delivery,
        agent_position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::pricing;
    use crate::models::actor::Agent;
    use crate::models::order::{Order, OrderAddress, PaymentStatus};

    const DOORSTEP: GeoPoint = GeoPoint {
        lat: 17.385,
        lng: 78.4867,
    };

    fn ready_state() -> (AppState, OrderId) {
        let (state, _rx) = AppState::new(Config::default());
        let order_id = seed_ready_order(&state);
        (state, order_id)
    }

    fn seed_ready_order(state: &AppState) -> OrderId {
        let order_id = state.next_order_id();
        let pricing = pricing::quote(150.0, 0.0, &state.config).unwrap();
        let mut order = Order::checked_out(order_id, Uuid::new_v4(), &pricing);
        order.payment_status = PaymentStatus::Success;
        order.status = OrderStatus::ReadyForDelivery;
        state.orders.insert(order_id, order);

        state.addresses.insert(
            order_id,
            OrderAddress {
                order_id,
                street: "12 Charminar Rd".to_string(),
                city: "Hyderabad".to_string(),
                pincode: "500002".to_string(),
                location: DOORSTEP,
            },
        );
        order_id
    }

    fn add_agent(state: &AppState, lat: f64, lng: f64, online: bool) -> Uuid {
        let id = Uuid::new_v4();
        let location = GeoPoint { lat, lng };
        state.agents.insert(
            id,
            Agent {
                id,
                name: format!("agent-{}", &id.to_string()[..8]),
                online,
                location: location.clone(),
                updated_at: Utc::now(),
            },
        );
        state.agent_index.upsert(id, location);
        id
    }

    #[tokio::test]
    async fn assign_picks_the_nearest_online_agent() {
        let (state, order_id) = ready_state();
        let near = add_agent(&state, 17.39, 78.49, true);
        let _far = add_agent(&state, 17.45, 78.60, true);
        let _offline = add_agent(&state, 17.386, 78.487, false);

        let delivery = assign_delivery(&state, order_id).await.unwrap();

        assert_eq!(delivery.agent_id, near);
        assert_eq!(delivery.status, DeliveryStatus::Assigned);
        assert!(delivery.eta_minutes >= 1);
        assert_eq!(
            state.orders.get(&order_id).unwrap().status,
            OrderStatus::OutForDelivery
        );
    }

    #[tokio::test]
    async fn assign_fails_when_no_agent_is_reachable() {
        let (state, order_id) = ready_state();
        add_agent(&state, 19.0, 80.0, true);

        let err = assign_delivery(&state, order_id).await.unwrap_err();

        assert!(matches!(err, AppError::NoAgentsAvailable));
        assert_eq!(
            state.orders.get(&order_id).unwrap().status,
            OrderStatus::ReadyForDelivery
        );
    }

    #[tokio::test]
    async fn assign_skips_agents_already_on_a_delivery() {
        let (state, first_order) = ready_state();
        let second_order = seed_ready_order(&state);
        add_agent(&state, 17.39, 78.49, true);

        assign_delivery(&state, first_order).await.unwrap();
        let err = assign_delivery(&state, second_order).await.unwrap_err();

        assert!(matches!(err, AppError::NoAgentsAvailable));
    }

    #[tokio::test]
    async fn assign_requires_a_ready_order() {
        let (state, order_id) = ready_state();
        add_agent(&state, 17.39, 78.49, true);
        state.orders.get_mut(&order_id).unwrap().status = OrderStatus::Packed;

        let err = assign_delivery(&state, order_id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn pickup_marks_the_delivery_and_keeps_the_order_moving() {
        let (state, order_id) = ready_state();
        let agent = add_agent(&state, 17.39, 78.49, true);
        assign_delivery(&state, order_id).await.unwrap();

        let picked = confirm_pickup(&state, order_id, agent).unwrap();

        assert_eq!(picked.status, DeliveryStatus::PickedUp);
        assert!(picked.picked_at.is_some());
        assert_eq!(
            state.orders.get(&order_id).unwrap().status,
            OrderStatus::OutForDelivery
        );

        let err = confirm_pickup(&state, order_id, agent).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn pickup_by_another_agent_is_rejected() {
        let (state, order_id) = ready_state();
        let _assigned = add_agent(&state, 17.39, 78.49, true);
        assign_delivery(&state, order_id).await.unwrap();

        let err = confirm_pickup(&state, order_id, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn customer_fault_cancellation_terminates_the_order() {
        let (state, order_id) = ready_state();
        let agent = add_agent(&state, 17.39, 78.49, true);
        let delivery = assign_delivery(&state, order_id).await.unwrap();

        let outcome = cancel_delivery(&state, order_id, agent, CancelReason::CustomerUnreachable)
            .await
            .unwrap();

        match outcome {
            CancelOutcome::Cancelled { order } => {
                assert_eq!(order.status, OrderStatus::Cancelled)
            }
            other => panic!("expected Cancelled, got {other:?}"),
        }
        let row = state.deliveries.get(&delivery.id).unwrap();
        assert_eq!(row.status, DeliveryStatus::Cancelled);
        assert_eq!(row.cancel_reason, Some(CancelReason::CustomerUnreachable));
        assert_eq!(state.deliveries.len(), 1);
    }

    #[tokio::test]
    async fn breakdown_reassigns_to_another_agent() {
        let (state, order_id) = ready_state();
        let first = add_agent(&state, 17.39, 78.49, true);
        let second = add_agent(&state, 17.40, 78.50, true);
        assign_delivery(&state, order_id).await.unwrap();

        let outcome = cancel_delivery(&state, order_id, first, CancelReason::VehicleBreakdown)
            .await
            .unwrap();

        match outcome {
            CancelOutcome::Reassigned { delivery } => {
                assert_eq!(delivery.agent_id, second);
                assert_eq!(delivery.status, DeliveryStatus::Assigned);
            }
            other => panic!("expected Reassigned, got {other:?}"),
        }
        assert_eq!(
            state.orders.get(&order_id).unwrap().status,
            OrderStatus::OutForDelivery
        );
        assert_eq!(state.deliveries.len(), 2);
    }

    #[tokio::test]
    async fn breakdown_without_replacement_needs_an_admin() {
        let (state, order_id) = ready_state();
        let only = add_agent(&state, 17.39, 78.49, true);
        assign_delivery(&state, order_id).await.unwrap();

        let outcome = cancel_delivery(&state, order_id, only, CancelReason::HealthIssue)
            .await
            .unwrap();

        assert!(matches!(outcome, CancelOutcome::AdminInterventionRequired));
        assert_eq!(
            state.orders.get(&order_id).unwrap().status,
            OrderStatus::ReadyForDelivery
        );
        assert!(state.active_delivery(order_id).is_none());
    }

    #[tokio::test]
    async fn completion_is_gated_on_the_handoff_code() {
        let (state, order_id) = ready_state();
        let agent = add_agent(&state, 17.39, 78.49, true);
        assign_delivery(&state, order_id).await.unwrap();
        confirm_pickup(&state, order_id, agent).unwrap();

        let entry = issue_handoff_code(&state, order_id, agent).unwrap();
        let wrong = if entry.code == "1000" { "1001" } else { "1000" };

        let err = complete_delivery(&state, order_id, agent, wrong)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::OtpInvalidOrExpired));

        let order = complete_delivery(&state, order_id, agent, &entry.code)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.invoice_ref.as_deref(), Some("invoice://ORD001"));
        assert!(state.active_delivery(order_id).is_none());
    }

    #[tokio::test]
    async fn completion_requires_a_pickup_first() {
        let (state, order_id) = ready_state();
        let agent = add_agent(&state, 17.39, 78.49, true);
        assign_delivery(&state, order_id).await.unwrap();
        let entry = issue_handoff_code(&state, order_id, agent).unwrap();

        let err = complete_delivery(&state, order_id, agent, &entry.code)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn track_exposes_the_live_agent_position() {
        let (state, order_id) = ready_state();
        let agent = add_agent(&state, 17.39, 78.49, true);
        assign_delivery(&state, order_id).await.unwrap();

        let info = track(&state, order_id).unwrap();

        assert_eq!(info.order_status, OrderStatus::OutForDelivery);
        assert_eq!(info.delivery.unwrap().agent_id, agent);
        let position = info.agent_position.unwrap();
        assert!((position.lat - 17.39).abs() < 1e-9);
    }
}
