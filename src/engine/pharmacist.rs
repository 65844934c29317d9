use std::time::Instant;

use dashmap::mapref::entry::Entry;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::lifecycle;
use crate::error::AppError;
use crate::models::assignment::{AssignmentStatus, PharmacistAssignment};
use crate::models::order::{Order, OrderId, OrderStatus};
use crate::notify::{Destination, Notice, NoticeKind};
use crate::state::AppState;

#[derive(Debug, Clone, Copy)]
pub struct DispatchOutcome {
    pub notified: usize,
    pub fallback_used: bool,
}

/// Offers the order to pharmacists near the delivery address, widening
/// to every active pharmacist when the radius query is empty. Re-running
/// leaves existing offer rows alone.
pub fn dispatch_pharmacists(
    state: &AppState,
    order_id: OrderId,
) -> Result<DispatchOutcome, AppError> {
    let start = Instant::now();

    let order = state
        .orders
        .get(&order_id)
        .map(|o| o.clone())
        .ok_or_else(|| AppError::NotFound(format!("order {order_id}")))?;
    if order.status != OrderStatus::WaitingPharmacist {
        return Err(AppError::Conflict(format!(
            "order {order_id} is {:?}, not awaiting a pharmacist",
            order.status
        )));
    }

    let address = state
        .addresses
        .get(&order_id)
        .map(|a| a.clone())
        .ok_or_else(|| AppError::NotFound(format!("address for order {order_id}")))?;

    let mut candidates: Vec<Uuid> = state
        .pharmacist_index
        .nearest_k_within(
            &address.location,
            state.config.pharmacist_radius_km,
            state.config.pharmacist_fanout,
        )
        .into_iter()
        .map(|(id, _)| id)
        .filter(|id| state.pharmacists.get(id).map(|p| p.active).unwrap_or(false))
        .collect();

    let fallback_used = candidates.is_empty();
    if fallback_used {
        candidates = state
            .pharmacists
            .iter()
            .filter(|p| p.active)
            .map(|p| p.id)
            .collect();
    }

    if candidates.is_empty() {
        state
            .metrics
            .dispatch_total
            .with_label_values(&["pharmacist", "exhausted"])
            .inc();
        warn!(order_id, "no active pharmacists to offer the order to");
        return Err(AppError::NoPharmacistsAvailable);
    }

    let mut notified = 0;
    for pharmacist_id in candidates {
        match state.assignments.entry((order_id, pharmacist_id)) {
            // Never overwrite: the row may have been accepted meanwhile.
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                slot.insert(PharmacistAssignment::pending(order_id, pharmacist_id));
                state.notify(Notice::new(
                    Destination::pharmacist(pharmacist_id),
                    NoticeKind::NewOrder,
                    order_id,
                    format!("order {} awaiting review", order.order_number),
                ));
                notified += 1;
            }
        }
    }

    state
        .metrics
        .dispatch_total
        .with_label_values(&["pharmacist", "ok"])
        .inc();
    state
        .metrics
        .dispatch_latency_seconds
        .with_label_values(&["pharmacist"])
        .observe(start.elapsed().as_secs_f64());
    info!(order_id, notified, fallback_used, "pharmacist offers fanned out");

    Ok(DispatchOutcome {
        notified,
        fallback_used,
    })
}

/// First acceptance wins. The order transition is the race decider: a
/// second acceptor fails it and their offer row stays Pending.
pub fn accept(state: &AppState, order_id: OrderId, pharmacist_id: Uuid) -> Result<Order, AppError> {
    {
        let assignment = state
            .assignments
            .get(&(order_id, pharmacist_id))
            .ok_or_else(|| AppError::NotFound(format!("no offer on order {order_id}")))?;
        if assignment.status != AssignmentStatus::Pending {
            return Err(AppError::Conflict(format!(
                "offer on order {order_id} already {:?}",
                assignment.status
            )));
        }
    }

    let order = lifecycle::transition(
        state,
        order_id,
        &[OrderStatus::WaitingPharmacist],
        OrderStatus::Accepted,
    )?;

    if let Some(mut assignment) = state.assignments.get_mut(&(order_id, pharmacist_id)) {
        assignment.status = AssignmentStatus::Accepted;
    }

    info!(order_id, pharmacist_id = %pharmacist_id, "pharmacist accepted order");
    Ok(order)
}

pub fn reject(state: &AppState, order_id: OrderId, pharmacist_id: Uuid) -> Result<usize, AppError> {
    {
        let mut assignment = state
            .assignments
            .get_mut(&(order_id, pharmacist_id))
            .ok_or_else(|| AppError::NotFound(format!("no offer on order {order_id}")))?;
        if assignment.status != AssignmentStatus::Pending {
            return Err(AppError::Conflict(format!(
                "offer on order {order_id} already {:?}",
                assignment.status
            )));
        }
        assignment.status = AssignmentStatus::Rejected;
    }

    let mut open: Vec<(Uuid, chrono::DateTime<chrono::Utc>)> = state
        .assignments
        .iter()
        .filter(|entry| entry.key().0 == order_id && entry.value().status == AssignmentStatus::Pending)
        .map(|entry| (entry.key().1, entry.value().created_at))
        .collect();
    open.sort_by_key(|(_, offered_at)| *offered_at);

    match open.first() {
        Some((next, _)) => {
            state.notify(Notice::new(
                Destination::pharmacist(*next),
                NoticeKind::NewOrder,
                order_id,
                "order still awaiting review".to_string(),
            ));
        }
        None => {
            warn!(order_id, pharmacist_id = %pharmacist_id, "last open offer rejected, order still waiting");
        }
    }
    Ok(open.len())
}

pub fn pack(state: &AppState, order_id: OrderId, pharmacist_id: Uuid) -> Result<Order, AppError> {
    ensure_accepted_assignee(state, order_id, pharmacist_id)?;
    lifecycle::transition(state, order_id, &[OrderStatus::Accepted], OrderStatus::Packed)
}

pub fn mark_ready(
    state: &AppState,
    order_id: OrderId,
    pharmacist_id: Uuid,
) -> Result<Order, AppError> {
    ensure_accepted_assignee(state, order_id, pharmacist_id)?;
    lifecycle::transition(
        state,
        order_id,
        &[OrderStatus::Packed],
        OrderStatus::ReadyForDelivery,
    )
}

fn ensure_accepted_assignee(
    state: &AppState,
    order_id: OrderId,
    pharmacist_id: Uuid,
) -> Result<(), AppError> {
    let holds_order = state
        .assignments
        .get(&(order_id, pharmacist_id))
        .map(|a| a.status == AssignmentStatus::Accepted)
        .unwrap_or(false);

    if holds_order {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "order {order_id} is not held by this pharmacist"
        )))
    }
}
