//! The order status state machine.
//!
//! | From \ To  | Pending | Confirmed | Shipped | Delivered | Cancelled |
//! |------------|---------|-----------|---------|-----------|-----------|
//! | Pending    | No-op   | Ok        | Err     | Err       | Ok        |
//! | Confirmed  | Err     | No-op     | Ok      | Err       | Ok        |
//! | Shipped    | Err     | Err       | No-op   | Ok        | Err       |
//! | Delivered  | Err     | Err       | Err     | No-op     | Err       |
//! | Cancelled  | Err     | Err       | Err     | Err       | No-op     |
//!
//! Re-applying the current status is an idempotent no-op (success, not error): network retries must never surface
//! as client errors. `Cancelled → Cancelled` and friends therefore return [`Transition::NoOp`].

use crate::db_types::{Actor, OrderStatusType, Role};

/// The outcome of validating a status change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The new status equals the current status. The caller should succeed without touching the row.
    NoOp,
    /// A legal forward transition.
    Apply,
}

/// Checks the transition table. Returns `None` for illegal transitions.
pub fn validate_transition(from: OrderStatusType, to: OrderStatusType) -> Option<Transition> {
    use OrderStatusType::*;
    if from == to {
        return Some(Transition::NoOp);
    }
    let legal = matches!((from, to), (Pending, Confirmed | Cancelled) | (Confirmed, Shipped | Cancelled) | (Shipped, Delivered));
    legal.then_some(Transition::Apply)
}

/// The role-based gate in front of the transition table.
///
/// Buyers may only request `Cancelled` from `Pending`. Sellers may request `Confirmed`, `Shipped` and `Cancelled`,
/// subject to the table. Admins may request anything the table allows. Returns `false` when the *actor* is the
/// problem; the transition itself is judged by [`validate_transition`].
pub fn role_may_request(actor: &Actor, from: OrderStatusType, to: OrderStatusType) -> bool {
    use OrderStatusType::*;
    match actor.role {
        Role::Admin => true,
        Role::Buyer => to == Cancelled && (from == Pending || from == Cancelled),
        Role::Seller => matches!(to, Confirmed | Shipped | Cancelled),
    }
}
