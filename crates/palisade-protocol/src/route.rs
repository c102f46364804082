//! The message routing table.
//!
//! Routing is by `msg_id` band; no per-message registration. The table is
//! closed and compiled into the binary; unknown ids route nowhere and the
//! Gate counts them as protocol strikes.

/// Where an envelope is bound once it leaves the Gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    /// Stateless business tier (login, chat).
    Service,
    /// Stateful per-player tier.
    Game,
}

/// A routing decision derived from a `msg_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteRule {
    pub target: RouteTarget,
    /// Service module the band belongs to; empty for Game-bound traffic
    /// (the Game dispatches on the id itself).
    pub module: &'static str,
}

/// Gate control band. These ids are handled by the Gate itself and never
/// forwarded.
pub fn is_gate_band(msg_id: i32) -> bool {
    (1..=999).contains(&msg_id)
}

/// Looks up the route for a business message id.
///
/// Gate-band ids and anything outside the closed bands return `None`.
pub fn route_for(msg_id: i32) -> Option<RouteRule> {
    match msg_id {
        1001..=1999 => Some(RouteRule {
            target: RouteTarget::Service,
            module: "login",
        }),
        2001..=2999 => Some(RouteRule {
            target: RouteTarget::Service,
            module: "chat",
        }),
        3001..=3999 => Some(RouteRule {
            target: RouteTarget::Game,
            module: "",
        }),
        _ => None,
    }
}
