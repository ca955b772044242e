// The four-case hop decision shared by insert, delete, and
// point query. inHalfOpen is the only admissible responsibility test;
// nothing here compares identifiers any other way.

use chordify_base::{in_half_open, Identifier};

use crate::state::NodeState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteDecision {
    /// case A: this node heads the replication chain.
    Head,
    /// case B: an interior replica, strictly between head and origin.
    Interior,
    /// case C: the chain wrapped back to its originator (k >= ring size).
    SelfWrap,
    /// case D: not yet responsible; forward unchanged.
    Forward,
}

pub fn route(
    state: &NodeState,
    key_hash: Identifier,
    times_copied: u32,
    origin_id: Identifier,
) -> RouteDecision {
    let self_id = state.self_pos.id;
    let successor_id = state.successor().id;
    let k = state.policy.replication_factor;

    if times_copied == 0 && in_half_open(key_hash, self_id, successor_id) {
        RouteDecision::Head
    } else if times_copied > 0 && times_copied < k && self_id != origin_id {
        RouteDecision::Interior
    } else if times_copied > 0 && times_copied < k && self_id == origin_id {
        RouteDecision::SelfWrap
    } else {
        RouteDecision::Forward
    }
}
