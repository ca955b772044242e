mod client;
mod maintenance;
mod replication;
mod router;
mod state;
mod traversal;

pub use client::{delete, greet, insert, overlay, query, query_all, QueryResult};
pub use maintenance::{depart, join_via};
pub use router::{route, RouteDecision};
pub use state::NodeState;
pub use traversal::OverlayNode;

use chordify_net::Envelope;
use chordify_store::LocalStore;
use tracing::warn;

/// Dispatch one received envelope to its ring-side handler. Called
/// once per accepted connection by the node's accept loop. `is_bootstrap`
/// selects join/departure_announcement handling specific to the
/// well-known bootstrap.
pub fn dispatch(
    state: &NodeState,
    store: &dyn LocalStore,
    is_bootstrap: bool,
    envelope: Envelope,
) {
    let result = match envelope {
        Envelope::Greet(env) => client::handle_greet(state, env),
        Envelope::Join(env) => maintenance::handle_join(state, is_bootstrap, env),
        Envelope::Departure(env) => {
            maintenance::handle_departure(state, &env, true);
            Ok(())
        }
        Envelope::DepartureAnnouncement(env) => {
            maintenance::handle_departure(state, &env, false);
            Ok(())
        }
        Envelope::Insertion(env) => replication::handle_insertion(state, store, env),
        Envelope::Deletion(env) => replication::handle_deletion(state, store, env),
        Envelope::Query(env) => replication::handle_query(state, store, env),
        Envelope::Overlay(env) => traversal::handle_overlay(state, env),
        Envelope::QueryAll(env) => traversal::handle_query_all(state, store, env),
        // Response envelopes only ever arrive on an ephemeral reply
        // listener, never on the main accept loop; seeing one here
        // indicates a malformed or misdirected connection.
        other @ (Envelope::GreetResponse(_)
        | Envelope::JoinResponse(_)
        | Envelope::InsertionResponse(_)
        | Envelope::DeletionResponse(_)
        | Envelope::QueryResponse(_)
        | Envelope::OverlayResponse(_)
        | Envelope::QueryAllResponse(_)) => {
            warn!(target: "chordify", envelope = ?other, "response envelope arrived on accept loop, dropping");
            Ok(())
        }
    };
    if let Err(e) = result {
        warn!(target: "chordify", error = %e, "handler failed");
    }
}
