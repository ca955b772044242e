// The replication engine: write effects (insert/delete merge rule),
// the shared chain-walk acknowledgement rules for both consistency
// modes, and the read path. Each handler is
// invoked once per accepted connection carrying the matching envelope
// type; the router (router.rs) supplies the per-hop case.

use std::net::Ipv4Addr;

use chordify_base::{ConsistencyType, Identifier};
use chordify_net::{
    send_envelope, DeletionEnvelope, DeletionResponseEnvelope, Envelope, InsertionEnvelope,
    InsertionResponseEnvelope, Origin, QueryEnvelope, QueryResponseEnvelope,
};
use chordify_store::{LocalStore, StoredEntry};
use tracing::{debug, warn};

use crate::router::{route, RouteDecision};
use crate::state::NodeState;

fn send_to_origin(origin: &Origin, envelope: Envelope) {
    if let Err(e) = send_envelope(origin.origin_ip, origin.origin_reply_port, &envelope) {
        warn!(target: "chordify", error = %e, "failed to deliver reply to origin");
    }
}

fn forward(successor_ip: Ipv4Addr, successor_port: u16, envelope: Envelope) {
    if let Err(e) = send_envelope(successor_ip, successor_port, &envelope) {
        warn!(target: "chordify", error = %e, "failed to forward envelope to successor");
    }
}

pub fn handle_insertion(
    state: &NodeState,
    store: &dyn LocalStore,
    env: InsertionEnvelope,
) -> chordify_base::Result<()> {
    let decision = route(state, env.key_hash, env.times_copied, env.origin.origin_id);
    let k = state.policy.replication_factor;

    match decision {
        RouteDecision::Head | RouteDecision::Interior => {
            let times_copied = if decision == RouteDecision::Head {
                1
            } else {
                env.times_copied + 1
            };
            apply_insert_effect(store, &env)?;
            debug!(target: "chordify", key = %env.key, times_copied, "applied insert effect");

            let ack_now = match state.policy.consistency_type {
                ConsistencyType::Linearizability => times_copied == k,
                ConsistencyType::Eventual => times_copied == 1,
            };
            if ack_now {
                send_to_origin(
                    &env.origin,
                    Envelope::InsertionResponse(InsertionResponseEnvelope {
                        key: env.key.clone(),
                        inserted: true,
                    }),
                );
            }
            if times_copied < k {
                let successor = state.successor();
                let mut next = env;
                next.times_copied = times_copied;
                forward(successor.ip, successor.port, Envelope::Insertion(next));
            }
        }
        RouteDecision::SelfWrap => {
            if state.policy.consistency_type == ConsistencyType::Linearizability {
                send_to_origin(
                    &env.origin,
                    Envelope::InsertionResponse(InsertionResponseEnvelope {
                        key: env.key,
                        inserted: true,
                    }),
                );
            }
        }
        RouteDecision::Forward => {
            let successor = state.successor();
            forward(successor.ip, successor.port, Envelope::Insertion(env));
        }
    }
    Ok(())
}

pub fn handle_deletion(
    state: &NodeState,
    store: &dyn LocalStore,
    env: DeletionEnvelope,
) -> chordify_base::Result<()> {
    let decision = route(state, env.key_hash, env.times_copied, env.origin.origin_id);
    let k = state.policy.replication_factor;

    match decision {
        RouteDecision::Head | RouteDecision::Interior => {
            let times_copied = if decision == RouteDecision::Head {
                1
            } else {
                env.times_copied + 1
            };
            store.remove_by_hash(env.key_hash)?;
            debug!(target: "chordify", key = %env.key, times_copied, "applied delete effect");

            let ack_now = match state.policy.consistency_type {
                ConsistencyType::Linearizability => times_copied == k,
                ConsistencyType::Eventual => times_copied == 1,
            };
            if ack_now {
                send_to_origin(
                    &env.origin,
                    Envelope::DeletionResponse(DeletionResponseEnvelope {
                        key: env.key.clone(),
                        deleted: true,
                    }),
                );
            }
            if times_copied < k {
                let successor = state.successor();
                let mut next = env;
                next.times_copied = times_copied;
                forward(successor.ip, successor.port, Envelope::Deletion(next));
            }
        }
        RouteDecision::SelfWrap => {
            if state.policy.consistency_type == ConsistencyType::Linearizability {
                send_to_origin(
                    &env.origin,
                    Envelope::DeletionResponse(DeletionResponseEnvelope {
                        key: env.key,
                        deleted: true,
                    }),
                );
            }
        }
        RouteDecision::Forward => {
            let successor = state.successor();
            forward(successor.ip, successor.port, Envelope::Deletion(env));
        }
    }
    Ok(())
}

pub fn handle_query(
    state: &NodeState,
    store: &dyn LocalStore,
    env: QueryEnvelope,
) -> chordify_base::Result<()> {
    let decision = route(state, env.key_hash, env.times_copied, env.origin.origin_id);
    let k = state.policy.replication_factor;

    match decision {
        RouteDecision::Head => {
            if state.policy.consistency_type == ConsistencyType::Eventual {
                respond_with_local_value(state, store, &env)?;
            } else {
                let times_copied = 1;
                if times_copied == k {
                    respond_with_local_value(state, store, &env)?;
                } else {
                    let successor = state.successor();
                    let mut next = env;
                    next.times_copied = times_copied;
                    forward(successor.ip, successor.port, Envelope::Query(next));
                }
            }
        }
        RouteDecision::Interior => {
            let times_copied = env.times_copied + 1;
            if times_copied == k {
                respond_with_local_value(state, store, &env)?;
            } else {
                let successor = state.successor();
                let mut next = env;
                next.times_copied = times_copied;
                forward(successor.ip, successor.port, Envelope::Query(next));
            }
        }
        RouteDecision::SelfWrap => {
            respond_with_local_value(state, store, &env)?;
        }
        RouteDecision::Forward => {
            let successor = state.successor();
            forward(successor.ip, successor.port, Envelope::Query(env));
        }
    }
    Ok(())
}

fn respond_with_local_value(
    state: &NodeState,
    store: &dyn LocalStore,
    env: &QueryEnvelope,
) -> chordify_base::Result<()> {
    let value = store.lookup_value_by_hash(env.key_hash)?;
    send_to_origin(
        &env.origin,
        Envelope::QueryResponse(QueryResponseEnvelope {
            key: env.key.clone(),
            value,
            ip: state.self_pos.ip,
            port: state.self_pos.port,
            id: state.self_pos.id,
        }),
    );
    Ok(())
}

fn apply_insert_effect(store: &dyn LocalStore, env: &InsertionEnvelope) -> chordify_base::Result<()> {
    let merged = match store.lookup_value_by_hash(env.key_hash)? {
        Some(old_value) => format!("{old_value}{}", env.value),
        None => env.value.clone(),
    };
    store.upsert(StoredEntry {
        key: env.key.clone(),
        key_hash: env.key_hash,
        value: merged,
    })
}
