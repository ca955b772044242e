// Ring maintenance: join and depart. Sender-side functions
// run on the joining/departing node before (join) or while (depart) it
// has a fully wired `NodeState`; ring-side handlers run in every other
// node's accept loop.

use std::net::Ipv4Addr;
use std::time::Duration;

use chordify_base::{in_half_open, Policy, RingPosition};
use chordify_net::{
    send_envelope, DepartureEnvelope, Envelope, JoinEnvelope, JoinResponseEnvelope, Origin,
    ReplyListener, WireNode,
};
use tracing::{info, warn};

use crate::state::NodeState;

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Sender-side join: open a reply listener, send the
/// initial envelope to the bootstrap, and block for the response that
/// installs this node into the ring. Returns the fully wired state.
pub fn join_via(
    self_pos: RingPosition,
    bootstrap_ip: Ipv4Addr,
    bootstrap_port: u16,
) -> chordify_base::Result<NodeState> {
    let listener = ReplyListener::bind()?;
    let reply_port = listener.port()?;

    let envelope = Envelope::Join(JoinEnvelope {
        origin: Origin {
            origin_ip: self_pos.ip,
            origin_port: self_pos.port,
            origin_reply_port: reply_port,
            origin_id: self_pos.id,
            correlation_id: None,
        },
        found_predecessor: false,
        consistency_type: None,
        replication_factor: None,
        predecessor_ip: None,
        predecessor_port: None,
        predecessor_id: None,
    });
    send_envelope(bootstrap_ip, bootstrap_port, &envelope)?;

    let reply = listener.recv(JOIN_TIMEOUT)?;
    let Envelope::JoinResponse(resp) = reply else {
        return Err(chordify_base::err("expected join_response from bootstrap"));
    };

    let successor = RingPosition {
        ip: resp.successor_ip,
        port: resp.successor_port,
        id: resp.successor_id,
    };
    let predecessor = RingPosition {
        ip: resp.predecessor_ip,
        port: resp.predecessor_port,
        id: resp.predecessor_id,
    };
    let policy = Policy::new(resp.consistency_type, resp.replication_factor);
    info!(target: "chordify", successor = %successor.id, predecessor = %predecessor.id, "joined ring");

    Ok(NodeState::joined(
        self_pos,
        successor,
        predecessor,
        policy,
        bootstrap_ip,
        bootstrap_port,
    ))
}

/// Ring-side join handling at node V (spec §4.3). `is_bootstrap`
/// selects whether this node stamps the Policy fields (only the
/// bootstrap does, and only on the first hop of a given join).
pub fn handle_join(
    state: &NodeState,
    is_bootstrap: bool,
    mut env: JoinEnvelope,
) -> chordify_base::Result<()> {
    if env.found_predecessor {
        // This node is S, the node that will become J's successor.
        let predecessor_ip = env
            .predecessor_ip
            .ok_or_else(|| chordify_base::err("join envelope has foundPredecessor=true but no predecessorIP"))?;
        let predecessor_port = env
            .predecessor_port
            .ok_or_else(|| chordify_base::err("join envelope has foundPredecessor=true but no predecessorPort"))?;
        let predecessor_id = env
            .predecessor_id
            .ok_or_else(|| chordify_base::err("join envelope has foundPredecessor=true but no predecessorId"))?;
        state.set_predecessor(RingPosition {
            ip: predecessor_ip,
            port: predecessor_port,
            id: predecessor_id,
        });

        let consistency_type = env
            .consistency_type
            .unwrap_or(state.policy.consistency_type);
        let replication_factor = env
            .replication_factor
            .unwrap_or(state.policy.replication_factor);

        let response = Envelope::JoinResponse(JoinResponseEnvelope {
            predecessor_ip,
            predecessor_port,
            predecessor_id,
            successor_ip: state.self_pos.ip,
            successor_port: state.self_pos.port,
            successor_id: state.self_pos.id,
            consistency_type,
            replication_factor,
        });
        return send_envelope(env.origin.origin_ip, env.origin.origin_reply_port, &response);
    }

    if is_bootstrap {
        env.consistency_type = Some(state.policy.consistency_type);
        env.replication_factor = Some(state.policy.replication_factor);
    }

    let j = env.origin.origin_id;
    let successor = state.successor();

    if in_half_open(j, state.self_pos.id, successor.id) {
        env.found_predecessor = true;
        env.predecessor_ip = Some(state.self_pos.ip);
        env.predecessor_port = Some(state.self_pos.port);
        env.predecessor_id = Some(state.self_pos.id);

        // Forward first, then rewire (spec §4.3 note): S must see the
        // envelope before this node's successor pointer names J.
        send_envelope(successor.ip, successor.port, &Envelope::Join(env.clone()))?;
        state.set_successor(RingPosition {
            ip: env.origin.origin_ip,
            port: env.origin.origin_port,
            id: j,
        });
    } else {
        send_envelope(successor.ip, successor.port, &Envelope::Join(env))?;
    }
    Ok(())
}

/// Sender-side depart (spec §4.3). A no-op on a singleton ring.
pub fn depart(state: &NodeState) -> chordify_base::Result<()> {
    if state.is_solo() {
        info!(target: "chordify", "departing a singleton ring, nothing to notify");
        return Ok(());
    }

    let successor = state.successor();
    let predecessor = state.predecessor();
    let envelope = DepartureEnvelope {
        sender_ip: state.self_pos.ip,
        sender_port: state.self_pos.port,
        sender_id: state.self_pos.id,
        successor: WireNode {
            ip: successor.ip,
            port: successor.port,
            id: successor.id,
        },
        predecessor: WireNode {
            ip: predecessor.ip,
            port: predecessor.port,
            id: predecessor.id,
        },
    };

    send_envelope(
        successor.ip,
        successor.port,
        &Envelope::Departure(envelope.clone()),
    )?;
    send_envelope(
        predecessor.ip,
        predecessor.port,
        &Envelope::Departure(envelope.clone()),
    )?;
    if let Err(e) = send_envelope(
        state.bootstrap_ip,
        state.bootstrap_port,
        &Envelope::DepartureAnnouncement(envelope),
    ) {
        warn!(target: "chordify", error = %e, "failed to notify bootstrap of departure");
    }
    Ok(())
}

/// Ring-side depart handling (spec §4.3): the bootstrap's
/// departure_announcement copy is informational only and must not
/// mutate ring state, so callers pass `mutate_ring = false` for it.
pub fn handle_departure(state: &NodeState, env: &DepartureEnvelope, mutate_ring: bool) {
    if !mutate_ring {
        info!(target: "chordify", departed = %env.sender_id, "received departure announcement");
        return;
    }
    if state.successor().id == env.sender_id {
        state.set_successor(RingPosition {
            ip: env.successor.ip,
            port: env.successor.port,
            id: env.successor.id,
        });
    }
    if state.predecessor().id == env.sender_id {
        state.set_predecessor(RingPosition {
            ip: env.predecessor.ip,
            port: env.predecessor.port,
            id: env.predecessor.id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chordify_base::ConsistencyType;
    use std::net::TcpListener;
    use test_log::test;

    fn pos(port: u16) -> RingPosition {
        RingPosition::new(Ipv4Addr::LOCALHOST, port)
    }

    #[test]
    fn handle_join_on_two_node_ring_forwards_then_rewires() {
        // V is the sole node in the ring; it should find itself the
        // predecessor for any incoming joiner (singleton ring case A
        // of inHalfOpen), forward to itself as successor, then rewire.
        let v = NodeState::bootstrap(pos(5000), Policy::new(ConsistencyType::Eventual, 1));

        // Stand in for "successor" (which is V itself) with a real
        // listener so the forwarded envelope can be observed.
        let successor_listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let successor_port = successor_listener.local_addr().unwrap().port();
        v.set_successor(RingPosition::new(Ipv4Addr::LOCALHOST, successor_port));

        let joiner = pos(5001);
        let env = JoinEnvelope {
            origin: Origin {
                origin_ip: joiner.ip,
                origin_port: joiner.port,
                origin_reply_port: 0,
                origin_id: joiner.id,
                correlation_id: None,
            },
            found_predecessor: false,
            consistency_type: None,
            replication_factor: None,
            predecessor_ip: None,
            predecessor_port: None,
            predecessor_id: None,
        };

        let handle = std::thread::spawn(move || {
            let (mut stream, _) = successor_listener.accept().unwrap();
            chordify_net::read_envelope(&mut stream).unwrap()
        });

        handle_join(&v, true, env).unwrap();
        let forwarded = handle.join().unwrap();

        match forwarded {
            Envelope::Join(fwd) => {
                assert!(fwd.found_predecessor);
                assert_eq!(fwd.predecessor_id, Some(v.self_pos.id));
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
        assert_eq!(v.successor().id, joiner.id);
    }

    #[test]
    fn depart_on_singleton_ring_is_a_no_op() {
        let state = NodeState::bootstrap(pos(5000), Policy::new(ConsistencyType::Eventual, 1));
        assert!(depart(&state).is_ok());
    }

    #[test]
    fn handle_departure_rewires_matching_successor_and_predecessor() {
        let state = NodeState::joined(
            pos(5000),
            pos(5001),
            pos(5002),
            Policy::new(ConsistencyType::Eventual, 1),
            Ipv4Addr::LOCALHOST,
            5000,
        );
        let departing = pos(5001);
        let new_successor = pos(5003);
        let env = DepartureEnvelope {
            sender_ip: departing.ip,
            sender_port: departing.port,
            sender_id: departing.id,
            successor: WireNode {
                ip: new_successor.ip,
                port: new_successor.port,
                id: new_successor.id,
            },
            predecessor: WireNode {
                ip: state.self_pos.ip,
                port: state.self_pos.port,
                id: state.self_pos.id,
            },
        };
        handle_departure(&state, &env, true);
        assert_eq!(state.successor().id, new_successor.id);
    }

    #[test]
    fn departure_announcement_never_mutates_ring_state() {
        let state = NodeState::joined(
            pos(5000),
            pos(5001),
            pos(5002),
            Policy::new(ConsistencyType::Eventual, 1),
            Ipv4Addr::LOCALHOST,
            5000,
        );
        let original_successor = state.successor();
        let env = DepartureEnvelope {
            sender_ip: original_successor.ip,
            sender_port: original_successor.port,
            sender_id: original_successor.id,
            successor: WireNode {
                ip: Ipv4Addr::LOCALHOST,
                port: 9999,
                id: chordify_base::Identifier::hash("unused"),
            },
            predecessor: WireNode {
                ip: state.self_pos.ip,
                port: state.self_pos.port,
                id: state.self_pos.id,
            },
        };
        handle_departure(&state, &env, false);
        assert_eq!(state.successor().id, original_successor.id);
    }
}
