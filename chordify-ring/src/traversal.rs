// Full-ring walks along the successor pointer: overlay
// (topology) and query_all (every stored entry). Both share the same
// shape — ring-side handlers reply to origin and forward to successor
// — and differ only in payload and in the client's termination test.

use chordify_base::Identifier;
use chordify_net::{
    send_envelope, Envelope, OverlayEnvelope, OverlayResponseEnvelope, QueryAllEnvelope,
    QueryAllResponseEnvelope,
};
use chordify_store::LocalStore;

use crate::state::NodeState;

/// Ring-side overlay handling: reply with this node's identity and
/// successor, then forward unchanged, unless the walk has come back to
/// its originator (one full cycle completed).
pub fn handle_overlay(state: &NodeState, env: OverlayEnvelope) -> chordify_base::Result<()> {
    let successor = state.successor();
    send_envelope(
        env.origin.origin_ip,
        env.origin.origin_reply_port,
        &Envelope::OverlayResponse(OverlayResponseEnvelope {
            ip: state.self_pos.ip,
            port: state.self_pos.port,
            id: state.self_pos.id,
            successor_ip: successor.ip,
            successor_port: successor.port,
        }),
    )?;
    if state.self_pos.id != env.origin.origin_id {
        send_envelope(successor.ip, successor.port, &Envelope::Overlay(env))?;
    }
    Ok(())
}

/// Ring-side query_all handling: reply with every locally stored
/// entry plus this node's id and successor id, then forward unless
/// the walk has returned to its originator.
pub fn handle_query_all(
    state: &NodeState,
    store: &dyn LocalStore,
    env: QueryAllEnvelope,
) -> chordify_base::Result<()> {
    let successor = state.successor();
    let entries = store
        .all_entries()?
        .into_iter()
        .map(|e| (e.key, e.value))
        .collect();
    send_envelope(
        env.origin.origin_ip,
        env.origin.origin_reply_port,
        &Envelope::QueryAllResponse(QueryAllResponseEnvelope {
            id: state.self_pos.id,
            successor_id: successor.id,
            entries,
        }),
    )?;
    if state.self_pos.id != env.origin.origin_id {
        send_envelope(successor.ip, successor.port, &Envelope::QueryAll(env))?;
    }
    Ok(())
}

/// A node discovered by the overlay walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverlayNode {
    pub ip: std::net::Ipv4Addr,
    pub port: u16,
    pub id: Identifier,
    pub successor_ip: std::net::Ipv4Addr,
    pub successor_port: u16,
}

/// Client-side overlay walk: send to self.successor, accumulate
/// replies until one whose sender id equals self.id arrives (one full
/// cycle).
pub fn collect_overlay(
    state: &NodeState,
    origin_ip: std::net::Ipv4Addr,
    origin_port: u16,
    reply_port: u16,
    listener: &chordify_net::ReplyListener,
    deadline: std::time::Duration,
) -> chordify_base::Result<Vec<OverlayNode>> {
    let successor = state.successor();
    let envelope = Envelope::Overlay(OverlayEnvelope {
        origin: chordify_net::Origin {
            origin_ip,
            origin_port,
            origin_reply_port: reply_port,
            origin_id: state.self_pos.id,
            correlation_id: None,
        },
    });
    send_envelope(successor.ip, successor.port, &envelope)?;

    let mut nodes = Vec::new();
    loop {
        let reply = listener.recv(deadline)?;
        let Envelope::OverlayResponse(r) = reply else {
            return Err(chordify_base::err("expected overlay_response"));
        };
        let done = r.id == state.self_pos.id;
        nodes.push(OverlayNode {
            ip: r.ip,
            port: r.port,
            id: r.id,
            successor_ip: r.successor_ip,
            successor_port: r.successor_port,
        });
        if done {
            return Ok(nodes);
        }
    }
}

/// Client-side query_all walk: same traversal as overlay, but
/// terminates when the responder's id equals self.predecessor.id (the
/// walk has just visited the last node before self), and accumulates
/// key/value pairs instead of topology.
pub fn collect_query_all(
    state: &NodeState,
    origin_ip: std::net::Ipv4Addr,
    origin_port: u16,
    reply_port: u16,
    listener: &chordify_net::ReplyListener,
    deadline: std::time::Duration,
) -> chordify_base::Result<Vec<(String, String)>> {
    let successor = state.successor();
    let predecessor_id = state.predecessor().id;
    let envelope = Envelope::QueryAll(QueryAllEnvelope {
        origin: chordify_net::Origin {
            origin_ip,
            origin_port,
            origin_reply_port: reply_port,
            origin_id: state.self_pos.id,
            correlation_id: None,
        },
    });
    send_envelope(successor.ip, successor.port, &envelope)?;

    let mut entries = Vec::new();
    loop {
        let reply = listener.recv(deadline)?;
        let Envelope::QueryAllResponse(r) = reply else {
            return Err(chordify_base::err("expected query_all_response"));
        };
        entries.extend(r.entries);
        if r.id == predecessor_id {
            break;
        }
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.dedup_by(|a, b| a.0 == b.0);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chordify_base::{ConsistencyType, Policy, RingPosition};
    use chordify_store::{RedbStore, StoredEntry};
    use std::net::Ipv4Addr;
    use test_log::test;

    fn pos(port: u16) -> RingPosition {
        RingPosition::new(Ipv4Addr::LOCALHOST, port)
    }

    #[test]
    fn overlay_on_singleton_ring_terminates_immediately() {
        let state = NodeState::bootstrap(pos(5000), Policy::new(ConsistencyType::Eventual, 1));
        let listener = chordify_net::ReplyListener::bind().unwrap();
        let reply_port = listener.port().unwrap();

        // The successor is self, so sending to self.successor loops back
        // to this same process; run the ring-side handler inline since
        // there is no separately running accept loop in this test.
        let successor = state.successor();
        let env = OverlayEnvelope {
            origin: chordify_net::Origin {
                origin_ip: Ipv4Addr::LOCALHOST,
                origin_port: state.self_pos.port,
                origin_reply_port: reply_port,
                origin_id: state.self_pos.id,
                correlation_id: None,
            },
        };
        // Directly exercise the ring-side handler against self, as the
        // loopback accept loop would.
        assert_eq!(successor.id, state.self_pos.id);
        handle_overlay(&state, env).unwrap();

        let reply = listener.recv(std::time::Duration::from_secs(2)).unwrap();
        match reply {
            Envelope::OverlayResponse(r) => assert_eq!(r.id, state.self_pos.id),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn query_all_on_singleton_ring_returns_local_entries() {
        let (_dir, store) = {
            let dir = tempfile::tempdir().unwrap();
            let store = RedbStore::open(dir.path().join("s.redb")).unwrap();
            (dir, store)
        };
        store
            .upsert(StoredEntry {
                key: "a".into(),
                key_hash: Identifier::hash("a"),
                value: "1".into(),
            })
            .unwrap();

        let state = NodeState::bootstrap(pos(5000), Policy::new(ConsistencyType::Eventual, 1));
        let listener = chordify_net::ReplyListener::bind().unwrap();
        let reply_port = listener.port().unwrap();
        let env = QueryAllEnvelope {
            origin: chordify_net::Origin {
                origin_ip: Ipv4Addr::LOCALHOST,
                origin_port: state.self_pos.port,
                origin_reply_port: reply_port,
                origin_id: state.self_pos.id,
                correlation_id: None,
            },
        };
        handle_query_all(&state, &store, env).unwrap();

        let reply = listener.recv(std::time::Duration::from_secs(2)).unwrap();
        match reply {
            Envelope::QueryAllResponse(r) => {
                assert_eq!(r.entries, vec![("a".to_string(), "1".to_string())]);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }
}
