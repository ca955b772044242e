// Client-side operations: every CLI command that touches
// the network follows the same shape — open an ephemeral reply
// listener, stamp its port as originReplyPort, send to self, block
// with a timeout, report the result.

use std::net::Ipv4Addr;
use std::time::Duration;

use chordify_base::Identifier;
use chordify_net::{
    send_envelope, DeletionEnvelope, Envelope, GreetEnvelope, GreetResponseEnvelope,
    InsertionEnvelope, Origin, QueryEnvelope, QueryResponseEnvelope, ReplyListener,
};
use chordify_store::LocalStore;

use crate::state::NodeState;
use crate::traversal::{collect_overlay, collect_query_all, OverlayNode};

const OP_TIMEOUT: Duration = Duration::from_secs(10);
const QUERY_ALL_TIMEOUT: Duration = Duration::from_secs(20);

fn origin(state: &NodeState, reply_port: u16) -> Origin {
    Origin {
        origin_ip: state.self_pos.ip,
        origin_port: state.self_pos.port,
        origin_reply_port: reply_port,
        origin_id: state.self_pos.id,
        correlation_id: None,
    }
}

/// Send one envelope to self and wait for the matching reply,
/// following the common shape of every client operation.
fn round_trip(state: &NodeState, envelope: Envelope, deadline: Duration) -> chordify_base::Result<Envelope> {
    let listener = ReplyListener::bind()?;
    let reply_port = listener.port()?;
    let envelope = stamp_reply_port(envelope, reply_port);
    send_envelope(state.self_pos.ip, state.self_pos.port, &envelope)?;
    listener.recv(deadline)
}

fn stamp_reply_port(mut envelope: Envelope, reply_port: u16) -> Envelope {
    match &mut envelope {
        Envelope::Insertion(e) => e.origin.origin_reply_port = reply_port,
        Envelope::Deletion(e) => e.origin.origin_reply_port = reply_port,
        Envelope::Query(e) => e.origin.origin_reply_port = reply_port,
        _ => {}
    }
    envelope
}

pub fn insert(state: &NodeState, key: &str, value: &str) -> chordify_base::Result<bool> {
    let key_hash = Identifier::hash(key);
    let envelope = Envelope::Insertion(InsertionEnvelope {
        origin: origin(state, 0),
        key: key.to_string(),
        key_hash,
        value: value.to_string(),
        times_copied: 0,
    });
    match round_trip(state, envelope, OP_TIMEOUT)? {
        Envelope::InsertionResponse(r) => Ok(r.inserted),
        other => Err(chordify_base::err(format!("unexpected reply to insert: {other:?}"))),
    }
}

pub fn delete(state: &NodeState, key: &str) -> chordify_base::Result<bool> {
    let key_hash = Identifier::hash(key);
    let envelope = Envelope::Deletion(DeletionEnvelope {
        origin: origin(state, 0),
        key: key.to_string(),
        key_hash,
        times_copied: 0,
    });
    match round_trip(state, envelope, OP_TIMEOUT)? {
        Envelope::DeletionResponse(r) => Ok(r.deleted),
        other => Err(chordify_base::err(format!("unexpected reply to delete: {other:?}"))),
    }
}

/// The result of a point query: the value (if present) and the
/// identity of the node that answered.
pub struct QueryResult {
    pub value: Option<String>,
    pub responder_ip: Ipv4Addr,
    pub responder_port: u16,
    pub responder_id: Identifier,
}

pub fn query(state: &NodeState, key: &str) -> chordify_base::Result<QueryResult> {
    let key_hash = Identifier::hash(key);
    let envelope = Envelope::Query(QueryEnvelope {
        origin: origin(state, 0),
        key: key.to_string(),
        key_hash,
        times_copied: 0,
    });
    match round_trip(state, envelope, OP_TIMEOUT)? {
        Envelope::QueryResponse(QueryResponseEnvelope { value, ip, port, id, .. }) => {
            Ok(QueryResult { value, responder_ip: ip, responder_port: port, responder_id: id })
        }
        other => Err(chordify_base::err(format!("unexpected reply to query: {other:?}"))),
    }
}

/// `query "*"`: every key in the ring, deduplicated and
/// sorted, via the query_all traversal. The walk itself never visits
/// the origin (it forwards unless the responder is the origin, and
/// terminates one hop earlier, at the origin's predecessor), so the
/// origin's own local shard is folded in here.
pub fn query_all(state: &NodeState, store: &dyn LocalStore) -> chordify_base::Result<Vec<(String, String)>> {
    let listener = ReplyListener::bind()?;
    let reply_port = listener.port()?;
    let mut entries = collect_query_all(
        state,
        state.self_pos.ip,
        state.self_pos.port,
        reply_port,
        &listener,
        QUERY_ALL_TIMEOUT,
    )?;
    entries.extend(
        store
            .all_entries()?
            .into_iter()
            .map(|e| (e.key, e.value)),
    );
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.dedup_by(|a, b| a.0 == b.0);
    Ok(entries)
}

/// The ring topology, via the overlay traversal.
pub fn overlay(state: &NodeState) -> chordify_base::Result<Vec<OverlayNode>> {
    let listener = ReplyListener::bind()?;
    let reply_port = listener.port()?;
    collect_overlay(
        state,
        state.self_pos.ip,
        state.self_pos.port,
        reply_port,
        &listener,
        QUERY_ALL_TIMEOUT,
    )
}

/// A liveness probe with no ring-state effect (SUPPLEMENTED FEATURES:
/// greet/greet_response, grounded on the original node.py handler).
pub fn greet(
    state: &NodeState,
    target_ip: Ipv4Addr,
    target_port: u16,
) -> chordify_base::Result<String> {
    let listener = ReplyListener::bind()?;
    let reply_port = listener.port()?;
    let envelope = Envelope::Greet(GreetEnvelope {
        origin: origin(state, reply_port),
    });
    send_envelope(target_ip, target_port, &envelope)?;
    match listener.recv(OP_TIMEOUT)? {
        Envelope::GreetResponse(GreetResponseEnvelope { msg, .. }) => Ok(msg),
        other => Err(chordify_base::err(format!("unexpected reply to greet: {other:?}"))),
    }
}

/// Ring-side greet handling: reply directly to the origin with this
/// node's identity, no ring-state effect.
pub fn handle_greet(state: &NodeState, env: GreetEnvelope) -> chordify_base::Result<()> {
    send_envelope(
        env.origin.origin_ip,
        env.origin.origin_reply_port,
        &Envelope::GreetResponse(GreetResponseEnvelope {
            ip: state.self_pos.ip,
            port: state.self_pos.port,
            id: state.self_pos.id,
            msg: "Hello from the Chord node!".to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chordify_base::{ConsistencyType, Policy, RingPosition};
    use test_log::test;

    fn pos(port: u16) -> RingPosition {
        RingPosition::new(Ipv4Addr::LOCALHOST, port)
    }

    #[test]
    fn greet_round_trips_against_a_manual_responder() {
        let state = NodeState::bootstrap(pos(5000), Policy::new(ConsistencyType::Eventual, 1));
        let target = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let target_port = target.local_addr().unwrap().port();

        let responder = std::thread::spawn(move || {
            let (mut stream, _) = target.accept().unwrap();
            let env = chordify_net::read_envelope(&mut stream).unwrap();
            let Envelope::Greet(greet) = env else { panic!("expected greet") };
            send_envelope(
                greet.origin.origin_ip,
                greet.origin.origin_reply_port,
                &Envelope::GreetResponse(GreetResponseEnvelope {
                    ip: Ipv4Addr::LOCALHOST,
                    port: target_port,
                    id: Identifier::hash("responder"),
                    msg: "Hello from the Chord node!".to_string(),
                }),
            )
            .unwrap();
        });

        let msg = greet(&state, Ipv4Addr::LOCALHOST, target_port).unwrap();
        responder.join().unwrap();
        assert_eq!(msg, "Hello from the Chord node!");
    }
}
