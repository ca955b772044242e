// Shared harness for the end-to-end ring scenarios (spec.md §8 E1-E6):
// spin up real nodes on 127.0.0.1:0, each backed by a real redb file
// and a real accept-loop thread dispatching over loopback TCP, and
// drive them with the same client-side operations the CLI uses.

use std::net::{Ipv4Addr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use chordify_base::{in_half_open, ConsistencyType, Identifier, Policy, RingPosition};
use chordify_net::read_envelope;
use chordify_ring::NodeState;
use chordify_store::{LocalStore, RedbStore};

pub struct TestNode {
    pub state: Arc<NodeState>,
    pub store: Arc<dyn LocalStore>,
    pub ip: Ipv4Addr,
    pub port: u16,
    _dir: tempfile::TempDir,
}

fn spawn_accept_loop(listener: TcpListener, state: Arc<NodeState>, store: Arc<dyn LocalStore>, is_bootstrap: bool) {
    std::thread::spawn(move || {
        for incoming in listener.incoming() {
            let Ok(mut stream) = incoming else { continue };
            let state = Arc::clone(&state);
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                if let Ok(envelope) = read_envelope(&mut stream) {
                    chordify_ring::dispatch(&state, store.as_ref(), is_bootstrap, envelope);
                }
            });
        }
    });
}

fn open_store() -> (tempfile::TempDir, Arc<dyn LocalStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn LocalStore> = Arc::new(RedbStore::open(dir.path().join("s.redb")).unwrap());
    (dir, store)
}

pub fn start_bootstrap(consistency: ConsistencyType, k: u32) -> TestNode {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    let self_pos = RingPosition::new(Ipv4Addr::LOCALHOST, port);
    let state = Arc::new(NodeState::bootstrap(self_pos, Policy::new(consistency, k)));
    let (dir, store) = open_store();
    spawn_accept_loop(listener, Arc::clone(&state), Arc::clone(&store), true);
    TestNode { state, store, ip: Ipv4Addr::LOCALHOST, port, _dir: dir }
}

pub fn join(bootstrap: &TestNode) -> TestNode {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    let self_pos = RingPosition::new(Ipv4Addr::LOCALHOST, port);
    let state = Arc::new(chordify_ring::join_via(self_pos, bootstrap.ip, bootstrap.port).unwrap());
    let (dir, store) = open_store();
    spawn_accept_loop(listener, Arc::clone(&state), Arc::clone(&store), false);
    TestNode { state, store, ip: Ipv4Addr::LOCALHOST, port, _dir: dir }
}

/// Build a ring of `n` nodes (n >= 1), the first being the bootstrap,
/// each subsequent one joining through the bootstrap in turn.
pub fn ring_of(n: usize, consistency: ConsistencyType, k: u32) -> Vec<TestNode> {
    assert!(n >= 1);
    let mut nodes = vec![start_bootstrap(consistency, k)];
    for _ in 1..n {
        let joined = join(&nodes[0]);
        nodes.push(joined);
    }
    nodes
}

/// The index in `nodes` of the single node responsible for `key`
/// (the node whose arc `(predecessor.id, self.id]` contains its
/// hash) — used to pick a deterministic insert/query origin so
/// assertions don't depend on the arbitrary id layout the OS-assigned
/// test ports happen to produce.
pub fn responsible_index(nodes: &[TestNode], key: &str) -> usize {
    let hash = Identifier::hash(key);
    nodes
        .iter()
        .position(|n| in_half_open(hash, n.state.predecessor().id, n.state.self_pos.id))
        .expect("exactly one node must be responsible for any key on a quiescent ring")
}

/// Find the node whose own id matches `id` (e.g. to look up a node's
/// successor by the id carried in its `RingPosition`).
pub fn node_by_id(nodes: &[TestNode], id: Identifier) -> &TestNode {
    nodes
        .iter()
        .find(|n| n.state.self_pos.id == id)
        .expect("id must belong to one of the live nodes")
}

/// Poll `f` until it returns `Some`, or panic after `timeout`. Used
/// for eventual-consistency propagation assertions (spec.md E4), since
/// the successor's write arrives asynchronously after the originator's
/// ack.
pub fn wait_until<T>(timeout: Duration, mut f: impl FnMut() -> Option<T>) -> T {
    let start = std::time::Instant::now();
    loop {
        if let Some(v) = f() {
            return v;
        }
        if start.elapsed() >= timeout {
            panic!("condition not met within {timeout:?}");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}
