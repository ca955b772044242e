// A node's view of the ring: who it is, who its neighbors are, and the
// replication policy inherited at join time. Mutated by ring
// maintenance (join/depart) and read by the router on every hop, so
// the neighbor pointers live behind a single `RwLock`: updates to
// successor/predecessor must serialize against concurrent readers.

use std::net::Ipv4Addr;
use std::sync::RwLock;

use chordify_base::{Policy, RingPosition};

struct Neighbors {
    successor: RingPosition,
    predecessor: RingPosition,
}

/// The fixed address every node uses to reach the well-known
/// bootstrap, for `departure_announcement`. Not
/// necessarily the node this instance joined through, if joins chain
/// through intermediate nodes.
pub struct NodeState {
    pub self_pos: RingPosition,
    pub bootstrap_ip: Ipv4Addr,
    pub bootstrap_port: u16,
    pub policy: Policy,
    neighbors: RwLock<Neighbors>,
}

impl NodeState {
    /// The bootstrap's own state: a singleton ring, predecessor and
    /// successor both self (the singleton "solo" ring).
    pub fn bootstrap(self_pos: RingPosition, policy: Policy) -> NodeState {
        NodeState {
            bootstrap_ip: self_pos.ip,
            bootstrap_port: self_pos.port,
            policy,
            neighbors: RwLock::new(Neighbors {
                successor: self_pos,
                predecessor: self_pos,
            }),
            self_pos,
        }
    }

    pub fn joined(
        self_pos: RingPosition,
        successor: RingPosition,
        predecessor: RingPosition,
        policy: Policy,
        bootstrap_ip: Ipv4Addr,
        bootstrap_port: u16,
    ) -> NodeState {
        NodeState {
            bootstrap_ip,
            bootstrap_port,
            policy,
            neighbors: RwLock::new(Neighbors {
                successor,
                predecessor,
            }),
            self_pos,
        }
    }

    pub fn successor(&self) -> RingPosition {
        self.neighbors.read().unwrap().successor
    }

    pub fn predecessor(&self) -> RingPosition {
        self.neighbors.read().unwrap().predecessor
    }

    pub fn set_successor(&self, successor: RingPosition) {
        self.neighbors.write().unwrap().successor = successor;
    }

    pub fn set_predecessor(&self, predecessor: RingPosition) {
        self.neighbors.write().unwrap().predecessor = predecessor;
    }

    /// Whether this node is the only one in the ring.
    pub fn is_solo(&self) -> bool {
        self.successor().id == self.self_pos.id
    }
}
