// Ubiquitous ring-level types shared by chordify-net, chordify-ring,
// and chordify-store. Kept separate from id.rs (the algebra) and
// error.rs (the error type) so each module has one reason to change.

use serde::{Deserialize, Serialize};

use crate::Identifier;

/// A node's position on the ring: who it is, addressable by ip/port,
/// identified by `id = hash("ip:port")`. Used for self, successor,
/// and predecessor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingPosition {
    pub ip: std::net::Ipv4Addr,
    pub port: u16,
    pub id: Identifier,
}

impl RingPosition {
    pub fn new(ip: std::net::Ipv4Addr, port: u16) -> RingPosition {
        let id = Identifier::hash(&format!("{ip}:{port}"));
        RingPosition { ip, port, id }
    }
}

/// The consistency mode authored once on the bootstrap and copied to
/// every joiner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConsistencyType {
    Linearizability,
    Eventual,
}

/// Global replication policy, immutable after the bootstrap sets it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub consistency_type: ConsistencyType,
    /// k: positive integer replication factor.
    pub replication_factor: u32,
}

impl Policy {
    pub fn new(consistency_type: ConsistencyType, replication_factor: u32) -> Policy {
        assert!(replication_factor > 0, "replicationFactor must be positive");
        Policy {
            consistency_type,
            replication_factor,
        }
    }
}
