// The wire protocol: one JSON object per connection, tagged by `type`.
// Field casing follows originIP/originPort/originReplyPort/originId;
// fields that the original Python driver wrote in snake_case
// (predecessor_ip and friends) are normalized to the same
// camelCase-with-acronym style throughout for internal consistency —
// see DESIGN.md for the naming call.

use chordify_base::{ConsistencyType, Identifier};
use serde::{Deserialize, Serialize};

/// Common fields stamped on every client-originated operation: where to
/// send the eventual reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    #[serde(rename = "originIP")]
    pub origin_ip: std::net::Ipv4Addr,
    #[serde(rename = "originPort")]
    pub origin_port: u16,
    #[serde(rename = "originReplyPort")]
    pub origin_reply_port: u16,
    #[serde(rename = "originId")]
    pub origin_id: Identifier,
    /// Forward-compatibility hook for a future reply-multiplexer design
    /// (spec.md §9): unused by this implementation, which still replies
    /// on `originReplyPort`, but accepted on deserialization and echoed
    /// back unchanged so a correlation-id-keyed node does not break one
    /// still using ephemeral reply listeners.
    #[serde(rename = "correlationId", default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<u64>,
}

/// A bare ring position as carried in wire messages (distinct from
/// `chordify_base::RingPosition` only in that it derives (de)serialize
/// with the wire's exact field names via the enclosing struct).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireNode {
    pub ip: std::net::Ipv4Addr,
    pub port: u16,
    pub id: Identifier,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinEnvelope {
    #[serde(flatten)]
    pub origin: Origin,
    #[serde(rename = "foundPredecessor")]
    pub found_predecessor: bool,
    #[serde(rename = "consistencyType", skip_serializing_if = "Option::is_none", default)]
    pub consistency_type: Option<ConsistencyType>,
    #[serde(rename = "replicationFactor", skip_serializing_if = "Option::is_none", default)]
    pub replication_factor: Option<u32>,
    #[serde(rename = "predecessorIP", skip_serializing_if = "Option::is_none", default)]
    pub predecessor_ip: Option<std::net::Ipv4Addr>,
    #[serde(rename = "predecessorPort", skip_serializing_if = "Option::is_none", default)]
    pub predecessor_port: Option<u16>,
    #[serde(rename = "predecessorId", skip_serializing_if = "Option::is_none", default)]
    pub predecessor_id: Option<Identifier>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinResponseEnvelope {
    #[serde(rename = "predecessorIP")]
    pub predecessor_ip: std::net::Ipv4Addr,
    #[serde(rename = "predecessorPort")]
    pub predecessor_port: u16,
    #[serde(rename = "predecessorId")]
    pub predecessor_id: Identifier,
    #[serde(rename = "successorIP")]
    pub successor_ip: std::net::Ipv4Addr,
    #[serde(rename = "successorPort")]
    pub successor_port: u16,
    #[serde(rename = "successorId")]
    pub successor_id: Identifier,
    #[serde(rename = "consistencyType")]
    pub consistency_type: ConsistencyType,
    #[serde(rename = "replicationFactor")]
    pub replication_factor: u32,
}

/// Departure and departure-announcement both carry the departing
/// node's own identity plus its (former) successor and predecessor.
/// Named `senderIP`/`senderPort`/`senderId`, following
/// original_source/node.py rather than the `origin*` convention, since
/// the departing node is announcing itself rather than opening a
/// client-style round trip (see DESIGN.md).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartureEnvelope {
    #[serde(rename = "senderIP")]
    pub sender_ip: std::net::Ipv4Addr,
    #[serde(rename = "senderPort")]
    pub sender_port: u16,
    #[serde(rename = "senderId")]
    pub sender_id: Identifier,
    pub successor: WireNode,
    pub predecessor: WireNode,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertionEnvelope {
    #[serde(flatten)]
    pub origin: Origin,
    pub key: String,
    #[serde(rename = "keyHash")]
    pub key_hash: Identifier,
    pub value: String,
    #[serde(rename = "timesCopied")]
    pub times_copied: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertionResponseEnvelope {
    pub key: String,
    pub inserted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionEnvelope {
    #[serde(flatten)]
    pub origin: Origin,
    pub key: String,
    #[serde(rename = "keyHash")]
    pub key_hash: Identifier,
    #[serde(rename = "timesCopied")]
    pub times_copied: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionResponseEnvelope {
    pub key: String,
    pub deleted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryEnvelope {
    #[serde(flatten)]
    pub origin: Origin,
    pub key: String,
    #[serde(rename = "keyHash")]
    pub key_hash: Identifier,
    #[serde(rename = "timesCopied")]
    pub times_copied: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponseEnvelope {
    pub key: String,
    pub value: Option<String>,
    pub ip: std::net::Ipv4Addr,
    pub port: u16,
    pub id: Identifier,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAllEnvelope {
    #[serde(flatten)]
    pub origin: Origin,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAllResponseEnvelope {
    pub id: Identifier,
    #[serde(rename = "successorId")]
    pub successor_id: Identifier,
    pub entries: Vec<(String, String)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayEnvelope {
    #[serde(flatten)]
    pub origin: Origin,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayResponseEnvelope {
    pub ip: std::net::Ipv4Addr,
    pub port: u16,
    pub id: Identifier,
    #[serde(rename = "successorIP")]
    pub successor_ip: std::net::Ipv4Addr,
    #[serde(rename = "successorPort")]
    pub successor_port: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetEnvelope {
    #[serde(flatten)]
    pub origin: Origin,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetResponseEnvelope {
    pub ip: std::net::Ipv4Addr,
    pub port: u16,
    pub id: Identifier,
    pub msg: String,
}

/// The full set of envelope types a node can send or receive, tagged
/// on the wire by `type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    #[serde(rename = "greet")]
    Greet(GreetEnvelope),
    #[serde(rename = "greet_response")]
    GreetResponse(GreetResponseEnvelope),
    #[serde(rename = "join")]
    Join(JoinEnvelope),
    #[serde(rename = "join_response")]
    JoinResponse(JoinResponseEnvelope),
    #[serde(rename = "departure")]
    Departure(DepartureEnvelope),
    #[serde(rename = "departure_announcement")]
    DepartureAnnouncement(DepartureEnvelope),
    #[serde(rename = "insertion")]
    Insertion(InsertionEnvelope),
    #[serde(rename = "insertion_response")]
    InsertionResponse(InsertionResponseEnvelope),
    #[serde(rename = "query")]
    Query(QueryEnvelope),
    #[serde(rename = "query_response")]
    QueryResponse(QueryResponseEnvelope),
    #[serde(rename = "query_all")]
    QueryAll(QueryAllEnvelope),
    #[serde(rename = "query_all_response")]
    QueryAllResponse(QueryAllResponseEnvelope),
    #[serde(rename = "deletion")]
    Deletion(DeletionEnvelope),
    #[serde(rename = "deletion_response")]
    DeletionResponse(DeletionResponseEnvelope),
    #[serde(rename = "overlay")]
    Overlay(OverlayEnvelope),
    #[serde(rename = "overlay_response")]
    OverlayResponse(OverlayResponseEnvelope),
}
