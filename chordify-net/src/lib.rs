mod envelope;
mod transport;

pub use envelope::{
    DeletionEnvelope, DeletionResponseEnvelope, DepartureEnvelope, Envelope, GreetEnvelope,
    GreetResponseEnvelope, InsertionEnvelope, InsertionResponseEnvelope, JoinEnvelope,
    JoinResponseEnvelope, Origin, OverlayEnvelope, OverlayResponseEnvelope, QueryAllEnvelope,
    QueryAllResponseEnvelope, QueryEnvelope, QueryResponseEnvelope, WireNode,
};
pub use transport::{read_envelope, send_envelope, ReplyListener};
