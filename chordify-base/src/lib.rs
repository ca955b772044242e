mod error;
mod id;
mod ring_types;

pub use error::{err, Error, Result};
pub use id::{in_half_open, Identifier, ID_BYTES};
pub use ring_types::{ConsistencyType, Policy, RingPosition};
