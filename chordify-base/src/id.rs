// The 160-bit identifier space the ring is keyed by, and the single
// arc predicate ("is x in (a, b] on the ring") that every responsibility
// decision in chordify-ring must route through.

use std::fmt;

use num_bigint::BigUint;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};

/// Number of bytes in a 160-bit identifier.
pub const ID_BYTES: usize = 20;

/// A point on the Chord ring: a 160-bit non-negative integer, stored
/// big-endian so that byte-lexicographic order matches numeric order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Identifier([u8; ID_BYTES]);

impl Identifier {
    pub const ZERO: Identifier = Identifier([0u8; ID_BYTES]);

    /// `hash(s)`: SHA-1 of the UTF-8 bytes of `s`, taken modulo 2^160
    /// (SHA-1's output is already 160 bits, so this is just "interpret
    /// the digest as the identifier").
    pub fn hash(s: &str) -> Identifier {
        let mut hasher = Sha1::new();
        hasher.update(s.as_bytes());
        let digest = hasher.finalize();
        Identifier(digest.into())
    }

    pub fn from_be_bytes(bytes: [u8; ID_BYTES]) -> Identifier {
        Identifier(bytes)
    }

    pub fn to_be_bytes(self) -> [u8; ID_BYTES] {
        self.0
    }

    pub fn to_decimal_string(self) -> String {
        BigUint::from_bytes_be(&self.0).to_str_radix(10)
    }

    pub fn from_decimal_string(s: &str) -> Result<Identifier, crate::Error> {
        let n = s
            .parse::<BigUint>()
            .map_err(|e| crate::err(format!("invalid identifier {s:?}: {e}")))?;
        let be = n.to_bytes_be();
        if be.len() > ID_BYTES {
            return Err(crate::err(format!(
                "identifier {s:?} does not fit in {} bits",
                ID_BYTES * 8
            )));
        }
        let mut bytes = [0u8; ID_BYTES];
        bytes[ID_BYTES - be.len()..].copy_from_slice(&be);
        Ok(Identifier(bytes))
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.to_decimal_string())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal_string())
    }
}

// Identifiers are always encoded as decimal integers on the wire, not
// as strings or hex. serde_json's arbitrary-precision number support
// lets us round-trip the full 160 bits as a bare JSON number.
impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let number: serde_json::Number = serde_json::from_str(&self.to_decimal_string())
            .map_err(serde::ser::Error::custom)?;
        number.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let number = serde_json::Number::deserialize(deserializer)?;
        Identifier::from_decimal_string(&number.to_string()).map_err(D::Error::custom)
    }
}

/// "x is in the arc (a, b]" — the sole admissible responsibility test.
/// A singleton ring (a == b) contains every x.
pub fn in_half_open(x: Identifier, a: Identifier, b: Identifier) -> bool {
    if a == b {
        true
    } else if a < b {
        a < x && x <= b
    } else {
        x > a || x <= b
    }
}
