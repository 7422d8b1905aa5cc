use std::fmt;

use serde::Serialize;

use crate::ring::{HashRingKey, RingId};

/// A `{id, endpoint}` pair — the unit every predecessor pointer, successor
/// list slot and finger table entry is made of.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct FingerEntry {
    pub id: RingId,
    pub address: String,
}

impl FingerEntry {
    pub fn new(address: impl Into<String>) -> FingerEntry {
        let address = address.into();
        let id = address.ring_id();
        FingerEntry { id, address }
    }

    pub fn with_id(id: RingId, address: impl Into<String>) -> FingerEntry {
        FingerEntry { id, address: address.into() }
    }
}

impl fmt::Debug for FingerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FingerEntry")
            .field("id", &self.id)
            .field("address", &self.address)
            .finish()
    }
}
