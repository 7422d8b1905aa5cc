//! Conversions between the domain types in `node` / `store` and the
//! generated protobuf messages they travel the wire as.

use crate::chord_proto::{KvPairMsg, NodeMsg, OptionalNodeMsg, PowTokenMsg, RingIdMsg};
use crate::node::finger_entry::FingerEntry;
use crate::pow::PowToken;
use crate::ring::RingId;
use crate::store::StoredEntry;

pub fn ring_id_to_msg(id: RingId) -> RingIdMsg {
    RingIdMsg { id: id.to_be_bytes().to_vec() }
}

pub fn ring_id_from_msg(msg: &RingIdMsg) -> RingId {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&msg.id);
    RingId::from_be_bytes(buf)
}

impl From<&FingerEntry> for NodeMsg {
    fn from(entry: &FingerEntry) -> NodeMsg {
        NodeMsg { id: entry.id.to_be_bytes().to_vec(), address: entry.address.clone() }
    }
}

impl From<FingerEntry> for NodeMsg {
    fn from(entry: FingerEntry) -> NodeMsg {
        NodeMsg::from(&entry)
    }
}

impl From<&NodeMsg> for FingerEntry {
    fn from(msg: &NodeMsg) -> FingerEntry {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&msg.id);
        FingerEntry::with_id(RingId::from_be_bytes(buf), msg.address.clone())
    }
}

impl From<NodeMsg> for FingerEntry {
    fn from(msg: NodeMsg) -> FingerEntry {
        FingerEntry::from(&msg)
    }
}

pub fn optional_node_to_msg(entry: Option<&FingerEntry>) -> OptionalNodeMsg {
    OptionalNodeMsg { node: entry.map(NodeMsg::from) }
}

pub fn optional_node_from_msg(msg: OptionalNodeMsg) -> Option<FingerEntry> {
    msg.node.map(FingerEntry::from)
}

pub fn kv_pair_to_msg(key: &[u8], entry: &StoredEntry) -> KvPairMsg {
    KvPairMsg { key: key.to_vec(), value: entry.value.clone(), expires_at: entry.expires_at }
}

pub fn kv_pair_from_msg(msg: KvPairMsg) -> (Vec<u8>, StoredEntry) {
    (msg.key, StoredEntry { value: msg.value, expires_at: msg.expires_at })
}

impl From<&PowToken> for PowTokenMsg {
    fn from(token: &PowToken) -> PowTokenMsg {
        PowTokenMsg { nonce: token.nonce.clone(), timestamp: token.timestamp }
    }
}

impl From<PowTokenMsg> for PowToken {
    fn from(msg: PowTokenMsg) -> PowToken {
        PowToken { nonce: msg.nonce, timestamp: msg.timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_id_round_trips_through_its_wire_form() {
        let id: RingId = 1234567890123;
        assert_eq!(ring_id_from_msg(&ring_id_to_msg(id)), id);
    }

    #[test]
    fn finger_entry_round_trips_through_node_msg() {
        let entry = FingerEntry::with_id(7, "127.0.0.1:4001");
        let msg: NodeMsg = entry.clone().into();
        let back: FingerEntry = msg.into();
        assert_eq!(entry, back);
    }
}
