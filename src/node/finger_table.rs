use crate::node::finger_entry::FingerEntry;
use crate::ring::{finger_start, RingId, RING_BITS};

/// Exponentially-spaced routing cache of `RING_BITS` entries.
///
/// `fingers[i]` names the node this node currently believes is
/// responsible for `(id + 2^i) mod 2^m`. Entries are purely derived
/// caches: staleness is tolerated, never authoritative.
#[derive(Debug, Clone)]
pub struct FingerTable {
    pub fingers: Vec<FingerEntry>,
}

impl FingerTable {
    /// Builds a finger table for a node at `id`/`address`, with every
    /// entry initially pointing at itself (ring of one, or "not yet
    /// resolved" before the join protocol fills it in).
    pub fn new(id: RingId, address: &str) -> FingerTable {
        let fingers = (0..RING_BITS)
            .map(|_| FingerEntry::with_id(id, address))
            .collect();
        FingerTable { fingers }
    }

    pub fn len(&self) -> usize {
        self.fingers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingers.is_empty()
    }

    /// The ring position the i-th finger should point at, given this
    /// table's owner id.
    pub fn start(&self, owner_id: RingId, i: usize) -> RingId {
        finger_start(owner_id, i as u32)
    }

    pub fn set(&mut self, index: usize, entry: FingerEntry) {
        self.fingers[index] = entry;
    }

    pub fn set_all(&mut self, entry: &FingerEntry) {
        for finger in &mut self.fingers {
            *finger = entry.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_table_points_every_finger_at_self() {
        let table = FingerTable::new(42, "n:1");
        assert_eq!(table.len(), RING_BITS as usize);
        assert!(table.fingers.iter().all(|f| f.id == 42));
    }

    #[test]
    fn start_positions_are_exponentially_spaced() {
        let table = FingerTable::new(0, "n:1");
        assert_eq!(table.start(0, 0), 1);
        assert_eq!(table.start(0, 1), 2);
        assert_eq!(table.start(0, 2), 4);
    }
}
