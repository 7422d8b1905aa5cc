use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::config::Config;
use crate::node::finger_entry::FingerEntry;
use crate::node::finger_table::FingerTable;
use crate::node::successor_list::SuccessorList;
use crate::ring::{is_between, HashRingKey, RingId};
use crate::store::KvStore;

/// The single serialization point for one node's routing state and
/// stores. Every field is guarded independently so an RPC handler can
/// snapshot exactly what it needs, release the lock, make an outbound
/// call, and reacquire — never holding a guard across an `.await` on the
/// network.
pub struct NodeState {
    pub self_ref: FingerEntry,
    pub predecessor: Mutex<Option<FingerEntry>>,
    pub successors: Mutex<SuccessorList>,
    pub fingers: Mutex<FingerTable>,
    pub fix_finger_cursor: Mutex<usize>,
    pub primary: Mutex<KvStore>,
    pub replicas: Mutex<Vec<KvStore>>,
    ready: AtomicBool,
    pub config: Config,
}

impl NodeState {
    /// Builds state for a brand new ring of one.
    pub fn new_ring(config: Config) -> NodeState {
        let self_ref = FingerEntry::new(config.grpc_address.clone());
        let successors = SuccessorList::singleton(self_ref.clone(), config.successor_list_len);
        let fingers = FingerTable::new(self_ref.id, &self_ref.address);
        let replicas = (0..config.successor_list_len).map(|_| KvStore::new()).collect();

        NodeState {
            self_ref,
            predecessor: Mutex::new(None),
            successors: Mutex::new(successors),
            fingers: Mutex::new(fingers),
            fix_finger_cursor: Mutex::new(0),
            primary: Mutex::new(KvStore::new()),
            replicas: Mutex::new(replicas),
            ready: AtomicBool::new(true),
            config,
        }
    }

    /// Builds state for a node about to join through `bootstrap`: same
    /// shape as `new_ring`, but not ready until the join protocol
    /// completes a stabilize round and a handoff.
    pub fn new_joining(config: Config) -> NodeState {
        let state = NodeState::new_ring(config);
        state.ready.store(false, Ordering::SeqCst);
        state
    }

    pub fn id(&self) -> RingId {
        self.self_ref.id
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn predecessor_snapshot(&self) -> Option<FingerEntry> {
        self.predecessor.lock().unwrap().clone()
    }

    pub fn successor_snapshot(&self) -> FingerEntry {
        self.successors.lock().unwrap().primary().clone()
    }

    pub fn successor_list_snapshot(&self) -> Vec<FingerEntry> {
        self.successors.lock().unwrap().as_slice().to_vec()
    }

    /// Whether this node currently owns `key_id`: `key_id ∈ (predecessor.id, self.id]`,
    /// with no predecessor meaning "owns the whole ring" (the one-node
    /// ring base case).
    pub fn owns(&self, key_id: RingId) -> bool {
        match self.predecessor_snapshot() {
            None => true,
            Some(pred) => is_between(key_id, pred.id, self.id(), false, true),
        }
    }

    /// Scans fingers from high to low, then the successor list, for the
    /// first entry strictly between self and `key_id`. Falls back to
    /// self if nothing qualifies.
    pub fn closest_preceding_node(&self, key_id: RingId) -> FingerEntry {
        self.closest_preceding_node_excluding(key_id, &std::collections::HashSet::new())
    }

    /// Same scan as `closest_preceding_node`, but skips any candidate
    /// whose id is in `excluded` — used by `find_successor`'s retry loop
    /// to avoid immediately re-selecting a peer just found dead.
    pub fn closest_preceding_node_excluding(
        &self,
        key_id: RingId,
        excluded: &std::collections::HashSet<RingId>,
    ) -> FingerEntry {
        let fingers = self.fingers.lock().unwrap().fingers.clone();
        for finger in fingers.iter().rev() {
            if finger.id == self.id() || excluded.contains(&finger.id) {
                continue;
            }
            if is_between(finger.id, self.id(), key_id, false, false) {
                return finger.clone();
            }
        }
        let successors = self.successors.lock().unwrap().as_slice().to_vec();
        for successor in successors.iter() {
            if successor.id == self.id() || excluded.contains(&successor.id) {
                continue;
            }
            if is_between(successor.id, self.id(), key_id, false, false) {
                return successor.clone();
            }
        }
        self.self_ref.clone()
    }

    /// Evicts a peer discovered dead from both the finger table (replaced
    /// by self; a stale finger is tolerated as long as lookups keep
    /// making progress) and the successor list.
    pub fn evict_dead_peer(&self, dead_id: RingId) {
        let mut successors = self.successors.lock().unwrap();
        if successors.primary().id == dead_id {
            successors.evict_primary();
            if successors.as_slice().is_empty() {
                successors.set_primary(self.self_ref.clone());
            }
        } else {
            successors.remove_if_present(dead_id);
        }
        drop(successors);

        let mut fingers = self.fingers.lock().unwrap();
        for finger in fingers.fingers.iter_mut() {
            if finger.id == dead_id {
                *finger = self.self_ref.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn fresh_ring_owns_everything() {
        let state = NodeState::new_ring(Config::for_tests("n:1"));
        assert!(state.owns(0));
        assert!(state.owns(RingId::MAX));
    }

    #[test]
    fn closest_preceding_node_on_a_singleton_ring_is_self() {
        let state = NodeState::new_ring(Config::for_tests("n:1"));
        let entry = state.closest_preceding_node(state.id().wrapping_add(100));
        assert_eq!(entry.id, state.id());
    }
}
