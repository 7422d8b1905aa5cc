use crate::node::finger_entry::FingerEntry;
use crate::ring::RingId;

/// r-deep cache of consecutive clockwise neighbors, used for failure
/// tolerance when the immediate successor dies.
#[derive(Debug, Clone)]
pub struct SuccessorList {
    pub successors: Vec<FingerEntry>,
    max_len: usize,
}

impl SuccessorList {
    /// A freshly created ring of one: the node is its own only successor.
    pub fn singleton(self_entry: FingerEntry, max_len: usize) -> SuccessorList {
        SuccessorList { successors: vec![self_entry], max_len }
    }

    pub fn primary(&self) -> &FingerEntry {
        &self.successors[0]
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Adopts `new_primary` as `successors[0]`, then copies
    /// `new_primary`'s own reported successor list shifted right by one,
    /// truncated to `max_len`, dropping any reference to `self_id` (a
    /// node must never list itself as its own successor in a
    /// non-singleton ring).
    pub fn rebuild(&mut self, new_primary: FingerEntry, primarys_successors: &[FingerEntry], self_id: RingId) {
        let mut rebuilt = Vec::with_capacity(self.max_len);
        rebuilt.push(new_primary);
        for candidate in primarys_successors {
            if rebuilt.len() >= self.max_len {
                break;
            }
            if candidate.id == self_id {
                continue;
            }
            if rebuilt.iter().any(|e| e.id == candidate.id) {
                continue;
            }
            rebuilt.push(candidate.clone());
        }
        self.successors = rebuilt;
    }

    /// Drops a dead primary successor and promotes the next entry.
    /// Returns `false` if the list is left empty (caller must fall back
    /// to itself — the ring-of-one case).
    pub fn evict_primary(&mut self) -> bool {
        if self.successors.len() > 1 {
            self.successors.remove(0);
            true
        } else {
            self.successors.clear();
            false
        }
    }

    pub fn set_primary(&mut self, entry: FingerEntry) {
        if self.successors.is_empty() {
            self.successors.push(entry);
        } else {
            self.successors[0] = entry;
        }
    }

    /// Drops `id` from the list wherever it appears, without promoting a
    /// new primary the way `evict_primary` does — used when a non-primary
    /// ring neighbor is known to have departed.
    pub fn remove_if_present(&mut self, id: RingId) {
        self.successors.retain(|e| e.id != id);
    }

    pub fn as_slice(&self) -> &[FingerEntry] {
        &self.successors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: RingId) -> FingerEntry {
        FingerEntry::with_id(id, format!("n:{id}"))
    }

    #[test]
    fn singleton_list_has_one_entry() {
        let list = SuccessorList::singleton(entry(1), 3);
        assert_eq!(list.primary().id, 1);
        assert_eq!(list.as_slice().len(), 1);
    }

    #[test]
    fn rebuild_drops_self_and_truncates() {
        let mut list = SuccessorList::singleton(entry(1), 2);
        list.rebuild(entry(2), &[entry(3), entry(1), entry(4)], 1);
        let ids: Vec<RingId> = list.as_slice().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn evict_primary_promotes_next_or_reports_empty() {
        let mut list = SuccessorList::singleton(entry(1), 3);
        assert!(!list.evict_primary());
        assert!(list.as_slice().is_empty());

        let mut list = SuccessorList { successors: vec![entry(1), entry(2)], max_len: 3 };
        assert!(list.evict_primary());
        assert_eq!(list.primary().id, 2);
    }
}
