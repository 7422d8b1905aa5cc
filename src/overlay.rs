//! The overlay protocol: join, stabilize, fix_fingers, check_predecessor,
//! find_successor and the failure repair woven through them, plus the
//! replication bookkeeping that rides on the same membership events.
//! Every function here takes a `&NodeState` and does its own locking
//! internally; none of them hold a lock across an outbound RPC, so a slow
//! or dead peer can never stall the rest of the node.

use std::collections::HashSet;

use log::{debug, info, warn};
use tonic::Request;

use crate::chord_proto::{Empty, LeaveNotice, NotifyRequest, ReplicateRequest};
use crate::error::ChordError;
use crate::node::conversions::{kv_pair_from_msg, kv_pair_to_msg, optional_node_from_msg, ring_id_to_msg};
use crate::node::{FingerEntry, NodeState};
use crate::pow::PowToken;
use crate::ring::{finger_start, is_between, HashRingKey, RingId, RING_BITS};
use crate::store::{expiration_from_ttl, KvStore, StoredEntry};
use crate::transport::connect_with_retry;

/// Iterative lookup. Bounded to one attempt per ring bit so a
/// misbehaving ring can't spin forever; in a healthy ring this
/// terminates in O(log N) hops.
pub async fn find_successor(state: &NodeState, key_id: RingId) -> Result<FingerEntry, ChordError> {
    let successor = state.successor_snapshot();
    if is_between(key_id, state.id(), successor.id, false, true) {
        return Ok(successor);
    }

    let mut excluded: HashSet<RingId> = HashSet::new();
    for _ in 0..=RING_BITS {
        let candidate = state.closest_preceding_node_excluding(key_id, &excluded);
        if candidate.id == state.id() {
            // Degenerate progress guard: nothing closer than ourselves, so
            // our own successor is the best answer we have.
            return Ok(state.successor_snapshot());
        }

        let mut client = match connect_with_retry(&candidate.address, state.config.rpc_timeout).await {
            Ok(c) => c,
            Err(_) => {
                state.evict_dead_peer(candidate.id);
                excluded.insert(candidate.id);
                continue;
            }
        };

        match client.find_successor(Request::new(ring_id_to_msg(key_id))).await {
            Ok(response) => return Ok(response.into_inner().into()),
            Err(_) => {
                state.evict_dead_peer(candidate.id);
                excluded.insert(candidate.id);
            }
        }
    }
    Err(ChordError::Routing)
}

/// Contact `bootstrap`, adopt its answer to `FIND_SUCCESSOR(self.id)` as
/// our successor, pull its successor list, then run one stabilize round
/// before marking the node ready to serve. Returns a config error
/// (join-time rejection) if our id collides with an existing member.
pub async fn perform_join(state: &NodeState, bootstrap_addr: &str) -> Result<(), ChordError> {
    info!("joining existing ring through {bootstrap_addr}");
    let mut client = connect_with_retry(bootstrap_addr, state.config.rpc_timeout).await?;

    let successor: FingerEntry = client
        .find_successor(Request::new(ring_id_to_msg(state.id())))
        .await?
        .into_inner()
        .into();

    if successor.id == state.id() {
        return Err(ChordError::Config(format!(
            "this node's id collides with existing ring member {}; retry with a different endpoint",
            successor.address
        )));
    }

    state.successors.lock().unwrap().set_primary(successor.clone());
    state.fingers.lock().unwrap().set_all(&successor);

    if let Ok(mut successor_client) = connect_with_retry(&successor.address, state.config.rpc_timeout).await {
        if let Ok(list_reply) = successor_client.get_successor_list(Request::new(Empty {})).await {
            let reported: Vec<FingerEntry> =
                list_reply.into_inner().successors.into_iter().map(Into::into).collect();
            state.successors.lock().unwrap().rebuild(successor.clone(), &reported, state.id());
        }
    }
    push_primary_to_successors(state).await;

    // A joining node must not answer lookups for its owned range until it
    // has completed at least one stabilize round and received handoff
    // from its successor.
    stabilize(state).await?;
    state.mark_ready();
    info!("join complete, successor is {}", successor.address);
    Ok(())
}

/// One stabilize round. Walks down the successor list on repeated
/// failure, falling back to a ring of one if every successor is dead.
/// Whenever this round leaves the successor list different from how it
/// started — a new primary successor, a reshuffled tail — the node's
/// full primary store is re-pushed to the (possibly new) successors so
/// a freshly adopted successor doesn't sit with an empty replica slot
/// until some unrelated future PUT happens to repeat a key.
pub async fn stabilize(state: &NodeState) -> Result<(), ChordError> {
    loop {
        let successor_list_before = state.successor_list_snapshot();
        let successor = state.successor_snapshot();
        if successor.id == state.id() {
            return Ok(()); // ring of one: nothing to stabilize against.
        }

        let mut client = match connect_with_retry(&successor.address, state.config.rpc_timeout).await {
            Ok(c) => c,
            Err(_) => {
                if !drop_dead_successor_and_retry(state) {
                    return Ok(());
                }
                continue;
            }
        };

        let reported_predecessor = match client.get_predecessor(Request::new(Empty {})).await {
            Ok(resp) => optional_node_from_msg(resp.into_inner()),
            Err(_) => {
                if !drop_dead_successor_and_retry(state) {
                    return Ok(());
                }
                continue;
            }
        };

        if let Some(candidate) = reported_predecessor {
            if is_between(candidate.id, state.id(), successor.id, false, false) {
                debug!("stabilize: adopting {} as new successor", candidate.address);
                state.successors.lock().unwrap().set_primary(candidate);
            }
        }

        let current_successor = state.successor_snapshot();
        let mut successor_client = match connect_with_retry(&current_successor.address, state.config.rpc_timeout).await {
            Ok(c) => c,
            Err(_) => {
                if !drop_dead_successor_and_retry(state) {
                    return Ok(());
                }
                continue;
            }
        };

        let notify_request = NotifyRequest {
            candidate: Some((&state.self_ref).into()),
            pow_token: Some((&PowToken::generate(state.config.pow_difficulty)).into()),
        };

        let handoff = match successor_client.notify(Request::new(notify_request)).await {
            Ok(resp) => resp,
            Err(_) => {
                if !drop_dead_successor_and_retry(state) {
                    return Ok(());
                }
                continue;
            }
        };

        let mut stream = handoff.into_inner();
        let mut received = Vec::new();
        while let Ok(Some(pair)) = stream.message().await {
            received.push(kv_pair_from_msg(pair));
        }
        if !received.is_empty() {
            state.primary.lock().unwrap().merge(received.clone());
            // These keys are newly owned by this node (handed off by the
            // successor as part of notify's acceptance): they need a
            // fresh copy on this node's own successors, same as any other
            // newly-owned key.
            push_replicas(state, &received).await;
        }

        if let Ok(list_reply) = successor_client.get_successor_list(Request::new(Empty {})).await {
            let reported: Vec<FingerEntry> =
                list_reply.into_inner().successors.into_iter().map(Into::into).collect();
            state.successors.lock().unwrap().rebuild(current_successor, &reported, state.id());
        }

        if state.successor_list_snapshot() != successor_list_before {
            push_primary_to_successors(state).await;
        }

        return Ok(());
    }
}

/// Drops the (now known dead) primary successor and promotes the next
/// one. Returns `false` if the list is now empty (ring of one).
fn drop_dead_successor_and_retry(state: &NodeState) -> bool {
    let mut successors = state.successors.lock().unwrap();
    if successors.evict_primary() {
        true
    } else {
        successors.set_primary(state.self_ref.clone());
        false
    }
}

/// Re-pushes this node's entire primary store to its current successor
/// list. Used whenever successor-list membership changes, so a newly
/// adopted successor ends up with a full copy of what it's now
/// responsible for replicating instead of waiting for individual keys to
/// be rewritten. `push_replicas` assigns the right slot index from each
/// successor's position in the list, same as every other caller.
async fn push_primary_to_successors(state: &NodeState) {
    let pairs: Vec<(Vec<u8>, StoredEntry)> = {
        let primary = state.primary.lock().unwrap();
        primary.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    };
    push_replicas(state, &pairs).await;
}

/// Notify, received side. Adopts `candidate` as predecessor if it is a
/// closer fit, then hands off whatever this node no longer owns.
/// Idempotent: re-notifying with the same candidate after the first
/// acceptance changes nothing and triggers no further handoff.
pub fn handle_notify(state: &NodeState, candidate: FingerEntry) -> Vec<(Vec<u8>, StoredEntry)> {
    let should_adopt = {
        let predecessor = state.predecessor.lock().unwrap();
        match predecessor.as_ref() {
            None => true,
            Some(prev) => is_between(candidate.id, prev.id, state.id(), false, false),
        }
    };
    if !should_adopt {
        return Vec::new();
    }

    *state.predecessor.lock().unwrap() = Some(candidate.clone());

    let mut primary = state.primary.lock().unwrap();
    primary.drain_not_matching(|key| is_between(key.ring_id(), candidate.id, state.id(), false, true))
}

/// One fix_fingers tick: advances the round-robin cursor and refreshes a
/// single finger entry. A failed lookup leaves the stale entry in place —
/// staleness is tolerated as long as lookups keep making progress.
pub async fn fix_fingers(state: &NodeState) {
    let next = {
        let mut cursor = state.fix_finger_cursor.lock().unwrap();
        let i = *cursor;
        *cursor = (i + 1) % RING_BITS as usize;
        i
    };
    let target = finger_start(state.id(), next as u32);
    match find_successor(state, target).await {
        Ok(owner) => {
            state.fingers.lock().unwrap().set(next, owner.clone());
            if next == 0 {
                state.successors.lock().unwrap().set_primary(owner);
            }
        }
        Err(e) => warn!("fix_fingers: lookup for finger {next} failed: {e}"),
    }
}

/// One check_predecessor tick. On failure, clears the predecessor
/// pointer and triggers replica promotion.
pub async fn check_predecessor(state: &NodeState) {
    let Some(predecessor) = state.predecessor_snapshot() else { return };
    if predecessor.id == state.id() {
        return;
    }

    let alive = match connect_with_retry(&predecessor.address, state.config.rpc_timeout).await {
        Ok(mut client) => client.health(Request::new(Empty {})).await.is_ok(),
        Err(_) => false,
    };

    if !alive {
        warn!("predecessor {} presumed dead", predecessor.address);
        *state.predecessor.lock().unwrap() = None;
        promote_replica_on_predecessor_failure(state).await;
    }
}

/// On predecessor failure: promote `replicas[0]` into `primary`, shift
/// the remaining replica slots down, and push the newly-owned keys out
/// to this node's own successors as fresh replicas.
async fn promote_replica_on_predecessor_failure(state: &NodeState) {
    let promoted: Vec<(Vec<u8>, StoredEntry)> = {
        let mut replicas = state.replicas.lock().unwrap();
        if replicas.is_empty() {
            return;
        }
        let promoted_store = std::mem::take(&mut replicas[0]);
        let pairs: Vec<_> = promoted_store.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let slots = replicas.len();
        for j in 0..slots.saturating_sub(1) {
            replicas.swap(j, j + 1);
        }
        if let Some(last) = replicas.last_mut() {
            *last = KvStore::new();
        }
        pairs
    };

    if promoted.is_empty() {
        return;
    }

    info!("promoted {} replica keys after predecessor failure", promoted.len());
    state.primary.lock().unwrap().merge(promoted.clone());
    push_replicas(state, &promoted).await;
}

/// Push `pairs` out to this node's first r successors as a REPLICATE
/// batch, `slot` being this node's offset in that successor's
/// predecessor chain.
pub async fn push_replicas(state: &NodeState, pairs: &[(Vec<u8>, StoredEntry)]) {
    if pairs.is_empty() {
        return;
    }
    let successors = state.successor_list_snapshot();
    for (slot, successor) in successors.iter().enumerate() {
        if successor.id == state.id() {
            continue;
        }
        let Ok(mut client) = connect_with_retry(&successor.address, state.config.rpc_timeout).await else {
            continue;
        };
        let request = ReplicateRequest {
            slot: slot as u32,
            pairs: pairs.iter().map(|(k, v)| kv_pair_to_msg(k, v)).collect(),
        };
        if let Err(e) = client.replicate(Request::new(request)).await {
            warn!("replicate to {} failed: {e}", successor.address);
        }
    }
}

/// PUT: write locally, then best-effort push to replicas. Returns the
/// stored entry so the caller can decide whether/how to propagate it.
pub fn put_local(state: &NodeState, key: Vec<u8>, value: String, ttl_secs: u64) -> StoredEntry {
    let entry = StoredEntry { value, expires_at: expiration_from_ttl(ttl_secs) };
    state.primary.lock().unwrap().insert(key, entry.clone());
    entry
}

/// Outcome of a local store read, mirroring the wire-level `GetStatus`
/// without depending on generated code from this module.
pub enum LookupOutcome {
    Found(String),
    NotFound,
    Expired,
}

pub fn get_local(state: &NodeState, key: &[u8]) -> LookupOutcome {
    match state.primary.lock().unwrap().get(key) {
        None => LookupOutcome::NotFound,
        Some(Ok(entry)) => LookupOutcome::Found(entry.value),
        Some(Err(())) => LookupOutcome::Expired,
    }
}

/// Graceful leave: hand the full primary store to the successor, then
/// tell both neighbors to close the gap directly rather than wait for
/// stabilize to notice the departure.
pub async fn perform_leave(state: &NodeState) -> Result<(), ChordError> {
    let predecessor = state.predecessor_snapshot();
    let successor = state.successor_snapshot();

    if successor.id == state.id() {
        return Ok(()); // ring of one: nothing to hand off.
    }

    let pairs: Vec<_> = {
        let primary = state.primary.lock().unwrap();
        primary.iter().map(|(k, v)| kv_pair_to_msg(k, v)).collect()
    };

    if let Ok(mut client) = connect_with_retry(&successor.address, state.config.rpc_timeout).await {
        let stream = tokio_stream::iter(pairs);
        if let Err(e) = client.handoff(Request::new(stream)).await {
            warn!("leave: handoff to successor failed: {e}");
        }
        if let Some(pred) = &predecessor {
            let notice = LeaveNotice {
                departing: Some((&state.self_ref).into()),
                new_neighbor: Some(pred.clone().into()),
            };
            let _ = client.leave(Request::new(notice)).await;
        }
    }

    if let Some(pred) = &predecessor {
        if let Ok(mut pred_client) = connect_with_retry(&pred.address, state.config.rpc_timeout).await {
            let notice = LeaveNotice {
                departing: Some((&state.self_ref).into()),
                new_neighbor: Some((&successor).into()),
            };
            let _ = pred_client.leave(Request::new(notice)).await;
        }
    }

    Ok(())
}

/// Graceful leave, received side: update whichever of our own pointers
/// named `departing`.
pub fn handle_leave_notice(state: &NodeState, departing: FingerEntry, new_neighbor: FingerEntry) {
    let mut successors = state.successors.lock().unwrap();
    if successors.primary().id == departing.id {
        successors.set_primary(new_neighbor.clone());
    } else {
        successors.remove_if_present(departing.id);
    }
    drop(successors);

    let mut predecessor = state.predecessor.lock().unwrap();
    if predecessor.as_ref().map(|p| p.id) == Some(departing.id) {
        *predecessor = Some(new_neighbor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn notify_idempotent_after_first_acceptance() {
        let state = NodeState::new_ring(Config::for_tests("n:1"));
        let candidate = FingerEntry::with_id(state.id().wrapping_sub(100), "n:2");

        let first = handle_notify(&state, candidate.clone());
        assert_eq!(state.predecessor_snapshot().unwrap().id, candidate.id);

        let second = handle_notify(&state, candidate.clone());
        assert!(second.is_empty());
        assert_eq!(state.predecessor_snapshot().unwrap().id, candidate.id);
        let _ = first;
    }

    #[test]
    fn leave_notice_updates_successor_when_departing_was_successor() {
        let state = NodeState::new_ring(Config::for_tests("n:1"));
        let departing = state.successor_snapshot();
        let new_neighbor = FingerEntry::with_id(999, "n:3");
        handle_leave_notice(&state, departing, new_neighbor.clone());
        assert_eq!(state.successor_snapshot().id, new_neighbor.id);
    }

    #[test]
    fn leave_notice_updates_predecessor_when_departing_was_predecessor() {
        let state = NodeState::new_ring(Config::for_tests("n:1"));
        let departing = FingerEntry::with_id(5, "n:2");
        *state.predecessor.lock().unwrap() = Some(departing.clone());
        let new_neighbor = FingerEntry::with_id(999, "n:3");
        handle_leave_notice(&state, departing, new_neighbor.clone());
        assert_eq!(state.predecessor_snapshot().unwrap().id, new_neighbor.id);
    }
}
