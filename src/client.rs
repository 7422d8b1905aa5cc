//! Thin-client helper shared by the CLI (`src/bin/cli.rs`) and the HTTP
//! operator console (`web`): resolves the owner of a key through a single
//! `FindSuccessor` call against a local node (which itself hops across
//! peers until it reaches the owner), then dials that owner directly for
//! `Get`/`Put`. Neither the CLI nor the console carries any ring logic of
//! its own — they are thin consumers of a node's admin surface, following
//! the same lookup-then-call pattern the HTTP console uses.

use std::time::Duration;

use tonic::Request;

use crate::chord_proto::{GetRequest, GetStatus, PutRequest};
use crate::error::ChordError;
use crate::node::conversions::ring_id_to_msg;
use crate::node::FingerEntry;
use crate::ring::HashRingKey;
use crate::transport::connect_with_retry;

/// Outcome of a `get`, distinguishing absent from expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetOutcome {
    Found(String),
    NotFound,
    Expired,
}

/// Asks `local_address` who owns `key`. The local node's own
/// `FindSuccessor` handler does all the multi-hop routing internally;
/// the caller only ever makes one RPC.
pub async fn resolve_owner(
    local_address: &str,
    key: &str,
    rpc_timeout: Duration,
) -> Result<FingerEntry, ChordError> {
    let key_id = key.ring_id();
    let mut client = connect_with_retry(local_address, rpc_timeout).await?;
    let owner = client
        .find_successor(Request::new(ring_id_to_msg(key_id)))
        .await?
        .into_inner();
    Ok(owner.into())
}

/// How many times to re-resolve and retry a `get` after the owner we were
/// told about turns out unreachable. Each retry re-resolves through the
/// local node, whose own routing state has by then evicted the dead
/// peer, so a retry naturally lands on whichever live node has since
/// taken over ownership or promoted the replica.
const GET_RETRY_ATTEMPTS: u32 = 3;

/// `get(key)` routed through `local_address`.
pub async fn get(local_address: &str, key: &str, rpc_timeout: Duration) -> Result<GetOutcome, ChordError> {
    let mut last_err = ChordError::Routing;
    for _ in 0..GET_RETRY_ATTEMPTS {
        let owner = resolve_owner(local_address, key, rpc_timeout).await?;
        let owner_client = connect_with_retry(&owner.address, rpc_timeout).await;
        let mut owner_client = match owner_client {
            Ok(c) => c,
            Err(e) => {
                last_err = e;
                continue;
            }
        };
        match owner_client.get(Request::new(GetRequest { key: key.as_bytes().to_vec() })).await {
            Ok(response) => {
                let response = response.into_inner();
                return Ok(match GetStatus::from_i32(response.status) {
                    Some(GetStatus::Ok) => GetOutcome::Found(response.value),
                    Some(GetStatus::Expired) => GetOutcome::Expired,
                    _ => GetOutcome::NotFound,
                });
            }
            Err(e) => last_err = e.into(),
        }
    }
    Err(last_err)
}

/// `put(key, value, ttl_secs)` routed through `local_address`.
pub async fn put(
    local_address: &str,
    key: &str,
    value: String,
    ttl_secs: u64,
    rpc_timeout: Duration,
) -> Result<(), ChordError> {
    let owner = resolve_owner(local_address, key, rpc_timeout).await?;
    let mut owner_client = connect_with_retry(&owner.address, rpc_timeout).await?;
    owner_client
        .put(Request::new(PutRequest { key: key.as_bytes().to_vec(), value, ttl_secs }))
        .await?;
    Ok(())
}

/// `lookup(key)`: same resolution as `get`/`put`, without a follow-up
/// RPC to the owner.
pub async fn lookup(local_address: &str, key: &str, rpc_timeout: Duration) -> Result<FingerEntry, ChordError> {
    resolve_owner(local_address, key, rpc_timeout).await
}
