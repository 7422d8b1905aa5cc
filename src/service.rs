//! The gRPC adapter: translates `chord_proto::chord_server::Chord` calls
//! into calls against `NodeState` and the functions in `overlay`. This
//! file owns no state of its own and no business logic beyond request/
//! response shape — everything that can fail or needs a lock lives in
//! `overlay` and `node::state`.

use std::pin::Pin;
use std::sync::Arc;

use log::{debug, warn};
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};

use crate::chord_proto::chord_server::Chord;
use crate::chord_proto::{
    AddressMsg, Empty, FingerTableMsg, GetRequest, GetResponse, GetStatus, InfoResponse,
    KvPairDebugMsg, KvPairMsg, KvStoreDataResponse, KvStoreSizeResponse, LeaveNotice, NodeMsg,
    NotifyRequest, OptionalNodeMsg, PutRequest, ReplicateRequest, RingIdMsg, SuccessorListMsg,
};
use crate::node::conversions::{kv_pair_from_msg, optional_node_to_msg, ring_id_from_msg};
use crate::node::NodeState;
use crate::overlay;
use crate::pow::PowToken;

pub struct ChordService {
    pub state: Arc<NodeState>,
}

impl ChordService {
    pub fn new(state: Arc<NodeState>) -> ChordService {
        ChordService { state }
    }

    fn ensure_ready(&self) -> Result<(), Status> {
        if self.state.is_ready() {
            Ok(())
        } else {
            Err(Status::failed_precondition("node is still joining"))
        }
    }

    fn ensure_dev_mode(&self) -> Result<(), Status> {
        if self.state.config.dev_mode {
            Ok(())
        } else {
            Err(Status::permission_denied("debug introspection is disabled (dev_mode=false)"))
        }
    }
}

type NotifyStream = Pin<Box<dyn Stream<Item = Result<KvPairMsg, Status>> + Send + 'static>>;

#[tonic::async_trait]
impl Chord for ChordService {
    async fn find_successor(&self, request: Request<RingIdMsg>) -> Result<Response<NodeMsg>, Status> {
        self.ensure_ready()?;
        let key_id = ring_id_from_msg(request.get_ref());
        let owner = overlay::find_successor(&self.state, key_id).await?;
        Ok(Response::new((&owner).into()))
    }

    async fn get_predecessor(&self, _request: Request<Empty>) -> Result<Response<OptionalNodeMsg>, Status> {
        let predecessor = self.state.predecessor_snapshot();
        Ok(Response::new(optional_node_to_msg(predecessor.as_ref())))
    }

    async fn get_successor_list(&self, _request: Request<Empty>) -> Result<Response<SuccessorListMsg>, Status> {
        let successors = self.state.successor_list_snapshot().iter().map(Into::into).collect();
        Ok(Response::new(SuccessorListMsg { successors }))
    }

    async fn closest_preceding_finger(
        &self,
        request: Request<RingIdMsg>,
    ) -> Result<Response<NodeMsg>, Status> {
        let key_id = ring_id_from_msg(request.get_ref());
        let entry = self.state.closest_preceding_node(key_id);
        Ok(Response::new((&entry).into()))
    }

    type NotifyStream = NotifyStream;

    async fn notify(&self, request: Request<NotifyRequest>) -> Result<Response<Self::NotifyStream>, Status> {
        let body = request.into_inner();
        let candidate: crate::node::FingerEntry = body
            .candidate
            .ok_or_else(|| Status::invalid_argument("missing candidate"))?
            .into();

        if let Some(token_msg) = body.pow_token {
            let token = PowToken::from(token_msg);
            let (expired, meets_difficulty) = token.validate(self.state.config.pow_difficulty);
            if expired || !meets_difficulty {
                return Err(Status::resource_exhausted("proof-of-work token rejected"));
            }
        } else if self.state.config.pow_difficulty > 0 {
            return Err(Status::resource_exhausted("proof-of-work token required"));
        }

        let handoff_pairs = overlay::handle_notify(&self.state, candidate);
        debug!("notify: handing off {} keys", handoff_pairs.len());
        let messages: Vec<Result<KvPairMsg, Status>> = handoff_pairs
            .into_iter()
            .map(|(key, entry)| Ok(crate::node::conversions::kv_pair_to_msg(&key, &entry)))
            .collect();
        let stream = tokio_stream::iter(messages);
        Ok(Response::new(Box::pin(stream)))
    }

    async fn handoff(&self, request: Request<Streaming<KvPairMsg>>) -> Result<Response<Empty>, Status> {
        let mut stream = request.into_inner();
        let mut received = Vec::new();
        while let Some(pair) = stream.next().await {
            received.push(kv_pair_from_msg(pair?));
        }
        if !received.is_empty() {
            debug!("handoff: received {} keys", received.len());
            self.state.primary.lock().unwrap().merge(received);
        }
        Ok(Response::new(Empty {}))
    }

    async fn replicate(&self, request: Request<ReplicateRequest>) -> Result<Response<Empty>, Status> {
        let body = request.into_inner();
        let slot = body.slot as usize;
        let pairs: Vec<_> = body.pairs.into_iter().map(kv_pair_from_msg).collect();
        let mut replicas = self.state.replicas.lock().unwrap();
        if let Some(store) = replicas.get_mut(slot) {
            store.merge(pairs);
        } else {
            warn!("replicate: slot {slot} out of range ({} configured)", replicas.len());
        }
        Ok(Response::new(Empty {}))
    }

    async fn leave(&self, request: Request<LeaveNotice>) -> Result<Response<Empty>, Status> {
        let body = request.into_inner();
        let departing = body
            .departing
            .ok_or_else(|| Status::invalid_argument("missing departing"))?
            .into();
        let new_neighbor = body
            .new_neighbor
            .ok_or_else(|| Status::invalid_argument("missing new_neighbor"))?
            .into();
        overlay::handle_leave_notice(&self.state, departing, new_neighbor);
        Ok(Response::new(Empty {}))
    }

    async fn health(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        Ok(Response::new(Empty {}))
    }

    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        self.ensure_ready()?;
        let key = request.into_inner().key;
        let (value, status) = match overlay::get_local(&self.state, &key) {
            overlay::LookupOutcome::Found(value) => (value, GetStatus::Ok),
            overlay::LookupOutcome::NotFound => (String::new(), GetStatus::NotFound),
            overlay::LookupOutcome::Expired => (String::new(), GetStatus::Expired),
        };
        Ok(Response::new(GetResponse { value, status: status as i32 }))
    }

    async fn put(&self, request: Request<PutRequest>) -> Result<Response<Empty>, Status> {
        self.ensure_ready()?;
        let body = request.into_inner();
        let entry = overlay::put_local(&self.state, body.key.clone(), body.value, body.ttl_secs);
        let pairs = vec![(body.key, entry)];
        overlay::push_replicas(&self.state, &pairs).await;
        Ok(Response::new(Empty {}))
    }

    async fn stabilize_tick(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        overlay::stabilize(&self.state).await?;
        Ok(Response::new(Empty {}))
    }

    async fn fix_fingers_tick(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        overlay::fix_fingers(&self.state).await;
        Ok(Response::new(Empty {}))
    }

    async fn check_predecessor_tick(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        overlay::check_predecessor(&self.state).await;
        Ok(Response::new(Empty {}))
    }

    async fn admin_join(&self, request: Request<AddressMsg>) -> Result<Response<Empty>, Status> {
        let address = request.into_inner().address;
        overlay::perform_join(&self.state, &address).await?;
        Ok(Response::new(Empty {}))
    }

    async fn admin_leave(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        overlay::perform_leave(&self.state).await?;
        Ok(Response::new(Empty {}))
    }

    async fn info(&self, _request: Request<Empty>) -> Result<Response<InfoResponse>, Status> {
        let predecessor = self.state.predecessor_snapshot();
        let successors = self.state.successor_list_snapshot().iter().map(Into::into).collect();
        let fingers = self.state.fingers.lock().unwrap().fingers.iter().map(Into::into).collect();
        Ok(Response::new(InfoResponse {
            this_node: Some((&self.state.self_ref).into()),
            predecessor: Some(optional_node_to_msg(predecessor.as_ref())),
            successors: Some(SuccessorListMsg { successors }),
            fingers: Some(FingerTableMsg { fingers }),
            ready: self.state.is_ready(),
        }))
    }

    async fn get_kv_store_size(&self, _request: Request<Empty>) -> Result<Response<KvStoreSizeResponse>, Status> {
        self.ensure_dev_mode()?;
        let size = self.state.primary.lock().unwrap().len() as u32;
        Ok(Response::new(KvStoreSizeResponse { size }))
    }

    async fn get_kv_store_data(&self, _request: Request<Empty>) -> Result<Response<KvStoreDataResponse>, Status> {
        self.ensure_dev_mode()?;
        let pairs = self
            .state
            .primary
            .lock()
            .unwrap()
            .iter()
            .map(|(key, entry)| KvPairDebugMsg {
                key: String::from_utf8_lossy(key).into_owned(),
                value: entry.value.clone(),
            })
            .collect();
        Ok(Response::new(KvStoreDataResponse { pairs }))
    }
}

/// These exercise the `Chord` trait handlers directly against in-process
/// `NodeState`, without going over a socket.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn service() -> ChordService {
        ChordService::new(Arc::new(NodeState::new_ring(Config::for_tests("n:1"))))
    }

    #[tokio::test]
    async fn put_then_get_round_trips_through_the_handlers() {
        let service = service();
        service
            .put(Request::new(PutRequest { key: b"x".to_vec(), value: "1".into(), ttl_secs: 0 }))
            .await
            .unwrap();

        let response = service.get(Request::new(GetRequest { key: b"x".to_vec() })).await.unwrap().into_inner();
        assert_eq!(response.status, GetStatus::Ok as i32);
        assert_eq!(response.value, "1");
    }

    #[tokio::test]
    async fn get_of_missing_key_reports_not_found() {
        let service = service();
        let response = service.get(Request::new(GetRequest { key: b"missing".to_vec() })).await.unwrap().into_inner();
        assert_eq!(response.status, GetStatus::NotFound as i32);
    }

    #[tokio::test]
    async fn get_predecessor_starts_empty() {
        let service = service();
        let response = service.get_predecessor(Request::new(Empty {})).await.unwrap().into_inner();
        assert!(response.node.is_none());
    }

    #[tokio::test]
    async fn notify_with_no_pow_token_is_accepted_when_difficulty_is_zero() {
        let service = service();
        let self_id = service.state.id();
        let candidate = crate::node::FingerEntry::with_id(self_id.wrapping_sub(1), "n:2");
        let request = NotifyRequest { candidate: Some((&candidate).into()), pow_token: None };
        let response = service.notify(Request::new(request)).await;
        assert!(response.is_ok());
        assert_eq!(service.state.predecessor_snapshot().unwrap().id, candidate.id);
    }

    #[tokio::test]
    async fn find_successor_on_a_singleton_ring_always_returns_self() {
        let service = service();
        let self_id = service.state.id();
        let response = service
            .find_successor(Request::new(RingIdMsg { id: self_id.wrapping_add(42).to_be_bytes().to_vec() }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.id, self_id.to_be_bytes().to_vec());
    }

    #[tokio::test]
    async fn debug_introspection_is_rejected_outside_dev_mode() {
        let mut config = Config::for_tests("n:1");
        config.dev_mode = false;
        let service = ChordService::new(Arc::new(NodeState::new_ring(config)));
        let result = service.get_kv_store_size(Request::new(Empty {})).await;
        assert!(result.is_err());
    }
}
