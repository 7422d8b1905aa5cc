//! Process entry point: wires together the gRPC server, the operator
//! HTTP console and the three independent periodic maintenance loops
//! around one `NodeState`. The `Arc<NodeState>` is constructed up front
//! and simply cloned into each task rather than assembled piecemeal and
//! passed across threads.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{info, warn, LevelFilter};
use tonic::transport::Server;
use tonic::Request;

use chordring::chord_proto::chord_client::ChordClient;
use chordring::chord_proto::chord_server::ChordServer;
use chordring::chord_proto::Empty;
use chordring::{web, ChordService, Cli, Config, NodeState, FILE_DESCRIPTOR_SET};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    simple_logger::SimpleLogger::new().env().with_level(LevelFilter::Info).init()?;

    let config = Config::from_cli(cli)?;
    let grpc_address = config.grpc_address.clone();
    let http_address = config.http_address.clone();
    let peer = config.peer.clone();
    let rpc_timeout = config.rpc_timeout;
    let stabilize_interval = config.stabilize_interval;
    let fix_fingers_interval = config.fix_fingers_interval;
    let check_predecessor_interval = config.check_predecessor_interval;

    let state = Arc::new(if peer.is_some() {
        NodeState::new_joining(config)
    } else {
        NodeState::new_ring(config)
    });

    info!("node id {} bound to {}", state.id(), grpc_address);

    let mut handles = Vec::new();

    handles.push(tokio::spawn(run_grpc_server(state.clone(), grpc_address.clone())));

    if let Some(http_address) = http_address {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = web::run(state, http_address).await {
                warn!("operator console exited: {e}");
            }
        }));
    }

    handles.push(tokio::spawn(run_join(state.clone(), peer, grpc_address.clone(), rpc_timeout)));
    handles.push(tokio::spawn(periodic_tick(grpc_address.clone(), rpc_timeout, stabilize_interval, "stabilize")));
    handles.push(tokio::spawn(periodic_tick(grpc_address.clone(), rpc_timeout, fix_fingers_interval, "fix_fingers")));
    handles.push(tokio::spawn(periodic_tick(grpc_address, rpc_timeout, check_predecessor_interval, "check_predecessor")));

    for handle in handles {
        handle.await?;
    }
    Ok(())
}

async fn run_grpc_server(state: Arc<NodeState>, grpc_address: String) {
    let service = ChordServer::new(ChordService::new(state));
    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build()
        .expect("failed to build gRPC reflection service");

    info!("gRPC service listening on {grpc_address}");
    Server::builder()
        .add_service(service)
        .add_service(reflection)
        .serve(grpc_address.parse().expect("invalid grpc_address"))
        .await
        .expect("gRPC server crashed");
}

/// Runs the join protocol if a bootstrap peer was given, retrying
/// against our own not-yet-accepting listener until it comes up. A
/// ring-of-one start needs no join at all; `NodeState::new_ring` is
/// already ready.
async fn run_join(state: Arc<NodeState>, peer: Option<String>, grpc_address: String, rpc_timeout: Duration) {
    let Some(bootstrap) = peer else { return };
    loop {
        match chordring::overlay::perform_join(&state, &bootstrap).await {
            Ok(()) => {
                info!("{grpc_address} joined ring through {bootstrap}");
                return;
            }
            Err(e) => {
                warn!("join through {bootstrap} failed, retrying: {e}");
                tokio::time::sleep(rpc_timeout).await;
            }
        }
    }
}

/// Drives one of the three periodic maintenance protocols by dialing
/// this node's own gRPC endpoint and invoking the matching
/// `*Tick` RPC in a loop, so maintenance mutates state through the same
/// serialization point as every peer-originated RPC. Each protocol gets
/// its own loop and its own connection so a stuck one can never block
/// the others.
async fn periodic_tick(grpc_address: String, rpc_timeout: Duration, interval: Duration, which: &'static str) {
    loop {
        match ChordClient::connect(format!("http://{grpc_address}")).await {
            Ok(mut client) => loop {
                let result = match which {
                    "stabilize" => client.stabilize_tick(Request::new(Empty {})).await,
                    "fix_fingers" => client.fix_fingers_tick(Request::new(Empty {})).await,
                    _ => client.check_predecessor_tick(Request::new(Empty {})).await,
                };
                if let Err(e) = result {
                    warn!("{which} tick failed: {e}");
                }
                tokio::time::sleep(interval).await;
            },
            Err(_) => {
                tokio::time::sleep(rpc_timeout).await;
            }
        }
    }
}
