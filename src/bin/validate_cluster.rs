//! Cluster validation tool: connects to every node address given on the
//! command line, pulls each node's `Info` (predecessor, successor list,
//! finger table), and checks the ring invariants directly — correct
//! predecessor chain, correct successor lists, and fingers that actually
//! name known ring members.

use std::env;
use std::error::Error;

use tonic::transport::Channel;
use tonic::Request;

use chordring::chord_proto::chord_client::ChordClient;
use chordring::chord_proto::{Empty, InfoResponse};
use chordring::ring::RingId;

struct NodeSummary {
    id: RingId,
    address: String,
    predecessor: Option<String>,
    successors: Vec<String>,
    fingers: Vec<RingId>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let addresses: Vec<String> = env::args().skip(1).collect();
    if addresses.is_empty() {
        eprintln!("usage: chordring-validate <address> [address...]");
        std::process::exit(1);
    }

    let mut summaries = Vec::new();
    for address in &addresses {
        let mut client: ChordClient<Channel> = ChordClient::connect(format!("http://{address}")).await?;
        let info: InfoResponse = client.info(Request::new(Empty {})).await?.into_inner();
        summaries.push(parse_summary(info));
    }

    summaries.sort_by_key(|s| s.id);
    let ring_ids: Vec<RingId> = summaries.iter().map(|s| s.id).collect();

    let mut valid = true;

    for i in 0..summaries.len() {
        let current = &summaries[i];
        let next = &summaries[(i + 1) % summaries.len()];
        match &next.predecessor {
            Some(addr) if addr == &current.address => {}
            other => {
                valid = false;
                eprintln!(
                    "node {} ({}): expected to be predecessor of {}, but its predecessor is {:?}",
                    current.address, current.id, next.address, other
                );
            }
        }
    }

    for (i, summary) in summaries.iter().enumerate() {
        for (j, successor_address) in summary.successors.iter().enumerate() {
            let expected = &summaries[(i + j + 1) % summaries.len()].address;
            if successor_address != expected {
                valid = false;
                eprintln!(
                    "node {} ({}): successor[{j}] should be {expected}, is {successor_address}",
                    summary.address, summary.id
                );
            }
        }
    }

    // Fingers are allowed to be stale as long as they still name a live
    // ring member; a finger pointing at an id nobody owns means
    // fix_fingers evicted a peer without ever re-resolving it.
    for summary in &summaries {
        for (j, finger_id) in summary.fingers.iter().enumerate() {
            if !ring_ids.contains(finger_id) {
                valid = false;
                eprintln!(
                    "node {} ({}): finger[{j}] = {finger_id} does not name any known ring member",
                    summary.address, summary.id
                );
            }
        }
    }

    if valid {
        println!("cluster looks consistent ({} nodes)", summaries.len());
        Ok(())
    } else {
        eprintln!("cluster is inconsistent");
        std::process::exit(1);
    }
}

fn parse_summary(info: InfoResponse) -> NodeSummary {
    let this_node = info.this_node.expect("node always reports itself");
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&this_node.id);
    let id = RingId::from_be_bytes(buf);

    let predecessor = info.predecessor.and_then(|p| p.node).map(|n| n.address);
    let successors = info
        .successors
        .map(|s| s.successors.into_iter().map(|n| n.address).collect())
        .unwrap_or_default();
    let fingers = info
        .fingers
        .map(|f| {
            f.fingers
                .into_iter()
                .map(|n| {
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(&n.id);
                    RingId::from_be_bytes(buf)
                })
                .collect()
        })
        .unwrap_or_default();

    NodeSummary { id, address: this_node.address, predecessor, successors, fingers }
}
