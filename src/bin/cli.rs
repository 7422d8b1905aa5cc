//! The interactive command-line front-end: a thin client that dials a
//! running node's gRPC admin surface and issues one
//! `join/leave/put/get/lookup/info` request per invocation. All routing
//! happens inside the node it talks to (`client::resolve_owner`) or
//! inside the overlay itself (`FindSuccessor`'s own multi-hop
//! forwarding) — this binary contains no ring logic of its own.

use std::error::Error;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tonic::Request;

use chordring::chord_proto::chord_client::ChordClient;
use chordring::chord_proto::{AddressMsg, Empty};
use chordring::client;

#[derive(Parser, Debug)]
#[command(name = "chordring-cli", about = "Thin client for a running chordring node")]
struct Args {
    /// gRPC address of the local node to talk to, e.g. 127.0.0.1:4001
    #[arg(long)]
    address: String,

    /// Per-RPC timeout, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    timeout_millis: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Join an existing ring through `bootstrap`.
    Join { bootstrap: String },
    /// Leave the ring gracefully.
    Leave,
    /// Store `value` under `key`, with an optional TTL in seconds.
    Put { key: String, value: String, #[arg(long, default_value_t = 0)] ttl_secs: u64 },
    /// Fetch the value stored under `key`.
    Get { key: String },
    /// Resolve which node currently owns `key`.
    Lookup { key: String },
    /// Print predecessor, successor list and finger table.
    Info,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let timeout = Duration::from_millis(args.timeout_millis);

    match args.command {
        Command::Join { bootstrap } => {
            let mut grpc_client = ChordClient::connect(format!("http://{}", args.address)).await?;
            grpc_client.admin_join(Request::new(AddressMsg { address: bootstrap })).await?;
            println!("join requested");
        }
        Command::Leave => {
            let mut grpc_client = ChordClient::connect(format!("http://{}", args.address)).await?;
            grpc_client.admin_leave(Request::new(Empty {})).await?;
            println!("leave requested");
        }
        Command::Put { key, value, ttl_secs } => {
            client::put(&args.address, &key, value, ttl_secs, timeout).await?;
            println!("ok");
        }
        Command::Get { key } => match client::get(&args.address, &key, timeout).await? {
            client::GetOutcome::Found(value) => println!("{value}"),
            client::GetOutcome::NotFound => println!("(not found)"),
            client::GetOutcome::Expired => println!("(expired)"),
        },
        Command::Lookup { key } => {
            let owner = client::lookup(&args.address, &key, timeout).await?;
            println!("{} ({})", owner.address, owner.id);
        }
        Command::Info => {
            let mut grpc_client = ChordClient::connect(format!("http://{}", args.address)).await?;
            let info = grpc_client.info(Request::new(Empty {})).await?.into_inner();
            if let Some(this_node) = &info.this_node {
                println!("id: {}", u64::from_be_bytes(this_node.id.clone().try_into().unwrap_or([0; 8])));
                println!("address: {}", this_node.address);
            }
            println!("ready: {}", info.ready);
            match info.predecessor.and_then(|p| p.node) {
                Some(pred) => println!("predecessor: {}", pred.address),
                None => println!("predecessor: (none)"),
            }
            if let Some(successors) = info.successors {
                println!("successors:");
                for s in successors.successors {
                    println!("  {}", s.address);
                }
            }
            if let Some(fingers) = info.fingers {
                println!("fingers: {} entries", fingers.fingers.len());
            }
        }
    }

    Ok(())
}
