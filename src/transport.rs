//! The transport adapter: gRPC client connections wrapped behind a
//! single `connect`/`connect_with_retry` entry point. Every higher layer
//! that needs to talk to a peer goes through here, so this is the only
//! place network failure is surfaced — everywhere else sees
//! `ChordError::Unreachable`.

use std::time::Duration;

use log::warn;
use tokio::time::sleep;
use tonic::transport::{Channel, Endpoint};

use crate::chord_proto::chord_client::ChordClient;
use crate::error::ChordError;

const MAX_CONNECT_RETRIES: u32 = 15;
const CONNECTION_RETRY_SLEEP: Duration = Duration::from_millis(100);

pub async fn connect(address: &str, rpc_timeout: Duration) -> Result<ChordClient<Channel>, ChordError> {
    let endpoint = Endpoint::from_shared(format!("http://{address}"))?.timeout(rpc_timeout);
    let channel = endpoint
        .connect()
        .await
        .map_err(|_| ChordError::Unreachable(address.to_string()))?;
    Ok(ChordClient::new(channel))
}

/// Retries connection establishment a bounded number of times before
/// surfacing `Unreachable`, so a peer that is mid-restart doesn't fail
/// callers on the first attempt.
pub async fn connect_with_retry(address: &str, rpc_timeout: Duration) -> Result<ChordClient<Channel>, ChordError> {
    let mut attempts = 0;
    loop {
        match connect(address, rpc_timeout).await {
            Ok(client) => return Ok(client),
            Err(e) => {
                attempts += 1;
                if attempts > MAX_CONNECT_RETRIES {
                    return Err(e);
                }
                warn!("failed to connect to {address}, retrying ({attempts}/{MAX_CONNECT_RETRIES})");
                sleep(CONNECTION_RETRY_SLEEP).await;
            }
        }
    }
}
