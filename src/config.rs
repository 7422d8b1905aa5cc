use std::time::Duration;

use clap::Parser;
use ini::Ini;
use serde::Serialize;

use crate::error::ChordError;

const DEFAULT_SUCCESSOR_LIST_LEN: usize = 3;
const DEFAULT_STABILIZE_MILLIS: u64 = 500;
const DEFAULT_FIX_FINGERS_MILLIS: u64 = 500;
const DEFAULT_CHECK_PREDECESSOR_MILLIS: u64 = 1_000;
const DEFAULT_RPC_TIMEOUT_MILLIS: u64 = 1_000;
const DEFAULT_POW_DIFFICULTY: usize = 0;

/// CLI flags, parsed with `clap` and layered over an optional `.ini` file.
///
/// Flags always win over the file; the file only fills in what a flag
/// left at its default — an ini + clap split between "what operators
/// script" and "what operators type".
#[derive(Parser, Debug, Clone)]
#[command(name = "chordring", about = "A Chord distributed hash table node")]
pub struct Cli {
    /// gRPC bind address for this node, e.g. 127.0.0.1:4001
    #[arg(long)]
    pub grpc_address: String,

    /// HTTP operator console bind address, e.g. 127.0.0.1:8080
    #[arg(long)]
    pub http_address: Option<String>,

    /// Address of an existing ring member to join through. Omit to start a
    /// new ring.
    #[arg(long)]
    pub peer: Option<String>,

    /// Optional .ini file providing defaults for the fields above/below.
    #[arg(long)]
    pub config_file: Option<String>,

    #[arg(long)]
    pub successor_list_len: Option<usize>,

    #[arg(long)]
    pub stabilize_millis: Option<u64>,

    #[arg(long)]
    pub fix_fingers_millis: Option<u64>,

    #[arg(long)]
    pub check_predecessor_millis: Option<u64>,

    #[arg(long)]
    pub rpc_timeout_millis: Option<u64>,

    #[arg(long)]
    pub pow_difficulty: Option<usize>,

    /// Enables the debug-only introspection RPCs used by the cluster
    /// validation tool.
    #[arg(long, default_value_t = false)]
    pub dev_mode: bool,
}

/// The merged, immutable configuration threaded through the whole process.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub grpc_address: String,
    pub http_address: Option<String>,
    pub peer: Option<String>,
    pub successor_list_len: usize,
    pub stabilize_interval: Duration,
    pub fix_fingers_interval: Duration,
    pub check_predecessor_interval: Duration,
    pub rpc_timeout: Duration,
    pub pow_difficulty: usize,
    pub dev_mode: bool,
}

impl Config {
    /// Builds a `Config` from parsed CLI flags, filling any flag left at
    /// its default from the optional ini file named by `--config-file`.
    pub fn from_cli(cli: Cli) -> Result<Config, ChordError> {
        let ini = match &cli.config_file {
            Some(path) => Some(
                Ini::load_from_file(path)
                    .map_err(|e| ChordError::Config(format!("failed to read {path}: {e}")))?,
            ),
            None => None,
        };

        let section = ini.as_ref().and_then(|ini| ini.section(Some("chord")));
        let from_file = |key: &str| section.and_then(|s| s.get(key)).map(str::to_string);

        let successor_list_len = cli.successor_list_len.or_else(|| {
            from_file("successor_list_len").and_then(|v| v.parse().ok())
        }).unwrap_or(DEFAULT_SUCCESSOR_LIST_LEN);

        let stabilize_millis = cli.stabilize_millis.or_else(|| {
            from_file("stabilize_millis").and_then(|v| v.parse().ok())
        }).unwrap_or(DEFAULT_STABILIZE_MILLIS);

        let fix_fingers_millis = cli.fix_fingers_millis.or_else(|| {
            from_file("fix_fingers_millis").and_then(|v| v.parse().ok())
        }).unwrap_or(DEFAULT_FIX_FINGERS_MILLIS);

        let check_predecessor_millis = cli.check_predecessor_millis.or_else(|| {
            from_file("check_predecessor_millis").and_then(|v| v.parse().ok())
        }).unwrap_or(DEFAULT_CHECK_PREDECESSOR_MILLIS);

        let rpc_timeout_millis = cli.rpc_timeout_millis.or_else(|| {
            from_file("rpc_timeout_millis").and_then(|v| v.parse().ok())
        }).unwrap_or(DEFAULT_RPC_TIMEOUT_MILLIS);

        let pow_difficulty = cli.pow_difficulty.or_else(|| {
            from_file("pow_difficulty").and_then(|v| v.parse().ok())
        }).unwrap_or(DEFAULT_POW_DIFFICULTY);

        let http_address = cli.http_address.or_else(|| from_file("http_address"));
        let peer = cli.peer.or_else(|| from_file("peer"));

        if successor_list_len == 0 {
            return Err(ChordError::Config("successor_list_len must be >= 1".into()));
        }

        Ok(Config {
            grpc_address: cli.grpc_address,
            http_address,
            peer,
            successor_list_len,
            stabilize_interval: Duration::from_millis(stabilize_millis),
            fix_fingers_interval: Duration::from_millis(fix_fingers_millis),
            check_predecessor_interval: Duration::from_millis(check_predecessor_millis),
            rpc_timeout: Duration::from_millis(rpc_timeout_millis),
            pow_difficulty,
            dev_mode: cli.dev_mode,
        })
    }

    #[cfg(test)]
    pub fn for_tests(grpc_address: &str) -> Config {
        Config {
            grpc_address: grpc_address.to_string(),
            http_address: None,
            peer: None,
            successor_list_len: DEFAULT_SUCCESSOR_LIST_LEN,
            stabilize_interval: Duration::from_millis(DEFAULT_STABILIZE_MILLIS),
            fix_fingers_interval: Duration::from_millis(DEFAULT_FIX_FINGERS_MILLIS),
            check_predecessor_interval: Duration::from_millis(DEFAULT_CHECK_PREDECESSOR_MILLIS),
            rpc_timeout: Duration::from_millis(DEFAULT_RPC_TIMEOUT_MILLIS),
            pow_difficulty: 0,
            dev_mode: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_length_successor_list() {
        let cli = Cli {
            grpc_address: "127.0.0.1:4001".into(),
            http_address: None,
            peer: None,
            config_file: None,
            successor_list_len: Some(0),
            stabilize_millis: None,
            fix_fingers_millis: None,
            check_predecessor_millis: None,
            rpc_timeout_millis: None,
            pow_difficulty: None,
            dev_mode: false,
        };
        assert!(Config::from_cli(cli).is_err());
    }

    #[test]
    fn flag_defaults_apply_without_a_config_file() {
        let cli = Cli {
            grpc_address: "127.0.0.1:4001".into(),
            http_address: None,
            peer: None,
            config_file: None,
            successor_list_len: None,
            stabilize_millis: None,
            fix_fingers_millis: None,
            check_predecessor_millis: None,
            rpc_timeout_millis: None,
            pow_difficulty: None,
            dev_mode: false,
        };
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(config.successor_list_len, DEFAULT_SUCCESSOR_LIST_LEN);
        assert_eq!(config.rpc_timeout, Duration::from_millis(DEFAULT_RPC_TIMEOUT_MILLIS));
    }
}
