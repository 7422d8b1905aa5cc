pub mod chord_proto {
    tonic::include_proto!("chord");

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("chord_descriptor");
}

pub mod client;
pub mod config;
pub mod error;
pub mod node;
pub mod overlay;
pub mod pow;
pub mod ring;
pub mod service;
pub mod store;
pub mod transport;
pub mod web;

pub use chord_proto::FILE_DESCRIPTOR_SET;
pub use config::{Cli, Config};
pub use error::ChordError;
pub use node::NodeState;
pub use service::ChordService;
