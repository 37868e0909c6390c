//! In-memory registry of relay clients and channels.

mod channel;
mod connection;
mod sessions;


pub use channel::ChannelTable;
pub use connection::{Outbound, OutboundTx, RelayClient};
pub use sessions::{
    CLIENT_ID_BYTES, ConnectionRegistry, MAX_ID_ATTEMPTS, RegistryError, generate_client_id,
};
