pub mod link;
pub mod manager;
pub mod messages;
pub mod retry;

pub use link::{Connector, Inbound, Link, Peer, WsConnector};
pub use manager::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState, DEFAULT_BACKEND_URL,
};
pub use messages::DetectionEvent;
pub use retry::RetryBudget;
