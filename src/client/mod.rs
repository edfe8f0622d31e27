// Module declarations
mod builder;
mod connection;
mod core;
mod state;

// Public API exports
pub use builder::{SocketClientBuilder, SocketClientOptions};
pub use connection::ConnectionManager;
pub use self::core::SocketClient;
pub use state::{ClientState, ConnectionState, LifecycleState};
