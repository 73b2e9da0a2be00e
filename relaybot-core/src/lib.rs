// ABOUTME: Platform-agnostic dispatch engine for script-driven chat bots
// ABOUTME: Discovers handler programs, routes messages to them, and relays their output

pub mod config;
pub mod dispatcher;
pub mod handler;
pub mod metrics;
pub mod paths;
pub mod send;
pub mod supervisor;
pub mod traits;

pub use dispatcher::{Dispatcher, Inbound};
pub use supervisor::{ConnectionState, Supervisor};

// Re-export core traits for convenient access
pub use traits::{ChatRoom, ChatTransport, Connector, InboundMessage, MessageContent};
