// ABOUTME: Root library module for the relaybot Matrix bot
// ABOUTME: Matrix transport, run mode, and send-only mode on top of relaybot-core

pub mod bot;
pub mod cli;
pub mod logging;
pub mod platform;
pub mod send;

// Re-export platform-agnostic modules from relaybot-core
pub use relaybot_core::config;
pub use relaybot_core::dispatcher;
pub use relaybot_core::handler;
pub use relaybot_core::metrics;
pub use relaybot_core::paths;
pub use relaybot_core::supervisor;
pub use relaybot_core::traits;
