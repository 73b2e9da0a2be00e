// ABOUTME: Send-only mode - connects, posts one message to a joined room, and exits
// ABOUTME: The message comes from --message or, failing that, all of stdin

use crate::platform::MatrixConnector;
use anyhow::{Context, Result};
use relaybot_core::config::Config;
use relaybot_core::handler::FormatFlags;
use relaybot_core::send::send_once;
use relaybot_core::Supervisor;
use std::io::Read;

/// Read the whole message from `reader`
pub fn read_message(mut reader: impl Read) -> Result<String> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .context("Failed to read message from stdin")?;
    Ok(text)
}

/// Connect (retrying like run mode does) and deliver `text` to `room_id`
pub async fn run(config: Config, room_id: &str, message: Option<String>, flags: FormatFlags) -> Result<()> {
    let text = match message {
        Some(text) => text,
        None => {
            tracing::debug!("Reading message from stdin");
            read_message(std::io::stdin().lock())?
        }
    };

    let connector = MatrixConnector::new(config.bot.clone())?;
    let supervisor = Supervisor::new(connector, config.reconnect_delay());
    let transport = supervisor.establish().await;

    send_once(&transport, room_id, &text, flags).await
}
