// ABOUTME: Send-only mode - posts one message to a joined room and exits
// ABOUTME: Rooms the bot has not joined are rejected before anything is sent

use crate::handler::{FormatFlags, OutboundFragment, OutputFormat};
use crate::traits::{ChatRoom, ChatTransport};
use anyhow::{Context, Result};
use std::fmt;

/// Failures of send-only mode that map to a specific exit code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The target room is not among the bot's joined rooms
    RoomNotJoined(String),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoomNotJoined(room) => write!(f, "room {} is not among the joined rooms", room),
        }
    }
}

impl std::error::Error for SendError {}

/// Send `text` once, unsplit, to `room_id` in the format the flags select
pub async fn send_once<T: ChatTransport>(
    transport: &T,
    room_id: &str,
    text: &str,
    flags: FormatFlags,
) -> Result<()> {
    let Some(room) = transport.get_room(room_id).await else {
        tracing::info!(room_id = %room_id, "Room is not among the joined rooms");
        return Err(SendError::RoomNotJoined(room_id.to_string()).into());
    };

    let format = flags.resolve(OutputFormat::Text);
    tracing::debug!(room_id = %room_id, format = ?format, "Sending message");

    room.send(OutboundFragment::new(text, format).to_content())
        .await
        .with_context(|| format!("Failed to send message to {}", room_id))?;

    tracing::debug!("Message sent");
    Ok(())
}
