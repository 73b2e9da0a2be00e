// ABOUTME: Core traits separating the dispatch engine from the chat transport
// ABOUTME: ChatRoom sends content, ChatTransport lists rooms, Connector opens sessions

use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

// =============================================================================
// Message Content Types
// =============================================================================

/// Content that can be sent to a chat room
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    /// Plain text message
    Plain(String),
    /// Message with both plain text and HTML formatting
    Html { plain: String, html: String },
}

impl MessageContent {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain(text.into())
    }

    pub fn html(plain: impl Into<String>, html: impl Into<String>) -> Self {
        Self::Html {
            plain: plain.into(),
            html: html.into(),
        }
    }

    /// The plain-text rendering of this content
    pub fn body(&self) -> &str {
        match self {
            Self::Plain(text) => text,
            Self::Html { plain, .. } => plain,
        }
    }
}

// =============================================================================
// Incoming Message
// =============================================================================

/// A plain-text room message eligible for dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub room_id: String,
    pub sender: String,
    /// Message body, already trimmed
    pub body: String,
}

impl InboundMessage {
    pub fn new(room_id: impl Into<String>, sender: impl Into<String>, body: &str) -> Self {
        Self {
            room_id: room_id.into(),
            sender: sender.into(),
            body: body.trim().to_string(),
        }
    }

    /// Room and sender concatenated with no separator, as matched by access patterns
    pub fn identity(&self) -> String {
        format!("{}{}", self.room_id, self.sender)
    }
}

// =============================================================================
// Transport
// =============================================================================

/// A room the bot can post into
#[async_trait]
pub trait ChatRoom: Send + Sync + Debug {
    /// Room identifier (e.g., !abc:matrix.org)
    fn id(&self) -> &str;

    /// Send a message to this room
    async fn send(&self, content: MessageContent) -> Result<()>;
}

/// An established session with the chat network
#[async_trait]
pub trait ChatTransport: Send + Sync {
    type Room: ChatRoom;

    /// Bot's user ID on this network
    fn bot_user_id(&self) -> &str;

    /// All rooms the bot has joined
    async fn joined_rooms(&self) -> Vec<Self::Room>;

    /// Look up a joined room by ID
    async fn get_room(&self, id: &str) -> Option<Self::Room> {
        self.joined_rooms()
            .await
            .into_iter()
            .find(|room| room.id() == id)
    }
}

/// Opens transport sessions for the connection supervisor
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Send;

    /// Authenticate and establish one session; errors are transport faults
    async fn connect(&self) -> Result<Self::Session>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_message_trims_body() {
        let msg = InboundMessage::new("!room:x", "@u:x", "  !ping  \n");
        assert_eq!(msg.body, "!ping");
    }

    #[test]
    fn test_identity_has_no_separator() {
        let msg = InboundMessage::new("!room1", "@user2", "hi");
        assert_eq!(msg.identity(), "!room1@user2");
    }

    #[test]
    fn test_message_content_body() {
        assert_eq!(MessageContent::plain("hi").body(), "hi");
        assert_eq!(MessageContent::html("hi", "<b>hi</b>").body(), "hi");
    }
}
