// ABOUTME: Matrix platform implementation of the relaybot transport traits
// ABOUTME: Wraps matrix_sdk rooms and clients, and turns sync events into dispatch work

pub mod client;

pub use client::{create_client, login};

use anyhow::{Context, Result};
use async_trait::async_trait;
use matrix_sdk::{
    config::SyncSettings,
    room::Room,
    ruma::{
        events::room::{
            encrypted::OriginalSyncRoomEncryptedEvent,
            member::{MembershipState, OriginalSyncRoomMemberEvent, StrippedRoomMemberEvent},
            message::{MessageType, OriginalSyncRoomMessageEvent, RoomMessageEventContent},
        },
        OwnedRoomId,
    },
    Client, RoomState,
};
use regex::Regex;
use relaybot_core::config::BotConfig;
use relaybot_core::traits::{ChatRoom, ChatTransport, Connector, InboundMessage, MessageContent};
use relaybot_core::Inbound;
use std::fmt;
use tokio::sync::mpsc;

// =============================================================================
// MatrixRoom - Implements ChatRoom
// =============================================================================

#[derive(Clone)]
pub struct MatrixRoom {
    room: Room,
}

impl MatrixRoom {
    pub fn new(room: Room) -> Self {
        Self { room }
    }
}

impl fmt::Debug for MatrixRoom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatrixRoom")
            .field("room_id", &self.room.room_id().as_str())
            .finish()
    }
}

#[async_trait]
impl ChatRoom for MatrixRoom {
    fn id(&self) -> &str {
        self.room.room_id().as_str()
    }

    async fn send(&self, content: MessageContent) -> Result<()> {
        let msg_content = match content {
            MessageContent::Plain(text) => RoomMessageEventContent::text_plain(text),
            MessageContent::Html { plain, html } => RoomMessageEventContent::text_html(plain, html),
        };

        self.room
            .send(msg_content)
            .await
            .context("Failed to send message")?;

        Ok(())
    }
}

// =============================================================================
// MatrixTransport - Implements ChatTransport
// =============================================================================

/// A logged-in, initially synced Matrix session
#[derive(Clone)]
pub struct MatrixTransport {
    client: Client,
    user_id: String,
    sync_token: String,
}

impl MatrixTransport {
    /// Register message handlers that queue eligible messages onto `tx`
    pub fn listen(&self, tx: mpsc::Sender<Inbound<MatrixRoom>>) {
        let bot_user_id = self.user_id.clone();

        self.client.add_event_handler(
            move |event: OriginalSyncRoomMessageEvent, room: Room| {
                let tx = tx.clone();
                let bot_user_id = bot_user_id.clone();
                async move {
                    if event.sender.as_str() == bot_user_id {
                        return;
                    }

                    let MessageType::Text(text) = &event.content.msgtype else {
                        tracing::debug!(
                            room_id = %room.room_id(),
                            sender = %event.sender,
                            msgtype = %event.content.msgtype(),
                            "Ignoring non-text message"
                        );
                        return;
                    };

                    let message =
                        InboundMessage::new(room.room_id().as_str(), event.sender.as_str(), &text.body);
                    tracing::debug!(
                        room_id = %message.room_id,
                        sender = %message.sender,
                        body = %message.body,
                        "Received message"
                    );

                    let inbound = Inbound {
                        room: MatrixRoom::new(room),
                        message,
                    };
                    if tx.send(inbound).await.is_err() {
                        tracing::warn!("Dispatch queue closed, dropping message");
                    }
                }
            },
        );

        self.client.add_event_handler(
            |event: OriginalSyncRoomEncryptedEvent, room: Room| async move {
                tracing::debug!(
                    room_id = %room.room_id(),
                    sender = %event.sender,
                    event_id = %event.event_id,
                    "Ignoring encrypted event"
                );
            },
        );
    }

    /// Run the sync loop from the initial sync's batch token until it fails
    pub async fn sync(&self) -> Result<()> {
        let settings = SyncSettings::default().token(self.sync_token.clone());
        self.client
            .sync(settings)
            .await
            .context("Sync loop failed")?;
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for MatrixTransport {
    type Room = MatrixRoom;

    fn bot_user_id(&self) -> &str {
        &self.user_id
    }

    async fn joined_rooms(&self) -> Vec<MatrixRoom> {
        self.client
            .joined_rooms()
            .into_iter()
            .map(MatrixRoom::new)
            .collect()
    }

    async fn get_room(&self, id: &str) -> Option<MatrixRoom> {
        let room_id: OwnedRoomId = id.parse().ok()?;
        let room = self.client.get_room(&room_id)?;
        (room.state() == RoomState::Joined).then(|| MatrixRoom::new(room))
    }
}

// =============================================================================
// MatrixConnector - Implements Connector
// =============================================================================

pub struct MatrixConnector {
    config: BotConfig,
    inviter: Option<Regex>,
    membership: bool,
}

impl MatrixConnector {
    pub fn new(config: BotConfig) -> Result<Self> {
        let inviter = config
            .inviter
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("Invalid inviter pattern")?;
        Ok(Self {
            config,
            inviter,
            membership: false,
        })
    }

    /// Also answer invites and log removals on every session this connector opens
    pub fn with_membership_handling(mut self) -> Self {
        self.membership = true;
        self
    }

    fn register_membership_handlers(&self, client: &Client) {
        let inviter = self.inviter.clone();
        client.add_event_handler(
            move |event: StrippedRoomMemberEvent, room: Room, client: Client| {
                let inviter = inviter.clone();
                async move {
                    if event.content.membership != MembershipState::Invite {
                        return;
                    }
                    if client.user_id() != Some(&*event.state_key) {
                        return;
                    }
                    if room.state() != RoomState::Invited {
                        return;
                    }

                    if !invite_allowed(inviter.as_ref(), event.sender.as_str()) {
                        tracing::info!(
                            room_id = %room.room_id(),
                            inviter = %event.sender,
                            "Ignoring invite from unauthorized user"
                        );
                        return;
                    }

                    tracing::info!(
                        room_id = %room.room_id(),
                        inviter = %event.sender,
                        "Joining room"
                    );
                    if let Err(e) = room.join().await {
                        tracing::error!(
                            room_id = %room.room_id(),
                            error = %e,
                            "Failed to join room"
                        );
                    }
                }
            },
        );

        client.add_event_handler(
            |event: OriginalSyncRoomMemberEvent, room: Room, client: Client| async move {
                if client.user_id() != Some(&*event.state_key) {
                    return;
                }
                match event.content.membership {
                    MembershipState::Leave if event.sender == event.state_key => {
                        tracing::info!(room_id = %room.room_id(), "Left room");
                    }
                    MembershipState::Leave => {
                        tracing::info!(
                            room_id = %room.room_id(),
                            by = %event.sender,
                            "Kicked from room"
                        );
                    }
                    MembershipState::Ban => {
                        tracing::info!(
                            room_id = %room.room_id(),
                            by = %event.sender,
                            "Banned from room"
                        );
                    }
                    _ => {}
                }
            },
        );
    }
}

#[async_trait]
impl Connector for MatrixConnector {
    type Session = MatrixTransport;

    async fn connect(&self) -> Result<MatrixTransport> {
        tracing::info!(
            homeserver = %self.config.base_url,
            user_id = %self.config.user_id,
            "Connecting"
        );

        let client = create_client(&self.config).await?;
        login(&client, &self.config).await?;
        let user_id = client
            .user_id()
            .map(|id| id.to_string())
            .context("Logged-in client has no user ID")?;

        // Invites that arrived while offline are delivered by the initial sync
        if self.membership {
            self.register_membership_handlers(&client);
        }

        let response = client
            .sync_once(SyncSettings::default())
            .await
            .context("Initial sync failed")?;

        tracing::info!(rooms = client.joined_rooms().len(), "Initial sync complete");

        Ok(MatrixTransport {
            client,
            user_id,
            sync_token: response.next_batch,
        })
    }
}

/// Whether an invite from `inviter` should be accepted
pub fn invite_allowed(pattern: Option<&Regex>, inviter: &str) -> bool {
    pattern.map_or(true, |re| re.is_match(inviter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invite_allowed_without_pattern() {
        assert!(invite_allowed(None, "@anyone:example.org"));
    }

    #[test]
    fn test_invite_allowed_searches_inviter() {
        let re = Regex::new(r":example\.org$").unwrap();
        assert!(invite_allowed(Some(&re), "@alice:example.org"));
        assert!(!invite_allowed(Some(&re), "@mallory:evil.org"));
    }

    #[test]
    fn test_matrix_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MatrixRoom>();
        assert_send_sync::<MatrixTransport>();
        assert_send_sync::<MatrixConnector>();
    }
}
