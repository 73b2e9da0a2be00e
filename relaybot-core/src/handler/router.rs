// ABOUTME: Message routing - selects every handler whose pattern occurs in the message body
// ABOUTME: Not first-match-wins; all matches are returned in registry order

use super::HandlerProfile;
use crate::traits::InboundMessage;

/// Every handler whose routing pattern matches `message.body`, in registry order
pub fn route<'a>(message: &InboundMessage, handlers: &'a [HandlerProfile]) -> Vec<&'a HandlerProfile> {
    handlers
        .iter()
        .filter(|handler| handler.matches(&message.body))
        .collect()
}
