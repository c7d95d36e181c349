// Transcript adapter: client messages -> model-facing history
//
// Role mapping is user -> user and assistant -> model. Only text parts are
// carried over; a message whose parts contain no text contributes nothing.

use crate::content::{TurnContent, TurnRole};
use crate::message::{Message, MessageRole};

/// Convert the client transcript into the seed conversation history.
pub fn adapt_messages(messages: &[Message]) -> Vec<TurnContent> {
    messages
        .iter()
        .filter_map(|message| {
            let text = message.text();
            if text.is_empty() {
                return None;
            }
            let role = match message.role {
                MessageRole::User => TurnRole::User,
                MessageRole::Assistant => TurnRole::Model,
            };
            Some(TurnContent {
                role,
                parts: vec![crate::content::Part::text(text)],
            })
        })
        .collect()
}
