//! Decides which messages get an answer and keeps the conversation history.

use crate::memory::{ConversationMemory, HistoryStore, Turn};
use crate::message::{ChannelMessage, OutgoingMessage};
use crate::responder::Responder;
use crate::traits::{ChannelResult, MessageHandler};
use async_trait::async_trait;
use parley_common::IrcConfig;

/// Routes keyword-matching messages to the responder.
///
/// Matching is a plain substring test on the lower-cased text, so the
/// keyword "bot" also fires on "robotics".
pub struct Dispatcher<R, S> {
    nickname: String,
    keywords: Vec<String>,
    recall_depth: usize,
    responder: R,
    memory: ConversationMemory<S>,
}

impl<R: Responder, S: HistoryStore> Dispatcher<R, S> {
    pub fn new(
        config: &IrcConfig,
        recall_depth: usize,
        responder: R,
        memory: ConversationMemory<S>,
    ) -> Self {
        let keywords = config
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        Self {
            nickname: config.nickname.clone(),
            keywords,
            recall_depth,
            responder,
            memory,
        }
    }

    /// Whether `text` contains any configured keyword.
    pub fn is_triggered(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }

    /// Key under which the conversation is remembered and answered.
    ///
    /// Private messages are keyed by the sender, channel messages by the
    /// channel.
    pub fn conversation_identity<'a>(&self, message: &'a ChannelMessage) -> &'a str {
        if message.is_private_to(&self.nickname) {
            &message.sender
        } else {
            &message.channel
        }
    }

    pub fn memory(&self) -> &ConversationMemory<S> {
        &self.memory
    }

    pub fn responder(&self) -> &R {
        &self.responder
    }

    async fn remember(&self, identity: &str, turn: Turn) {
        let role = turn.role.as_str();
        if let Err(e) = self.memory.append(identity, turn).await {
            tracing::warn!(identity = %identity, role, error = %e, "Failed to persist turn");
        }
    }
}

#[async_trait]
impl<R: Responder, S: HistoryStore> MessageHandler for Dispatcher<R, S> {
    async fn handle(&self, message: ChannelMessage) -> ChannelResult<Option<OutgoingMessage>> {
        if !self.is_triggered(&message.text) {
            return Ok(None);
        }

        let identity = self.conversation_identity(&message).to_string();
        let question = message.text.trim().to_string();
        let history = self.memory.recent(&identity, self.recall_depth);

        tracing::info!(
            identity = %identity,
            sender = %message.sender,
            history = history.len(),
            "Answering message"
        );

        let reply = self.responder.respond(&question, &history).await;

        self.remember(&identity, Turn::user(question)).await;
        self.remember(&identity, Turn::assistant(reply.clone())).await;

        Ok(Some(OutgoingMessage {
            target: identity,
            text: reply,
        }))
    }
}
