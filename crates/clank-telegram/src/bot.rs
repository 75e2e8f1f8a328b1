//! Routes polled updates through the conversation and delivers its replies.

use std::sync::Arc;

use async_trait::async_trait;
use clank_core::Conversation;
use clank_core::conversation::render;
use clank_proto::OutboundAction;
use tracing::{debug, error, info, warn};

use crate::delivery::BotApi;
use crate::error::TelegramResult;
use crate::poll::UpdateHandler;
use crate::updates::Update;

/// The deploy bot: one [`Conversation`] behind one [`BotApi`].
pub struct DeployBot {
    conversation: Conversation,
    api: Arc<dyn BotApi>,
}

impl DeployBot {
    pub fn new(conversation: Conversation, api: Arc<dyn BotApi>) -> Self {
        Self { conversation, api }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Handles one update end to end. Delivery failures are logged, never
    /// raised: a chat that blocked the bot must not stall the others.
    pub async fn handle(&mut self, update: Update) {
        let update_id = update.update_id;
        let Some((chat_id, event)) = update.into_event() else {
            debug!(update_id, "Ignoring update");
            return;
        };

        let actions = match self.conversation.handle(chat_id, event).await {
            Ok(turn) if turn.handled => turn.actions,
            Ok(turn) => {
                let mut actions = turn.actions;
                actions.push(OutboundAction::send(render::unrecognised()));
                actions
            }
            Err(e) => {
                error!(chat_id, update_id, error = %e, "Failed to persist draft");
                vec![OutboundAction::send(render::storage_failed())]
            }
        };

        for action in actions {
            if let Err(e) = self.execute(chat_id, &action).await {
                if e.is_unreachable_chat() {
                    info!(chat_id, error = %e, "Chat unreachable, dropping remaining replies");
                    return;
                }
                warn!(chat_id, error = %e, "Failed to deliver reply");
            }
        }
    }

    async fn execute(&self, chat_id: i64, action: &OutboundAction) -> TelegramResult<()> {
        match action {
            OutboundAction::Send { text } => self.api.send_message(chat_id, text).await.map(drop),
            OutboundAction::SendButtons { text, keyboard } => self
                .api
                .send_buttons(chat_id, text, keyboard)
                .await
                .map(drop),
            OutboundAction::Edit { message_id, text } => {
                self.api.edit_message(chat_id, *message_id, text).await
            }
            OutboundAction::Delete { message_id } => {
                self.api.delete_message(chat_id, *message_id).await
            }
            OutboundAction::AnswerButton { callback_id, text } => {
                self.api.answer_callback(callback_id, text.as_deref()).await
            }
        }
    }
}

#[async_trait]
impl UpdateHandler for DeployBot {
    async fn handle_update(&mut self, update: Update) {
        self.handle(update).await;
    }

    fn after_cycle(&mut self) {
        let evicted = self.conversation.sessions_mut().evict_idle();
        if evicted > 0 {
            debug!(evicted, "Evicted idle sessions");
        }
    }
}
