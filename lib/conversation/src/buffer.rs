//! Buffered multi-turn conversation.
//!
//! A [`Conversation`] resends its whole history with every turn so the model
//! can refer back to earlier messages. A turn that fails leaves the history
//! untouched.

use crate::error::ConversationError;
use rootcause::Report;
use std::sync::Arc;
use switchyard_ai::{LlmBackend, LlmCall, LlmMessage, RequestContext};
use switchyard_core::ConversationId;
use tracing::{debug, instrument};

/// A running conversation with one system prompt.
pub struct Conversation {
    id: ConversationId,
    backend: Arc<dyn LlmBackend>,
    system_prompt: String,
    history: Vec<LlmMessage>,
    max_messages: Option<usize>,
}

impl Conversation {
    /// Default system prompt.
    pub const DEFAULT_SYSTEM_PROMPT: &'static str = "You are a friendly assistant.";

    /// Starts an empty conversation with [`Self::DEFAULT_SYSTEM_PROMPT`].
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            id: ConversationId::new(),
            backend,
            system_prompt: Self::DEFAULT_SYSTEM_PROMPT.to_string(),
            history: Vec::new(),
            max_messages: None,
        }
    }

    /// Replaces the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Keeps at most `max_messages` history messages, dropping the oldest
    /// turns first.
    #[must_use]
    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = Some(max_messages);
        self
    }

    /// Returns the conversation id.
    #[must_use]
    pub fn id(&self) -> ConversationId {
        self.id
    }

    /// Returns the history, oldest first, without the system prompt.
    #[must_use]
    pub fn history(&self) -> &[LlmMessage] {
        &self.history
    }

    /// Forgets all previous turns.
    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Sends `input` with the full history and records both sides of the
    /// turn.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::PredictFailed`] if the model call fails.
    #[instrument(skip(self, input, ctx), fields(conversation_id = %self.id, request_id = %ctx.request_id()))]
    pub async fn predict(
        &mut self,
        input: &str,
        ctx: &RequestContext,
    ) -> Result<String, Report<ConversationError>> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(LlmMessage::system(self.system_prompt.as_str()));
        messages.extend(self.history.iter().cloned());
        messages.push(LlmMessage::user(input));

        let conversation_id = self.id;
        let reply = LlmCall::from_messages(messages)
            .with_name("conversation")
            .invoke(self.backend.as_ref(), ctx)
            .await
            .map_err(|report| report.context(ConversationError::PredictFailed { conversation_id }))?
            .content;

        self.history.push(LlmMessage::user(input));
        self.history.push(LlmMessage::assistant(reply.as_str()));
        self.trim();
        debug!(messages = self.history.len(), "conversation turn recorded");
        Ok(reply)
    }

    fn trim(&mut self) {
        let Some(max) = self.max_messages else {
            return;
        };
        while self.history.len() > max {
            // Drop a whole user/assistant turn so the window never starts
            // with an orphaned reply.
            let drop = self.history.len().min(2);
            self.history.drain(..drop);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_ai::{LlmError, MessageRole, ScriptedBackend};

    #[tokio::test]
    async fn later_turns_see_earlier_ones() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_text("Hi Alice, nice to meet you!")
                .with_text("Yes, your name is Alice."),
        );
        let mut conversation = Conversation::new(backend.clone());
        let ctx = RequestContext::new();

        conversation.predict("Hi, I'm Alice.", &ctx).await.expect("turn 1");
        let reply = conversation
            .predict("Do you remember my name?", &ctx)
            .await
            .expect("turn 2");
        assert_eq!(reply, "Yes, your name is Alice.");

        let second = &backend.requests()[1].messages;
        assert_eq!(second.len(), 4);
        assert_eq!(second[0].content, Conversation::DEFAULT_SYSTEM_PROMPT);
        assert_eq!(second[1].content, "Hi, I'm Alice.");
        assert_eq!(second[2].role, MessageRole::Assistant);
        assert_eq!(conversation.history().len(), 4);
    }

    #[tokio::test]
    async fn failed_turn_leaves_history_unchanged() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_text("Hello!")
                .with_error(LlmError::Timeout),
        );
        let mut conversation = Conversation::new(backend);
        let ctx = RequestContext::new();
        conversation.predict("Hi", &ctx).await.expect("turn 1");

        let err = conversation.predict("Still there?", &ctx).await.expect_err("turn 2");
        assert_eq!(
            err.current_context(),
            &ConversationError::PredictFailed {
                conversation_id: conversation.id()
            }
        );
        assert_eq!(conversation.history().len(), 2);
    }

    #[tokio::test]
    async fn window_drops_oldest_turns() {
        let backend = Arc::new(ScriptedBackend::new().with_responder(|request| {
            Ok(switchyard_ai::LlmResponse::text(format!(
                "echo: {}",
                request.last_user_text().unwrap_or_default()
            )))
        }));
        let mut conversation = Conversation::new(backend).with_max_messages(4);
        let ctx = RequestContext::new();
        for turn in ["one", "two", "three"] {
            conversation.predict(turn, &ctx).await.expect("turn");
        }

        let history = conversation.history();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "two");
        assert_eq!(history[3].content, "echo: three");

        conversation.clear();
        assert!(conversation.history().is_empty());
    }
}
