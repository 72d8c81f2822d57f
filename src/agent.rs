//! Question answering over a repository index.
//!
//! # Flow
//!
//! 1. With prior conversation, rewrite the follow-up into a standalone
//!    question so retrieval does not depend on the history.
//! 2. Retrieve chunks from the [`VectorIndex`].
//! 3. Ask the [`ChatModel`] with the chunks, the history and the question.
//! 4. Record the turn and fold overflowing turns into the summary.
//!
//! Calls on one agent are serialized by the memory lock, so concurrent chat
//! requests observe a consistent history.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::ServiceError;
use crate::index::VectorIndex;
use crate::llm::{ChatMessage, ChatModel};
use crate::memory::ConversationMemory;
use crate::models::{DocumentChunk, Turn};
use crate::search::QueryOptions;

const ANSWER_INSTRUCTIONS: &str = "You are an assistant that answers questions about a source \
code repository. Use the code excerpts provided by the user to answer. Quote file names when \
they help. If the excerpts do not contain the answer, say that you don't know instead of \
guessing.";

const CONDENSE_INSTRUCTIONS: &str = "Given the conversation so far and a follow-up question, \
rephrase the follow-up question to be a standalone question. Reply with the question only.";

pub struct ConversationAgent {
    index: Arc<VectorIndex>,
    chat_model: Arc<dyn ChatModel>,
    query_options: QueryOptions,
    memory: Mutex<ConversationMemory>,
}

impl ConversationAgent {
    pub fn new(
        index: Arc<VectorIndex>,
        chat_model: Arc<dyn ChatModel>,
        query_options: QueryOptions,
        max_recent_turns: usize,
    ) -> Self {
        Self {
            index,
            chat_model,
            query_options,
            memory: Mutex::new(ConversationMemory::new(max_recent_turns)),
        }
    }

    pub async fn answer(&self, question: &str) -> Result<String, ServiceError> {
        let mut memory = self.memory.lock().await;
        let history = memory.render();

        let standalone = if memory.is_empty() {
            question.to_string()
        } else {
            let rewritten = self
                .chat_model
                .complete(&condense_messages(&history, question))
                .await?;
            let rewritten = rewritten.trim();
            if rewritten.is_empty() {
                question.to_string()
            } else {
                rewritten.to_string()
            }
        };
        tracing::debug!(question = %standalone, "retrieving context");

        let chunks = self.index.query(&standalone, &self.query_options).await?;
        tracing::debug!(retrieved = chunks.len(), "context retrieved");

        let answer = self
            .chat_model
            .complete(&answer_messages(&history, &chunks, question))
            .await?;

        memory.record(Turn {
            question: question.to_string(),
            answer: answer.clone(),
        });
        if memory.overflow() > 0 {
            if let Err(e) = memory.summarize(self.chat_model.as_ref()).await {
                tracing::warn!(error = %e, "conversation summary update failed");
            }
        }

        Ok(answer)
    }

    /// Rendered conversation history.
    pub async fn history(&self) -> String {
        self.memory.lock().await.render()
    }
}

fn condense_messages(history: &str, question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(CONDENSE_INSTRUCTIONS),
        ChatMessage::user(format!(
            "Conversation:\n{}\n\nFollow-up question: {}\nStandalone question:",
            history, question
        )),
    ]
}

fn answer_messages(history: &str, chunks: &[DocumentChunk], question: &str) -> Vec<ChatMessage> {
    let mut system = ANSWER_INSTRUCTIONS.to_string();
    if !history.is_empty() {
        system.push_str("\n\nConversation so far:\n");
        system.push_str(history);
    }

    let mut user = String::from("Code excerpts:\n");
    if chunks.is_empty() {
        user.push_str("(no matching code found)\n");
    }
    for chunk in chunks {
        user.push_str(&format!("\n--- {} ---\n{}\n", chunk.label(), chunk.text));
    }
    user.push_str(&format!("\nQuestion: {}", question));

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}
