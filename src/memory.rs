//! Conversation memory: a running summary plus the most recent raw turns.
//!
//! Turns beyond `max_recent_turns` are folded into the summary by the chat
//! model ([`ConversationMemory::summarize`]). Memory lives only as long as
//! its session.

use std::collections::VecDeque;

use crate::error::GenerationError;
use crate::llm::{ChatMessage, ChatModel};
use crate::models::Turn;

const SUMMARY_INSTRUCTIONS: &str = "Progressively summarize the lines of conversation provided, \
adding onto the previous summary and returning a new summary. Keep names of files, functions \
and classes that were discussed. Reply with the new summary only.";

#[derive(Debug, Clone)]
pub struct ConversationMemory {
    summary: String,
    recent: VecDeque<Turn>,
    max_recent_turns: usize,
}

impl ConversationMemory {
    pub fn new(max_recent_turns: usize) -> Self {
        Self {
            summary: String::new(),
            recent: VecDeque::new(),
            max_recent_turns,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.summary.is_empty() && self.recent.is_empty()
    }

    /// History text for prompts: the summary (if any), then the raw turns.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.summary.is_empty() {
            out.push_str("Summary of earlier conversation:\n");
            out.push_str(&self.summary);
            out.push_str("\n\n");
        }
        for turn in &self.recent {
            out.push_str(&render_turn(turn));
        }
        out.trim_end().to_string()
    }

    pub fn record(&mut self, turn: Turn) {
        self.recent.push_back(turn);
    }

    /// Number of buffered turns beyond the retention limit.
    pub fn overflow(&self) -> usize {
        self.recent.len().saturating_sub(self.max_recent_turns)
    }

    /// Fold overflowing turns into the summary.
    ///
    /// On error nothing changes: the overflow stays buffered and will be
    /// retried after the next recorded turn.
    pub async fn summarize(&mut self, model: &dyn ChatModel) -> Result<(), GenerationError> {
        let overflow = self.overflow();
        if overflow == 0 {
            return Ok(());
        }

        let lines: String = self.recent.iter().take(overflow).map(render_turn).collect();
        let current = if self.summary.is_empty() {
            "(none)"
        } else {
            self.summary.as_str()
        };
        let messages = [
            ChatMessage::system(SUMMARY_INSTRUCTIONS),
            ChatMessage::user(format!(
                "Current summary:\n{}\n\nNew lines of conversation:\n{}\nNew summary:",
                current, lines
            )),
        ];

        let summary = model.complete(&messages).await?;
        self.summary = summary.trim().to_string();
        self.recent.drain(..overflow);
        tracing::debug!(folded = overflow, "conversation summary updated");
        Ok(())
    }
}

fn render_turn(turn: &Turn) -> String {
    format!("Human: {}\nAssistant: {}\n", turn.question, turn.answer)
}
