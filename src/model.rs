use serde::{Deserialize, Serialize};

use crate::config::TypingConfig;

/// A recorded typing session: everything sent to the actuator, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub version: u32,
    pub config: TypingConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Type { ch: char },
    Backspace { count: usize },
    Wait { kind: PauseKind, ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseKind {
    /// Delay after every keystroke.
    Keystroke,
    Thinking,
    Sentence,
    Comma,
    /// After a newline; twice the sentence range.
    Paragraph,
}
