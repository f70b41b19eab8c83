use serde::{Deserialize, Serialize};

use super::SearchResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    /// Retrieved chunks are placed in the prompt.
    Grounded,
    /// Retrieval is skipped and the prompt has no context block.
    Ungrounded,
}

impl AnswerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grounded => "grounded",
            Self::Ungrounded => "ungrounded",
        }
    }
}

/// Metadata returned alongside a model reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationMeta {
    pub model: String,
    pub latency_ms: u64,
}

/// The single top-choice reply of one model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub reply: String,
    pub meta: GenerationMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub data: String,
    pub query: String,
    pub mode: AnswerMode,
    pub documents: Vec<SearchResult>,
    pub prompt: String,
    pub meta: GenerationMeta,
}
