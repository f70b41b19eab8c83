mod answer;
mod conversation;
mod document;
mod embedding;

pub use answer::{Answer, AnswerMode, Generation, GenerationMeta};
pub use conversation::{Avatar, ConversationState, Message, MessageRole, GREETING};
pub use document::{
    ChunkMetadata, Document, DocumentChunk, EmbeddedChunk, SearchResult, UploadedFile,
};
pub use embedding::Embedding;
