//! Library entry point for the meeting-notes question watcher.
//!
//! The pieces, leaf first:
//! - [`tokenizer`]: deterministic token counting for request payloads.
//! - [`parser`]: `[speaker]: body` notes -> ordered user turns.
//! - [`window`]: system prompt + longest trailing run of turns within budget.
//! - [`fingerprint`]: per-path content digests to skip duplicate events.
//! - [`dispatch`]: single-worker pipeline from watch events to questions.
//!
//! [`generator`] and [`transcript`] are the outward-facing adapters (the
//! chat-completions client and the `<note>.log` sidecar); [`config`] holds
//! the shared settings.
//
// Public modules
pub mod config;
pub mod dispatch;
pub mod fingerprint;
pub mod generator;
pub mod model;
pub mod parser;
pub mod tokenizer;
pub mod transcript;
pub mod window;

// Re‑export primary types for ergonomic use.
pub use config::{ConfigError, GeneratorConfig, NoteFilter, WatchConfig};
pub use dispatch::{
    DispatchError, DispatchOutcome, DispatchSummary, Dispatcher, FsNoteSource, Generated,
    IgnoreReason, NoteSource, WatchEvent, WatchEventKind,
};
pub use fingerprint::ChangeDetector;
pub use generator::{GenerationError, OpenAiGenerator, QuestionGenerator};
pub use model::{
    message::{Conversation, Message, Role},
    raw_note::RawNote,
};
pub use parser::{parse_conversation, parse_conversation_with_stats, ParseStats};
pub use tokenizer::{CharEstimateTokenizer, Tokenizer};
pub use window::{build_context_window, ContextWindow, WindowError};

#[cfg(feature = "hf-tokenizer")]
pub use tokenizer::HfTokenizer;

#[cfg(feature = "tiktoken")]
pub use tokenizer::BpeTokenizer;
