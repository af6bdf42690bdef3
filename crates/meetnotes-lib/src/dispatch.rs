//! Event-driven pipeline: change detection -> parsing -> window -> question.
//!
//! The filesystem watcher only produces [`WatchEvent`]s; everything after that
//! happens here, one event at a time. [`Dispatcher::run`] drains an unbounded
//! channel on a single task and awaits each event (including the generation
//! call) before taking the next, so two events for the same path never
//! interleave and the fingerprint map has exactly one writer.
//!
//! Every failure is scoped to its event. The digest for a path is committed
//! only after the note was read and decoded, so an unreadable or binary write
//! never hides a later valid one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, NoteFilter, WatchConfig};
use crate::fingerprint::ChangeDetector;
use crate::generator::{GenerationError, QuestionGenerator};
use crate::model::message::Message;
use crate::model::raw_note::RawNote;
use crate::parser::parse_conversation_with_stats;
use crate::tokenizer::Tokenizer;
use crate::transcript;
use crate::window::{build_context_window, ContextWindow, WindowError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Modified,
    Created,
    Deleted,
}

/// One change notification, independent of the watch backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchEventKind,
    pub is_directory: bool,
}

impl WatchEvent {
    pub fn new(path: impl Into<PathBuf>, kind: WatchEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
            is_directory: false,
        }
    }
}

/// Reads note bytes; swapped out in tests.
#[async_trait]
pub trait NoteSource: Send + Sync {
    async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>>;
}

/// Reads notes from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsNoteSource;

#[async_trait]
impl NoteSource for FsNoteSource {
    async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Directory,
    Filtered,
    Deleted,
}

/// A question produced for one note change.
#[derive(Debug, Clone)]
pub struct Generated {
    pub path: PathBuf,
    pub window: ContextWindow,
    pub question: String,
    /// Transcript file the entry was appended to, if transcripts are on.
    pub transcript: Option<PathBuf>,
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Ignored(IgnoreReason),
    /// Content identical to the last observation.
    Unchanged,
    Generated(Box<Generated>),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("decoding {} as UTF-8: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: std::str::Utf8Error,
    },
    #[error("building context window for {}: {source}", .path.display())]
    Window {
        path: PathBuf,
        #[source]
        source: WindowError,
    },
    #[error("generating question for {}: {source}", .path.display())]
    Generation {
        path: PathBuf,
        #[source]
        source: GenerationError,
    },
    #[error("writing transcript for {}: {source}", .path.display())]
    Transcript {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Counters reported when the worker loop stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub processed: usize,
    pub generated: usize,
    pub unchanged: usize,
    pub ignored: usize,
    pub failed: usize,
}

impl DispatchSummary {
    fn record(&mut self, result: &Result<DispatchOutcome, DispatchError>) {
        self.processed += 1;
        match result {
            Ok(DispatchOutcome::Generated(_)) => self.generated += 1,
            Ok(DispatchOutcome::Unchanged) => self.unchanged += 1,
            Ok(DispatchOutcome::Ignored(_)) => self.ignored += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Owns the change detector and drives the per-event pipeline.
pub struct Dispatcher {
    detector: ChangeDetector,
    filter: NoteFilter,
    system: Message,
    token_budget: usize,
    transcript: bool,
    tokenizer: Box<dyn Tokenizer>,
    generator: Arc<dyn QuestionGenerator>,
    source: Arc<dyn NoteSource>,
}

impl Dispatcher {
    pub fn new(
        config: &WatchConfig,
        tokenizer: Box<dyn Tokenizer>,
        generator: Arc<dyn QuestionGenerator>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            detector: ChangeDetector::new(),
            filter: config.note_filter()?,
            system: Message::system(config.system_prompt.clone()),
            token_budget: config.token_budget,
            transcript: config.transcript,
            tokenizer,
            generator,
            source: Arc::new(FsNoteSource),
        })
    }

    pub fn with_source(mut self, source: Arc<dyn NoteSource>) -> Self {
        self.source = source;
        self
    }

    /// Number of paths with a recorded fingerprint.
    pub fn tracked_paths(&self) -> usize {
        self.detector.len()
    }

    /// Run the full pipeline for one event.
    pub async fn handle(&mut self, event: WatchEvent) -> Result<DispatchOutcome, DispatchError> {
        if event.is_directory {
            return Ok(DispatchOutcome::Ignored(IgnoreReason::Directory));
        }
        if !self.filter.matches(&event.path) {
            debug!(path = %event.path.display(), "ignoring non-note path");
            return Ok(DispatchOutcome::Ignored(IgnoreReason::Filtered));
        }

        match event.kind {
            WatchEventKind::Deleted => {
                info!(path = %event.path.display(), "note deleted");
                Ok(DispatchOutcome::Ignored(IgnoreReason::Deleted))
            }
            WatchEventKind::Modified | WatchEventKind::Created => self.process(event.path).await,
        }
    }

    async fn process(&mut self, path: PathBuf) -> Result<DispatchOutcome, DispatchError> {
        let content = match self.source.read(&path).await {
            Ok(bytes) => bytes,
            Err(source) => return Err(DispatchError::Io { path, source }),
        };
        let note = RawNote::new(path, content);
        let path = note.path.as_path();

        let text = note.decode().map_err(|source| DispatchError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

        if !self.detector.detect(path, &note.content) {
            debug!(path = %path.display(), "content unchanged");
            return Ok(DispatchOutcome::Unchanged);
        }

        let (conversation, stats) = parse_conversation_with_stats(text);
        let window = build_context_window(
            &conversation,
            &self.system,
            self.token_budget,
            &*self.tokenizer,
        )
        .map_err(|source| DispatchError::Window {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            path = %path.display(),
            turns = stats.messages_emitted,
            dropped_segments = stats.dropped(),
            kept = window.turns().len(),
            tokens = window.token_count,
            "context window built"
        );

        let question = self
            .generator
            .generate(window.messages())
            .await
            .map_err(|source| DispatchError::Generation {
                path: path.to_path_buf(),
                source,
            })?;
        info!(path = %path.display(), %question, "question generated");

        let transcript = if self.transcript {
            let log_path = transcript::append_entry(
                path,
                window.messages(),
                &question,
                self.generator.model_name(),
            )
            .await
            .map_err(|source| DispatchError::Transcript {
                path: path.to_path_buf(),
                source,
            })?;
            Some(log_path)
        } else {
            None
        };

        Ok(DispatchOutcome::Generated(Box::new(Generated {
            path: path.to_path_buf(),
            window,
            question,
            transcript,
        })))
    }

    /// Drain `events` until the channel closes or `shutdown` turns true.
    ///
    /// An event already being processed is finished before shutdown is
    /// honored. `on_generated` sees every produced question in order.
    pub async fn run<F>(
        mut self,
        mut events: mpsc::UnboundedReceiver<WatchEvent>,
        mut shutdown: watch::Receiver<bool>,
        mut on_generated: F,
    ) -> DispatchSummary
    where
        F: FnMut(&Generated) + Send,
    {
        let mut summary = DispatchSummary::default();

        loop {
            if *shutdown.borrow() {
                break;
            }
            let event = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let path = event.path.clone();
            let result = self.handle(event).await;
            summary.record(&result);
            match result {
                Ok(DispatchOutcome::Generated(generated)) => on_generated(&generated),
                Ok(_) => {}
                Err(err) => warn!(path = %path.display(), error = %err, "event failed"),
            }
        }

        debug!(?summary, tracked = self.tracked_paths(), "dispatcher stopped");
        summary
    }
}
