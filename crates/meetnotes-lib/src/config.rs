//! Watch and generation settings.
//!
//! Defaults match the values the watcher has always shipped with: a 1000
//! token budget, `*.txt` notes under `~/notes`, non-recursive, transcripts on.
//! The CLI overlays flags and environment variables on top of these.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default token budget for the system prompt plus kept turns.
pub const DEFAULT_TOKEN_BUDGET: usize = 1000;
/// Default note file pattern (matched against the file name only).
pub const DEFAULT_PATTERN: &str = "*.txt";
pub const DEFAULT_ROOT: &str = "~/notes";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Suffix of the transcript sidecar; such files are never treated as notes.
pub const TRANSCRIPT_SUFFIX: &str = ".log";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a junior staff member at a company, and trying to learn more about the business and domain. Any bullet point about 'We' describes your company and what your offer. You are transcribing notes between yourself, your colleagues, and possibly clients/prospects as bullet points. Propose one or two intelligent question to ask in the meeting, given the conversation so far.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot expand `~`: home directory is unavailable")]
    HomeDirUnavailable,
    #[error("watch root not found: {}", .0.display())]
    RootNotFound(PathBuf),
    #[error("watch root is not a directory: {}", .0.display())]
    RootNotDirectory(PathBuf),
    #[error("invalid note pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// What to watch and how to build each context window.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Directory to watch; a leading `~` is expanded.
    pub root: PathBuf,
    /// File-name glob selecting note files.
    pub pattern: String,
    pub recursive: bool,
    pub token_budget: usize,
    pub system_prompt: String,
    /// Append each generated question to `<note>.log`.
    pub transcript: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            root: PathBuf::from(DEFAULT_ROOT),
            pattern: DEFAULT_PATTERN.to_string(),
            recursive: false,
            token_budget: DEFAULT_TOKEN_BUDGET,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            transcript: true,
        }
    }
}

impl WatchConfig {
    /// Expand the root and check it is an existing directory.
    ///
    /// Failure here is fatal: there is nothing to watch.
    pub fn resolve_root(&self) -> Result<PathBuf, ConfigError> {
        let root = expand_home(&self.root)?;
        if !root.exists() {
            return Err(ConfigError::RootNotFound(root));
        }
        if !root.is_dir() {
            return Err(ConfigError::RootNotDirectory(root));
        }
        Ok(root)
    }

    pub fn note_filter(&self) -> Result<NoteFilter, ConfigError> {
        NoteFilter::new(&self.pattern)
    }
}

/// Settings for the chat-completions client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub model: String,
    pub base_url: String,
    /// Never serialized back out.
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl GeneratorConfig {
    /// Read the API key from `OPENAI_TOKEN`, then `OPENAI_API_KEY`.
    pub fn with_env_api_key(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = read_non_empty_env("OPENAI_TOKEN")
                .or_else(|| read_non_empty_env("OPENAI_API_KEY"));
        }
        self
    }
}

fn read_non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Expand a leading `~` (alone or followed by a separator) to the home directory.
pub fn expand_home(path: &Path) -> Result<PathBuf, ConfigError> {
    let mut components = path.components();
    match components.next() {
        Some(std::path::Component::Normal(first)) if first == "~" => {
            let home = dirs::home_dir().ok_or(ConfigError::HomeDirUnavailable)?;
            Ok(home.join(components.as_path()))
        }
        _ => Ok(path.to_path_buf()),
    }
}

/// Decides which paths are note files.
#[derive(Clone, Debug)]
pub struct NoteFilter {
    matcher: GlobMatcher,
}

impl NoteFilter {
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let glob = Glob::new(pattern).map_err(|source| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            matcher: glob.compile_matcher(),
        })
    }

    /// Match the file name against the pattern; transcript sidecars never match.
    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if name.ends_with(TRANSCRIPT_SUFFIX) {
            return false;
        }
        self.matcher.is_match(name)
    }
}
