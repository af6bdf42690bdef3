//! Token counting for candidate request payloads.
//!
//! The window builder only needs a deterministic `text -> count` function, so
//! the encoding is hidden behind [`Tokenizer`]. [`CharEstimateTokenizer`] is
//! always available; `HfTokenizer` (feature `hf-tokenizer`) gives exact counts
//! from a HuggingFace `tokenizer.json`, and `BpeTokenizer` (feature `tiktoken`)
//! uses the OpenAI BPE encoding of a chat model, e.g. cl100k for
//! `gpt-3.5-turbo`.

/// Deterministic token counter.
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

impl<T: Tokenizer + ?Sized> Tokenizer for &T {
    fn count_tokens(&self, text: &str) -> usize {
        (**self).count_tokens(text)
    }
}

impl<T: Tokenizer + ?Sized> Tokenizer for Box<T> {
    fn count_tokens(&self, text: &str) -> usize {
        (**self).count_tokens(text)
    }
}

/// Default characters per token for the estimate.
pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

/// Heuristic counter: one token per `chars_per_token` characters, rounded up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharEstimateTokenizer {
    chars_per_token: usize,
}

impl CharEstimateTokenizer {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharEstimateTokenizer {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN)
    }
}

impl Tokenizer for CharEstimateTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }
}

#[cfg(feature = "hf-tokenizer")]
mod hf {
    use std::path::Path;

    use thiserror::Error;
    use tracing::warn;

    use super::{CharEstimateTokenizer, Tokenizer};

    #[derive(Debug, Error)]
    #[error("loading tokenizer from {path}: {message}")]
    pub struct TokenizerLoadError {
        pub path: String,
        pub message: String,
    }

    /// Exact counts from a HuggingFace `tokenizer.json`.
    pub struct HfTokenizer {
        inner: tokenizers::Tokenizer,
    }

    impl HfTokenizer {
        pub fn from_file(path: &Path) -> Result<Self, TokenizerLoadError> {
            let inner =
                tokenizers::Tokenizer::from_file(path).map_err(|e| TokenizerLoadError {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
            Ok(Self { inner })
        }
    }

    impl Tokenizer for HfTokenizer {
        fn count_tokens(&self, text: &str) -> usize {
            match self.inner.encode(text, false) {
                Ok(encoding) => encoding.len(),
                Err(err) => {
                    // Estimate instead.
                    warn!(error = %err, "tokenizer encode failed, using character estimate");
                    CharEstimateTokenizer::default().count_tokens(text)
                }
            }
        }
    }
}

#[cfg(feature = "hf-tokenizer")]
pub use hf::{HfTokenizer, TokenizerLoadError};

#[cfg(feature = "tiktoken")]
mod bpe {
    use thiserror::Error;

    use super::Tokenizer;

    #[derive(Debug, Error)]
    #[error("no BPE encoding known for model `{model}`: {message}")]
    pub struct UnknownModelError {
        pub model: String,
        pub message: String,
    }

    /// Exact counts with the BPE encoding OpenAI uses for a chat model.
    pub struct BpeTokenizer {
        inner: tiktoken_rs::CoreBPE,
    }

    impl BpeTokenizer {
        pub fn for_model(model: &str) -> Result<Self, UnknownModelError> {
            let inner =
                tiktoken_rs::get_bpe_from_model(model).map_err(|e| UnknownModelError {
                    model: model.to_string(),
                    message: e.to_string(),
                })?;
            Ok(Self { inner })
        }
    }

    impl Tokenizer for BpeTokenizer {
        fn count_tokens(&self, text: &str) -> usize {
            self.inner.encode_with_special_tokens(text).len()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn counts_cl100k_tokens_for_gpt_35() {
            let tok = BpeTokenizer::for_model("gpt-3.5-turbo").unwrap();
            assert_eq!(tok.count_tokens(""), 0);
            assert_eq!(tok.count_tokens("hello world"), 2);
        }

        #[test]
        fn unknown_model_is_rejected() {
            let err = BpeTokenizer::for_model("not-a-model").err().unwrap();
            assert_eq!(err.model, "not-a-model");
        }
    }
}

#[cfg(feature = "tiktoken")]
pub use bpe::{BpeTokenizer, UnknownModelError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_rounds_up() {
        let tok = CharEstimateTokenizer::default();
        assert_eq!(tok.count_tokens(""), 0);
        assert_eq!(tok.count_tokens("a"), 1);
        assert_eq!(tok.count_tokens("aaaa"), 1);
        assert_eq!(tok.count_tokens("aaaaa"), 2);
    }

    #[test]
    fn estimate_counts_characters() {
        let tok = CharEstimateTokenizer::new(1);
        assert_eq!(tok.count_tokens("héllo"), 5);
    }

    #[test]
    fn zero_ratio_is_clamped() {
        let tok = CharEstimateTokenizer::new(0);
        assert_eq!(tok.count_tokens("abc"), 3);
    }

    #[test]
    fn works_through_references_and_boxes() {
        let boxed: Box<dyn Tokenizer> = Box::new(CharEstimateTokenizer::new(2));
        assert_eq!(boxed.count_tokens("abcd"), 2);
        let by_ref: &dyn Tokenizer = &CharEstimateTokenizer::new(2);
        assert_eq!(by_ref.count_tokens("abcde"), 3);
    }
}
