//! Optional language-model help for the edit planner.
//!
//! Every call may fail; the planner treats any error as "no suggestion" and
//! falls back to local behaviour.

use anyhow::{anyhow, Result};

use crate::keyboard::is_typeable;

/// Fillers typed and deleted again when the assistant has none to offer.
pub const FALLBACK_FILLERS: [&str; 10] = [
    "actually", "really", "kind of", "sort of", "I mean", "well", "like", "you know", "perhaps",
    "maybe",
];

pub const SIMILAR_WORD_MAX_LEN: usize = 20;
pub const FILLER_MAX_LEN: usize = 25;
pub const FILLER_COUNT: usize = 10;

/// A rephrase longer than this many times the original is treated as malformed.
const MAX_REPHRASE_GROWTH: usize = 3;
const MIN_REPHRASE_LEN: usize = 3;

pub trait RephraseAssistant {
    fn similar_words(&self, word: &str, count: usize) -> Result<Vec<String>>;
    fn rephrase(&self, text: &str) -> Result<String>;
    fn insertion_words(&self) -> Result<Vec<String>>;
}

/// No assistant configured. Every request fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

impl RephraseAssistant for Offline {
    fn similar_words(&self, _word: &str, _count: usize) -> Result<Vec<String>> {
        Err(anyhow!("no rephrase assistant configured"))
    }

    fn rephrase(&self, _text: &str) -> Result<String> {
        Err(anyhow!("no rephrase assistant configured"))
    }

    fn insertion_words(&self) -> Result<Vec<String>> {
        Err(anyhow!("no rephrase assistant configured"))
    }
}

/// Split a comma-separated model answer into at most `count` entries.
pub fn parse_word_list(
    raw: &str,
    count: usize,
    max_len: usize,
    alphabetic_only: bool,
) -> Vec<String> {
    raw.trim()
        .split(',')
        .map(|w| w.trim().trim_matches(|c| c == '"' || c == '\'').trim())
        .filter(|w| !w.is_empty() && w.chars().count() < max_len)
        .filter(|w| !alphabetic_only || w.chars().all(char::is_alphabetic))
        .filter(|w| is_typeable(w))
        .take(count)
        .map(str::to_string)
        .collect()
}

/// Strip surrounding whitespace and quotes from a model answer.
pub fn clean_rephrase(raw: &str) -> String {
    raw.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .trim()
        .to_string()
}

/// Validate a rephrase of `original`. Returns `None` for anything the engine
/// should not type.
pub fn accept_rephrase(original: &str, candidate: &str) -> Option<String> {
    let candidate = clean_rephrase(candidate);
    let len = candidate.chars().count();

    if len < MIN_REPHRASE_LEN
        || candidate == original.trim()
        || len > original.chars().count().saturating_mul(MAX_REPHRASE_GROWTH)
        || candidate.contains('\n')
        || !is_typeable(&candidate)
    {
        return None;
    }
    Some(candidate)
}

#[cfg(feature = "llm")]
pub mod openrouter {
    use super::*;

    use std::future::Future;
    use std::time::Duration;

    use anyhow::Context;
    use async_openai::{
        config::OpenAIConfig,
        types::chat::{
            ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
            CreateChatCompletionRequestArgs,
        },
        Client,
    };
    use tokio::runtime::Runtime;

    pub const DEFAULT_MODEL: &str = "google/gemini-3-flash-preview";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);

    const OPENROUTER_API_KEY_ENV: &str = "OPENROUTER_API_KEY";
    const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";

    const SYSTEM_PROMPT: &str = "You help a typing simulator produce plausible drafts. \
        Answer with exactly what is asked for: no explanations, no numbering, no markdown. \
        Use only characters found on a US-QWERTY keyboard.";

    /// Blocking OpenRouter client. Each request runs on a private runtime and
    /// is abandoned after the configured timeout.
    pub struct OpenRouterAssistant {
        client: Client<OpenAIConfig>,
        model: String,
        timeout: Duration,
        runtime: Runtime,
    }

    impl OpenRouterAssistant {
        pub fn from_env() -> Result<Self> {
            dotenvy::dotenv().ok();
            let api_key = std::env::var(OPENROUTER_API_KEY_ENV)
                .with_context(|| format!("{OPENROUTER_API_KEY_ENV} is not set"))?;
            Self::new(api_key)
        }

        pub fn new(api_key: impl Into<String>) -> Result<Self> {
            let config = OpenAIConfig::new()
                .with_api_key(api_key.into())
                .with_api_base(OPENROUTER_API_BASE);

            let config = config
                .with_header("HTTP-Referer", "https://github.com")
                .context("failed to set HTTP-Referer header")?;
            let config = config
                .with_header("X-Title", "typesim")
                .context("failed to set X-Title header")?;

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;

            Ok(Self {
                client: Client::with_config(config),
                model: DEFAULT_MODEL.to_string(),
                timeout: DEFAULT_TIMEOUT,
                runtime,
            })
        }

        pub fn with_model(mut self, model: impl Into<String>) -> Self {
            self.model = model.into();
            self
        }

        pub fn with_timeout(mut self, timeout: Duration) -> Self {
            self.timeout = timeout;
            self
        }

        fn block_on<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
            let timeout = self.timeout;
            self.runtime.block_on(async move {
                tokio::time::timeout(timeout, fut)
                    .await
                    .map_err(|_| anyhow!("OpenRouter request timed out after {timeout:?}"))?
            })
        }

        async fn complete(&self, prompt: String, temperature: f32) -> Result<String> {
            let request = CreateChatCompletionRequestArgs::default()
                .model(self.model.as_str())
                .messages([
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(SYSTEM_PROMPT)
                        .build()?
                        .into(),
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(prompt)
                        .build()?
                        .into(),
                ])
                .temperature(temperature)
                .build()
                .context("failed to build OpenRouter request")?;

            let response = self
                .client
                .chat()
                .create(request)
                .await
                .context("OpenRouter chat completion request failed")?;

            response
                .choices
                .first()
                .and_then(|c| c.message.content.clone())
                .context("missing choices[0].message.content")
        }
    }

    impl RephraseAssistant for OpenRouterAssistant {
        fn similar_words(&self, word: &str, count: usize) -> Result<Vec<String>> {
            let prompt = format!(
                "Give me {count} alternative words or synonyms for \"{word}\" that have similar meaning.\n\
                 Return ONLY a comma-separated list of words.\n\
                 Example format: word1, word2, word3"
            );
            let raw = self.block_on(self.complete(prompt, 0.7))?;
            Ok(parse_word_list(&raw, count, SIMILAR_WORD_MAX_LEN, true))
        }

        fn rephrase(&self, text: &str) -> Result<String> {
            let prompt = format!(
                "Rephrase this text to have the same meaning but different wording. \
                 Keep it natural and human-like. Return ONLY the rephrased text.\n\n\
                 Original: {text}"
            );
            let raw = self.block_on(self.complete(prompt, 0.8))?;
            Ok(clean_rephrase(&raw))
        }

        fn insertion_words(&self) -> Result<Vec<String>> {
            let prompt = format!(
                "Give me {FILLER_COUNT} short filler words or phrases (1-3 words each) that \
                 someone might type while thinking, then delete.\n\
                 Examples: \"actually\", \"really\", \"kind of\", \"I mean\", \"well\"\n\
                 Return ONLY a comma-separated list."
            );
            let raw = self.block_on(self.complete(prompt, 0.9))?;
            Ok(parse_word_list(&raw, FILLER_COUNT, FILLER_MAX_LEN, false))
        }
    }
}

#[cfg(not(feature = "llm"))]
pub mod openrouter {
    use super::*;

    use std::time::Duration;

    pub const DEFAULT_MODEL: &str = "google/gemini-3-flash-preview";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);

    #[derive(Debug, Clone)]
    pub struct OpenRouterAssistant;

    impl OpenRouterAssistant {
        pub fn from_env() -> Result<Self> {
            Err(anyhow!(
                "LLM support is disabled (build with --features llm)"
            ))
        }

        pub fn new(_api_key: impl Into<String>) -> Result<Self> {
            Err(anyhow!(
                "LLM support is disabled (build with --features llm)"
            ))
        }

        pub fn with_model(self, _model: impl Into<String>) -> Self {
            self
        }

        pub fn with_timeout(self, _timeout: Duration) -> Self {
            self
        }
    }

    impl RephraseAssistant for OpenRouterAssistant {
        fn similar_words(&self, _word: &str, _count: usize) -> Result<Vec<String>> {
            Err(anyhow!("LLM support is disabled"))
        }

        fn rephrase(&self, _text: &str) -> Result<String> {
            Err(anyhow!("LLM support is disabled"))
        }

        fn insertion_words(&self) -> Result<Vec<String>> {
            Err(anyhow!("LLM support is disabled"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn word_list_is_trimmed_filtered_and_capped() {
        let raw = " swift, \"rapid\", quick-ish, , extraordinarilylongword, fast, brisk ";
        assert_eq!(
            parse_word_list(raw, 3, SIMILAR_WORD_MAX_LEN, true),
            vec!["swift", "rapid", "fast"]
        );
    }

    #[test]
    fn filler_list_keeps_phrases() {
        let raw = "hmm, I mean, you know, sort of";
        assert_eq!(
            parse_word_list(raw, FILLER_COUNT, FILLER_MAX_LEN, false),
            vec!["hmm", "I mean", "you know", "sort of"]
        );
    }

    #[test]
    fn rephrase_is_unquoted() {
        assert_eq!(clean_rephrase("  \"the cat sat\"\n"), "the cat sat");
        assert_eq!(clean_rephrase("'hello there'"), "hello there");
    }

    #[test]
    fn malformed_rephrases_are_rejected() {
        let original = "the quick brown fox";
        assert_eq!(accept_rephrase(original, ""), None);
        assert_eq!(accept_rephrase(original, "ok"), None);
        assert_eq!(accept_rephrase(original, "\"the quick brown fox\""), None);
        assert_eq!(accept_rephrase(original, "the speedy brown fox ✓"), None);
        assert_eq!(accept_rephrase(original, &"very ".repeat(20)), None);
        assert_eq!(accept_rephrase(original, "two\nlines"), None);
        assert_eq!(
            accept_rephrase(original, "a fast brown fox"),
            Some("a fast brown fox".to_string())
        );
    }

    #[test]
    fn offline_always_fails() {
        assert!(Offline.similar_words("fast", 3).is_err());
        assert!(Offline.rephrase("some text").is_err());
        assert!(Offline.insertion_words().is_err());
    }
}
