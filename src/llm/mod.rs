pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use std::error::Error;
use std::fmt;

/// Failure talking to the completion service. Never retried; there is no
/// fallback SQL.
#[derive(Debug)]
pub enum TranslationError {
    ConnectionError(String),
    ResponseError(String),
    ConfigError(String),
}

impl fmt::Display for TranslationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslationError::ConnectionError(msg) => {
                write!(f, "completion service connection error: {}", msg)
            }
            TranslationError::ResponseError(msg) => {
                write!(f, "completion service response error: {}", msg)
            }
            TranslationError::ConfigError(msg) => {
                write!(f, "translator configuration error: {}", msg)
            }
        }
    }
}

impl Error for TranslationError {}

/// A backend able to turn a question plus a schema rendering into SQL text.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate_sql(&self, question: &str, schema: &str) -> Result<String, TranslationError>;
}

/// Stateless translator over a configured backend. The schema rendering is
/// supplied on every call; nothing is cached here.
pub struct Translator {
    generator: Box<dyn SqlGenerator + Send + Sync>,
}

impl Translator {
    pub fn from_config(config: &LlmConfig) -> Result<Self, TranslationError> {
        let generator: Box<dyn SqlGenerator + Send + Sync> = match config.backend.as_str() {
            "openai" => Box::new(providers::openai::OpenAiProvider::new(config)?),
            "ollama" => Box::new(providers::ollama::OllamaProvider::new(config)?),
            _ => {
                return Err(TranslationError::ConfigError(format!(
                    "unsupported LLM backend: {}",
                    config.backend
                )))
            }
        };

        Ok(Self { generator })
    }

    /// Wraps an arbitrary generator. Used by callers that bring their own
    /// backend, and by tests.
    pub fn with_generator(generator: Box<dyn SqlGenerator + Send + Sync>) -> Self {
        Self { generator }
    }

    /// Returns the backend's response text, trimmed of surrounding whitespace.
    /// No validation that the text is valid SQL; execution is the detector.
    pub async fn translate(&self, question: &str, schema: &str) -> Result<String, TranslationError> {
        let sql = self.generator.generate_sql(question, schema).await?;
        Ok(sql.trim().to_string())
    }
}
