use crate::config::LlmConfig;
use crate::llm::{SqlGenerator, TranslationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You are a SQL expert. Convert natural language queries to SQL \
                             without any formatting or explanation.";

/// OpenAI-compatible chat-completions backend.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OpenAiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, TranslationError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            TranslationError::ConfigError("API key is required for the openai backend".to_string())
        })?;

        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| TranslationError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key,
            model: config.model.clone(),
        })
    }

    fn prepare_prompt(&self, question: &str, schema: &str) -> String {
        format!(
            "Convert the following natural language query to SQL.\n\
             Database Schema:\n{}\n\n\
             Natural language query: {}\n\n\
             Important: Respond with only the SQL query, no formatting or explanations.",
            schema, question
        )
    }
}

#[async_trait]
impl SqlGenerator for OpenAiProvider {
    async fn generate_sql(&self, question: &str, schema: &str) -> Result<String, TranslationError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: self.prepare_prompt(question, schema),
                },
            ],
            temperature: 0.1,
        };

        debug!(model = %self.model, "sending chat completion request");

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| TranslationError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TranslationError::ResponseError(format!(
                "API responded with status code: {}",
                response.status()
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| TranslationError::ResponseError(e.to_string()))?;

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| TranslationError::ResponseError("no choices in response".to_string()))?;

        Ok(choice.message.content)
    }
}
