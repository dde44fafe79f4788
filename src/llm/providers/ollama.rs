use crate::config::LlmConfig;
use crate::llm::{SqlGenerator, TranslationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_API_URL: &str = "http://localhost:11434/api/generate";

/// Ollama backend for local models. Local models tend to wrap SQL in markdown
/// fences no matter what the prompt says, so the response is unfenced here.
pub struct OllamaProvider {
    client: reqwest::Client,
    api_url: String,
    model: String,
}

#[derive(Serialize, Debug)]
struct OllamaRequest {
    model: String,
    prompt: String,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    response: String,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, TranslationError> {
        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Ok(Self {
            client: reqwest::Client::new(),
            api_url,
            model: config.model.clone(),
        })
    }

    fn prepare_prompt(&self, question: &str, schema: &str) -> String {
        format!(
            "You are a SQL expert. Convert the following natural language query to SQL \
             for a DuckDB database.\n\n\
             Database Schema:\n{}\n\n\
             Natural language query: {}\n\n\
             Important: Respond with only the SQL query, no formatting or explanations.",
            schema, question
        )
    }

    fn unfence(content: &str) -> &str {
        // ```sql ... ``` first, then a plain ``` ... ``` block
        if let Some(start) = content.find("```sql") {
            if let Some(end) = content[start + 6..].find("```") {
                return content[start + 6..start + 6 + end].trim();
            }
        }
        if let Some(start) = content.find("```") {
            if let Some(end) = content[start + 3..].find("```") {
                return content[start + 3..start + 3 + end].trim();
            }
        }
        content.trim()
    }
}

#[async_trait]
impl SqlGenerator for OllamaProvider {
    async fn generate_sql(&self, question: &str, schema: &str) -> Result<String, TranslationError> {
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: self.prepare_prompt(question, schema),
            temperature: 0.1,
            stream: false,
        };

        debug!(model = %self.model, url = %self.api_url, "sending generate request");

        let response = self
            .client
            .post(&self.api_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| TranslationError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TranslationError::ResponseError(format!(
                "Ollama API responded with status code: {} {}",
                status, body
            )));
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| TranslationError::ResponseError(e.to_string()))?;

        let sql = Self::unfence(&ollama_response.response).to_string();
        if sql.is_empty() {
            return Err(TranslationError::ResponseError(
                "empty completion from Ollama".to_string(),
            ));
        }

        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfence_strips_sql_blocks() {
        let fenced = "Here you go:\n```sql\nSELECT 1;\n```\n";
        assert_eq!(OllamaProvider::unfence(fenced), "SELECT 1;");
    }

    #[test]
    fn unfence_strips_plain_blocks() {
        let fenced = "```\nSELECT 2;\n```";
        assert_eq!(OllamaProvider::unfence(fenced), "SELECT 2;");
    }

    #[test]
    fn unfence_passes_bare_sql_through() {
        assert_eq!(OllamaProvider::unfence("  SELECT 3;  "), "SELECT 3;");
    }
}
