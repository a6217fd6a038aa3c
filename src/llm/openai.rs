//! OpenAI-compatible chat-completion and embeddings client.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::{CompletionProvider, EmbeddingProvider};
use super::types::ChatMessage;
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    chat_model: String,
    embeddings_model: String,
    temperature: f64,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(
        base_url: String,
        api_key: String,
        chat_model: String,
        embeddings_model: String,
        temperature: f64,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            chat_model,
            embeddings_model,
            temperature,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, ApiError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let body = json!({
            "model": self.chat_model,
            "messages": messages,
            "temperature": self.temperature,
            "stream": false,
        });

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "chat completion failed ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(content)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let url = format!("{}/v1/embeddings", self.base_url);

        let body = json!({
            "model": self.embeddings_model,
            "input": inputs,
        });

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "embeddings request failed ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;

        let mut embeddings = Vec::new();
        if let Some(data) = payload["data"].as_array() {
            for item in data {
                if let Some(vals) = item["embedding"].as_array() {
                    let vec: Vec<f32> = vals
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vec);
                }
            }
        }

        if embeddings.len() != inputs.len() {
            return Err(ApiError::Internal(format!(
                "embeddings response returned {} vectors for {} inputs",
                embeddings.len(),
                inputs.len()
            )));
        }

        Ok(embeddings)
    }
}
