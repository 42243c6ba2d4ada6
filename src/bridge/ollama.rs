//! Local summarizer over the Ollama generate API

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::BridgeError;
use crate::config::SummarizerConfig;

const SUMMARY_INSTRUCTIONS: &str = "Summarize the email below in one short sentence. \
Reply with the summary only, without preamble.";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
    num_ctx: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

fn build_prompt(text: &str) -> String {
    format!("{SUMMARY_INSTRUCTIONS}\n\n<email>\n{text}\n</email>")
}

pub struct OllamaClient {
    http: Client,
    endpoint: String,
    model: String,
    max_output_tokens: u32,
    context_window: u32,
}

impl OllamaClient {
    pub fn new(config: &SummarizerConfig) -> Result<Self, BridgeError> {
        let http = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_output_tokens: config.max_output_tokens,
            context_window: config.context_window,
        })
    }

    fn request<'a>(&'a self, text: &str) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt: build_prompt(text),
            stream: false,
            options: GenerateOptions {
                num_predict: self.max_output_tokens,
                num_ctx: self.context_window,
            },
        }
    }

    pub async fn summarize(&self, text: &str) -> Result<String, BridgeError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&self.request(text))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Summarizer returned {}", status);
            return Err(BridgeError::Status(status.as_u16()));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::MalformedResponse(e.to_string()))?;
        body.response
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BridgeError::MalformedResponse("missing response field".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let client = OllamaClient::new(&SummarizerConfig::default()).unwrap();
        let json = serde_json::to_value(client.request("From: a | Hi")).unwrap();

        assert_eq!(json["model"], "llama3.2");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 100);
        assert_eq!(json["options"]["num_ctx"], 2048);
        let prompt = json["prompt"].as_str().unwrap();
        assert!(prompt.ends_with("<email>\nFrom: a | Hi\n</email>"));
    }

    #[test]
    fn test_response_field_optional() {
        let body: GenerateResponse = serde_json::from_str(r#"{"done":true}"#).unwrap();
        assert!(body.response.is_none());
        let body: GenerateResponse =
            serde_json::from_str(r#"{"model":"llama3.2","response":" Greeting. ","done":true}"#).unwrap();
        assert_eq!(body.response.as_deref(), Some(" Greeting. "));
    }
}
