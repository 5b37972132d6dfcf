use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{PipelineError, Result};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

const SUMMARY_SYSTEM_PROMPT: &str = "You are a neutral AI news summarizer. \
    Write a factual summary in 4-5 sentences and no more than 130 words. \
    Do not use quotes. Do not add hype, opinion, or speculation. \
    The summary must answer what happened and why it matters.";

const CLASSIFY_SYSTEM_PROMPT: &str = "You are a classifier for AI news categories. \
    Choose exactly one category from this list and output only the value: \
    models, research, products, open_source, hardware, regulation. \
    Do not output any other text or punctuation. \
    If unsure, pick the closest fit.";

#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub title: String,
    pub source_name: String,
    pub original_url: String,
    pub category: String,
}

#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    pub title: String,
    pub source_name: String,
    pub canonical_url: String,
    pub summary_text: Option<String>,
    pub legacy_category: String,
}

/// External summary generation. May fail or return nothing at any time; the
/// callers are responsible for making that survivable.
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn model(&self) -> &str;

    async fn summarize(&self, request: &SummaryRequest) -> Result<Option<String>>;
}

/// External category classification. Returns a raw label; validation against
/// the allowed set happens in the backfill.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, request: &ClassifyRequest) -> Result<Option<String>>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Thin chat-completions client shared by the OpenAI-backed implementations.
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            http: Client::new(),
            api_key,
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f64,
    ) -> Result<Option<String>> {
        let body = ChatRequest {
            model: &self.model,
            temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
        };

        let response = self
            .http
            .post(OPENAI_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Model(format!(
                "chat completion returned HTTP {}",
                status
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());

        Ok(content)
    }
}

pub struct OpenAiSummarizer {
    client: OpenAiClient,
}

impl OpenAiSummarizer {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    fn model(&self) -> &str {
        self.client.model()
    }

    async fn summarize(&self, request: &SummaryRequest) -> Result<Option<String>> {
        debug!("Requesting summary for {}", request.original_url);

        let user_prompt = format!(
            "Title: {}\nSource: {}\nOriginal URL: {}\nCategory: {}\n",
            request.title, request.source_name, request.original_url, request.category
        );

        self.client
            .chat(SUMMARY_SYSTEM_PROMPT, &user_prompt, 0.2)
            .await
    }
}

pub struct OpenAiClassifier {
    client: OpenAiClient,
}

impl OpenAiClassifier {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify(&self, request: &ClassifyRequest) -> Result<Option<String>> {
        debug!("Requesting classification for {}", request.canonical_url);

        let mut user_lines = vec![
            format!("Title: {}", request.title),
            format!("Source: {}", request.source_name),
        ];
        if let Some(summary) = &request.summary_text {
            user_lines.push(format!("Summary: {}", summary));
        }
        if !request.canonical_url.is_empty() {
            user_lines.push(format!("URL: {}", request.canonical_url));
        }
        if !request.legacy_category.is_empty() {
            user_lines.push(format!("Legacy Category: {}", request.legacy_category));
        }

        self.client
            .chat(CLASSIFY_SYSTEM_PROMPT, &user_lines.join("\n"), 0.0)
            .await
    }
}

/// Fixed-response summarizer for development and tests.
pub struct MockSummarizer {
    text: Option<String>,
    fail: bool,
}

impl MockSummarizer {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            fail: false,
        }
    }

    pub fn empty() -> Self {
        Self {
            text: None,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            text: None,
            fail: true,
        }
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    fn model(&self) -> &str {
        "mock"
    }

    async fn summarize(&self, _request: &SummaryRequest) -> Result<Option<String>> {
        if self.fail {
            return Err(PipelineError::Model("mock summarizer failure".to_string()));
        }
        Ok(self.text.clone())
    }
}

/// Fixed-response classifier for development and tests.
pub struct MockClassifier {
    label: Option<String>,
    fail: bool,
}

impl MockClassifier {
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            fail: false,
        }
    }

    pub fn empty() -> Self {
        Self {
            label: None,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            label: None,
            fail: true,
        }
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, _request: &ClassifyRequest) -> Result<Option<String>> {
        if self.fail {
            return Err(PipelineError::Model("mock classifier failure".to_string()));
        }
        Ok(self.label.clone())
    }
}
