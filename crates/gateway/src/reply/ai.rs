// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AI fallback responder: prompt selection by assistant category, a short
//! per-conversation history window, and the HTTP collaborator behind a
//! trait so tests script the replies.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::model::SessionRow;

/// Reply sent when the collaborator fails.
pub const FALLBACK_REPLY: &str =
    "Maaf, saya sedang tidak bisa membalas otomatis. Mohon tunggu sebentar, \
     tim kami akan segera membantu Anda.";

/// Messages per conversation fed as context.
pub const HISTORY_WINDOW: usize = 10;

/// Fixed assistant categories with their base prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantCategory {
    Sales,
    CustomerService,
    TechnicalSupport,
    General,
}

impl AssistantCategory {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "sales" => Self::Sales,
            "customer_service" | "customer-service" | "cs" => Self::CustomerService,
            "technical_support" | "technical-support" | "tech" => Self::TechnicalSupport,
            _ => Self::General,
        }
    }

    pub fn base_prompt(&self) -> &'static str {
        match self {
            Self::Sales => {
                "You are a friendly sales assistant. Answer product questions, \
                 highlight benefits, and guide the customer toward a purchase. \
                 Keep replies short and conversational."
            }
            Self::CustomerService => {
                "You are a patient customer service assistant. Resolve complaints, \
                 answer order questions, and escalate politely when unsure. \
                 Keep replies short and conversational."
            }
            Self::TechnicalSupport => {
                "You are a technical support assistant. Diagnose issues step by \
                 step and give concrete instructions. Keep replies short and \
                 conversational."
            }
            Self::General => {
                "You are a helpful business assistant. Answer questions clearly \
                 and keep replies short and conversational."
            }
        }
    }
}

/// Resolve the category from the session: `aiAssistantType` first, then
/// `aiConfig.agent_category`.
pub fn category_for(session: &SessionRow) -> AssistantCategory {
    if let Some(kind) = session.ai_assistant_type.as_deref() {
        return AssistantCategory::parse(kind);
    }
    if let Some(category) = session
        .ai_config
        .as_ref()
        .and_then(|c| c.get("agent_category"))
        .and_then(|v| v.as_str())
    {
        return AssistantCategory::parse(category);
    }
    AssistantCategory::General
}

/// Compose the full system prompt from category, business name, and any
/// custom prompt the user configured.
pub fn system_prompt(session: &SessionRow) -> String {
    let settings = session.parsed_settings();
    if let Some(custom) = settings.custom_system_prompt {
        return custom;
    }
    let mut prompt = category_for(session).base_prompt().to_owned();
    if !session.name.is_empty() {
        prompt.push_str(&format!(" You represent the business \"{}\".", session.name));
    }
    prompt
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// One completion request.
#[derive(Debug, Clone)]
pub struct AiRequest {
    pub system_prompt: String,
    pub history: Vec<ChatTurn>,
    pub user_message: String,
    pub model: Option<String>,
}

/// AI text-generation collaborator seam.
#[async_trait]
pub trait AiResponder: Send + Sync {
    async fn complete(&self, request: AiRequest) -> Result<String, GatewayError>;
}

// -- HTTP provider ------------------------------------------------------------

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Chat-completions HTTP client.
pub struct HttpAiResponder {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpAiResponder {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { http, base_url, api_key }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

#[async_trait]
impl AiResponder for HttpAiResponder {
    async fn complete(&self, request: AiRequest) -> Result<String, GatewayError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GatewayError::dependency("AI API key not configured"))?;

        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(ChatTurn { role: "system".into(), content: request.system_prompt });
        messages.extend(request.history);
        messages.push(ChatTurn { role: "user".into(), content: request.user_message });

        let body = serde_json::json!({
            "model": request.model.unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            "messages": messages,
            "max_tokens": 500,
            "temperature": 0.7,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::dependency(format!("AI request: {e}")))?;

        if !response.status().is_success() {
            return Err(GatewayError::dependency(format!(
                "AI provider returned {}",
                response.status()
            )));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::dependency(format!("AI response: {e}")))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GatewayError::dependency("AI provider returned no choices"))
    }
}

#[cfg(test)]
#[path = "ai_tests.rs"]
mod tests;
