//! services/api/src/adapters/analysis_llm.rs
//!
//! This module contains the adapter for the résumé analysis LLM.
//! It implements the `AnalysisEngine` port from the `core` crate against any
//! OpenAI-compatible chat completions endpoint (OpenAI itself, or Gemini).

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs,
    },
    Client, error::OpenAIError,
};
use async_trait::async_trait;
use ats_gate_core::{
    domain::DocumentImage,
    ports::{AnalysisEngine, PortError, PortResult},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::config::EngineConfig;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `AnalysisEngine` using an OpenAI-compatible vision model.
#[derive(Clone)]
pub struct OpenAiAnalysisAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiAnalysisAdapter {
    /// Creates a new `OpenAiAnalysisAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    /// Builds the client for whichever provider the configuration selects.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);
        if let Some(api_base) = &config.api_base {
            openai_config = openai_config.with_api_base(api_base);
        }
        Self::new(Client::with_config(openai_config), config.model.clone())
    }
}

/// Encodes the page image as a `data:` URI, the form vision models accept inline.
pub fn data_uri(image: &DocumentImage) -> String {
    format!("data:{};base64,{}", image.mime_type, STANDARD.encode(&image.bytes))
}

fn build_error(e: OpenAIError) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// `AnalysisEngine` Trait Implementation
//=========================================================================================

#[async_trait]
impl AnalysisEngine for OpenAiAnalysisAdapter {
    async fn generate(
        &self,
        instruction: &str,
        image: &DocumentImage,
        context_text: &str,
    ) -> PortResult<String> {
        let parts: Vec<ChatCompletionRequestUserMessageContentPart> = vec![
            ChatCompletionRequestMessageContentPartImageArgs::default()
                .image_url(
                    ImageUrlArgs::default()
                        .url(data_uri(image))
                        .detail(ImageDetail::High)
                        .build()
                        .map_err(build_error)?,
                )
                .build()
                .map_err(build_error)?
                .into(),
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text(format!("JOB DESCRIPTION:\n{}", context_text))
                .build()
                .map_err(build_error)?
                .into(),
        ];

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(instruction)
                .build()
                .map_err(build_error)?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(parts)
                .build()
                .map_err(build_error)?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(build_error)?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        // Extract the text content from the first choice in the response.
        let content = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| {
                PortError::Unexpected("Analysis LLM returned no choices in its response.".to_string())
            })?
            .message
            .content
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                PortError::Unexpected("Analysis LLM response contained no text content.".to_string())
            })?;
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_embeds_base64_jpeg() {
        let image = DocumentImage {
            mime_type: "image/jpeg".to_string(),
            bytes: b"abc".to_vec(),
        };
        assert_eq!(data_uri(&image), "data:image/jpeg;base64,YWJj");
    }
}
