use super::client::OpenAiHttpClient;
use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, JsonSchema, ResponseFormat,
};
use crate::ai::TextGenerationService;
use crate::models::{FieldSchema, StructuredResult};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

pub struct OpenAiTextClient {
    http: OpenAiHttpClient,
    model: String,
}

impl OpenAiTextClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::new_with_client(api_key, model, reqwest::Client::new())
    }

    pub fn new_with_client(api_key: String, model: String, client: reqwest::Client) -> Self {
        Self {
            http: OpenAiHttpClient::new_with_client(api_key, Duration::from_secs(60), client),
            model,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    fn request(
        &self,
        prompt: &str,
        response_format: Option<ResponseFormat>,
    ) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            response_format,
        }
    }
}

fn schema_response_format(schema: &FieldSchema) -> ResponseFormat {
    let properties: serde_json::Map<String, serde_json::Value> = schema
        .fields
        .iter()
        .map(|field| (field.to_string(), serde_json::json!({ "type": "string" })))
        .collect();

    ResponseFormat {
        format_type: "json_schema".to_string(),
        json_schema: JsonSchema {
            name: schema.name.to_string(),
            schema: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": schema.fields,
                "additionalProperties": false
            }),
            strict: true,
        },
    }
}

fn first_content(response: ChatCompletionResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
}

/// Validate raw model output against `schema`. Any missing, non-string or blank
/// field rejects the whole object.
pub(crate) fn parse_structured(raw: &str, schema: &FieldSchema) -> Result<StructuredResult> {
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)
        .map_err(|e| Error::Generation(format!("Response was not a JSON object: {}", e)))?;

    let mut fields = BTreeMap::new();
    for field in schema.fields {
        let value = object
            .get(*field)
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                Error::Generation(format!("Field '{}' missing from '{}'", field, schema.name))
            })?;
        fields.insert(field.to_string(), value.to_string());
    }

    Ok(StructuredResult::new(fields))
}

#[async_trait]
impl TextGenerationService for OpenAiTextClient {
    async fn generate_object(
        &self,
        prompt: &str,
        schema: &FieldSchema,
    ) -> Result<StructuredResult> {
        let request = self.request(prompt, Some(schema_response_format(schema)));
        let response = self.http.chat_completion(&request).await?;

        if let Some(refusal) = response
            .choices
            .first()
            .and_then(|choice| choice.message.refusal.as_deref())
        {
            tracing::warn!("OpenAI refused structured request: {}", refusal);
            return Err(Error::Generation("Model refused the request".to_string()));
        }

        let raw = first_content(response)
            .ok_or_else(|| Error::Generation("No content in OpenAI response".to_string()))?;

        parse_structured(&raw, schema)
    }

    async fn generate_text(&self, prompt: &str) -> Result<String> {
        let request = self.request(prompt, None);
        let response = self.http.chat_completion(&request).await?;

        first_content(response)
            .ok_or_else(|| Error::AiProvider("No response from OpenAI chat API".to_string()))
    }
}
