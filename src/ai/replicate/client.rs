use super::types::{Prediction, PredictionInput, PredictionRequest};
use crate::ai::ImageJobService;
use crate::models::{ImageJob, RenderOptions};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.replicate.com";

/// Replicate predictions API implementation of [`ImageJobService`].
pub struct ReplicateJobClient {
    client: Client,
    api_token: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl ReplicateJobClient {
    /// `model` is an `owner/name` pair such as `google/imagen-4`.
    pub fn new(api_token: String, model: String) -> Self {
        Self::new_with_client(api_token, model, Client::new())
    }

    pub fn new_with_client(api_token: String, model: String, client: Client) -> Self {
        Self {
            client,
            api_token,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn send<Resp: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Resp> {
        let response = request
            .timeout(self.timeout)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to Replicate: {}", e);
                e
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("Replicate API error (status {}): {}", status, error_text);
            return Err(Error::AiProvider(format!(
                "Replicate API error (status {}): {}",
                status, error_text
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse Replicate response: {}\nBody: {}", e, body);
            Error::AiProvider(format!("Failed to parse Replicate response: {}", e))
        })
    }
}

#[async_trait]
impl ImageJobService for ReplicateJobClient {
    async fn create_job(&self, prompt: &str, options: &RenderOptions) -> Result<ImageJob> {
        let url = format!("{}/v1/models/{}/predictions", self.base_url, self.model);
        let body = PredictionRequest {
            input: PredictionInput { prompt, options },
        };

        let prediction: Prediction = self.send(self.client.post(&url).json(&body)).await?;
        tracing::info!(
            "Created Replicate prediction {} ({:?})",
            prediction.id,
            prediction.status
        );
        Ok(prediction.into())
    }

    async fn get_job(&self, id: &str) -> Result<ImageJob> {
        let url = format!("{}/v1/predictions/{}", self.base_url, id);
        let prediction: Prediction = self.send(self.client.get(&url)).await?;
        Ok(prediction.into())
    }

    async fn cancel_job(&self, id: &str) -> Result<()> {
        let url = format!("{}/v1/predictions/{}/cancel", self.base_url, id);
        let _: serde_json::Value = self.send(self.client.post(&url)).await?;
        tracing::info!("Canceled Replicate prediction {}", id);
        Ok(())
    }
}
