use crate::ai::ImageSearchService;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.unsplash.com";
const SEARCH_PHOTOS_PATH: &str = "/search/photos";

#[derive(Debug, Deserialize)]
struct SearchPhotosResponse {
    #[serde(default)]
    results: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    urls: PhotoUrls,
}

#[derive(Debug, Deserialize)]
struct PhotoUrls {
    regular: Option<String>,
}

/// Unsplash implementation of [`ImageSearchService`].
pub struct UnsplashSearchClient {
    client: Client,
    access_key: String,
    base_url: String,
    timeout: Duration,
}

impl UnsplashSearchClient {
    pub fn new(access_key: String) -> Self {
        Self::new_with_client(access_key, Client::new())
    }

    pub fn new_with_client(access_key: String, client: Client) -> Self {
        Self {
            client,
            access_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl ImageSearchService for UnsplashSearchClient {
    async fn search_photos(&self, query: &str, per_page: usize) -> Result<Vec<String>> {
        tracing::debug!("Searching Unsplash for '{}' ({} per page)", query, per_page);

        let url = format!("{}{}", self.base_url, SEARCH_PHOTOS_PATH);
        let per_page = per_page.to_string();
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .header("Authorization", format!("Client-ID {}", self.access_key))
            .header("Accept-Version", "v1")
            .query(&[("query", query), ("per_page", per_page.as_str())])
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to Unsplash: {}", e);
                e
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("Unsplash API error (status {}): {}", status, error_text);
            return Err(Error::AiProvider(format!(
                "Unsplash API error (status {}): {}",
                status, error_text
            )));
        }

        let body = response.text().await?;
        let parsed: SearchPhotosResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse Unsplash response: {}\nBody: {}", e, body);
            Error::AiProvider(format!("Failed to parse Unsplash response: {}", e))
        })?;

        Ok(parsed
            .results
            .into_iter()
            .filter_map(|photo| photo.urls.regular)
            .collect())
    }
}
