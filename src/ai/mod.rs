//! External AI and content service integration
//!
//! One trait per upstream dependency: structured/free-text completion,
//! stock-photo search and asynchronous image rendering jobs. Concrete
//! providers live in submodules; [`mock`] holds scripted doubles and
//! [`Unconfigured`] stands in for any provider whose credential is absent.

pub mod mock;
pub mod openai;
pub mod replicate;
pub mod unsplash;

pub use mock::{MockImageJobClient, MockImageSearchClient, MockTextClient};
pub use openai::OpenAiTextClient;
pub use replicate::ReplicateJobClient;
pub use unsplash::UnsplashSearchClient;

use crate::models::{FieldSchema, ImageJob, RenderOptions, StructuredResult};
use crate::{Error, Result};
use async_trait::async_trait;

#[async_trait]
pub trait TextGenerationService: Send + Sync {
    /// Completion constrained to `schema`; every field is populated or the call fails.
    async fn generate_object(&self, prompt: &str, schema: &FieldSchema)
        -> Result<StructuredResult>;

    async fn generate_text(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
pub trait ImageSearchService: Send + Sync {
    /// Ranked candidate image URLs, best match first.
    async fn search_photos(&self, query: &str, per_page: usize) -> Result<Vec<String>>;
}

#[async_trait]
pub trait ImageJobService: Send + Sync {
    async fn create_job(&self, prompt: &str, options: &RenderOptions) -> Result<ImageJob>;
    async fn get_job(&self, id: &str) -> Result<ImageJob>;
    async fn cancel_job(&self, id: &str) -> Result<()>;
}

/// Provider placeholder used when its credential is not configured.
#[derive(Debug, Clone, Copy)]
pub struct Unconfigured {
    pub credential: &'static str,
}

impl Unconfigured {
    pub fn new(credential: &'static str) -> Self {
        Self { credential }
    }
}

#[async_trait]
impl TextGenerationService for Unconfigured {
    async fn generate_object(
        &self,
        _prompt: &str,
        _schema: &FieldSchema,
    ) -> Result<StructuredResult> {
        Err(Error::MissingCredential(self.credential))
    }

    async fn generate_text(&self, _prompt: &str) -> Result<String> {
        Err(Error::MissingCredential(self.credential))
    }
}

#[async_trait]
impl ImageSearchService for Unconfigured {
    async fn search_photos(&self, _query: &str, _per_page: usize) -> Result<Vec<String>> {
        Err(Error::MissingCredential(self.credential))
    }
}

#[async_trait]
impl ImageJobService for Unconfigured {
    async fn create_job(&self, _prompt: &str, _options: &RenderOptions) -> Result<ImageJob> {
        Err(Error::MissingCredential(self.credential))
    }

    async fn get_job(&self, _id: &str) -> Result<ImageJob> {
        Err(Error::MissingCredential(self.credential))
    }

    async fn cancel_job(&self, _id: &str) -> Result<()> {
        Err(Error::MissingCredential(self.credential))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DESCRIBE_SCHEMA;

    #[tokio::test]
    async fn test_unconfigured_reports_missing_credential() {
        let text = Unconfigured::new("OPENAI_API_KEY");
        let err = text
            .generate_object("prompt", &DESCRIBE_SCHEMA)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingCredential("OPENAI_API_KEY")));

        let search = Unconfigured::new("UNSPLASH_ACCESS_KEY");
        assert!(search.search_photos("cats", 1).await.is_err());

        let jobs = Unconfigured::new("REPLICATE_API_TOKEN");
        assert!(jobs
            .create_job("prompt", &RenderOptions::default())
            .await
            .is_err());
    }
}
