//! Content generation pipeline.
//!
//! Two independent flows share the same collaborators:
//! - describe: structured post + caption, then a best-effort stock photo;
//! - generation: styled copy plus an image prompt, then an async render job.
//!
//! Stages within a request run strictly in sequence. Nothing is shared
//! between requests beyond the provider clients themselves.

use crate::ai::{
    ImageJobService, ImageSearchService, OpenAiTextClient, ReplicateJobClient,
    TextGenerationService, Unconfigured, UnsplashSearchClient,
};
use crate::models::{
    AlternateImageRequest, Config, DescribeResponse, GenerationCopy, GenerationRequest,
    GenerationResponse, ImageFailure, PollOptions, DESCRIBE_SCHEMA, GENERATION_SCHEMA,
    MAX_POOL_SIZE,
};
use crate::prompts::{self, PromptStyle};
use crate::render::ImageRenderer;
use crate::search::{CandidatePicker, ImageFinder};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_POOL_SIZE: usize = 10;

/// Injectable service bundle used to construct [`Pipeline`] in tests/harnesses.
pub struct PipelineServices {
    pub text: Arc<dyn TextGenerationService>,
    pub search: Arc<dyn ImageSearchService>,
    pub jobs: Arc<dyn ImageJobService>,
}

pub struct Pipeline {
    text: Arc<dyn TextGenerationService>,
    finder: ImageFinder,
    renderer: ImageRenderer,
    style: PromptStyle,
    alternate_pool_size: usize,
}

impl Pipeline {
    pub fn new(services: PipelineServices) -> Self {
        Self {
            text: services.text,
            finder: ImageFinder::new(services.search),
            renderer: ImageRenderer::new(services.jobs),
            style: PromptStyle::default(),
            alternate_pool_size: DEFAULT_POOL_SIZE,
        }
    }

    /// Construct a pipeline from environment configuration.
    ///
    /// A provider without credentials is replaced by [`Unconfigured`], which
    /// fails only the stages that depend on it.
    pub fn from_config(config: &Config) -> Self {
        // Reuse one HTTP connection pool across provider clients.
        let http = reqwest::Client::new();

        let text: Arc<dyn TextGenerationService> = match &config.openai_api_key {
            Some(key) => {
                info!("Text provider: OpenAI (model: {})", config.text_model);
                Arc::new(
                    OpenAiTextClient::new_with_client(
                        key.clone(),
                        config.text_model.clone(),
                        http.clone(),
                    )
                    .with_base_url(config.openai_base_url.clone()),
                )
            }
            None => {
                warn!("OPENAI_API_KEY not set; text generation disabled");
                Arc::new(Unconfigured::new("OPENAI_API_KEY"))
            }
        };

        let search: Arc<dyn ImageSearchService> = match &config.unsplash_access_key {
            Some(key) => {
                info!("Search provider: Unsplash");
                Arc::new(
                    UnsplashSearchClient::new_with_client(key.clone(), http.clone())
                        .with_base_url(config.unsplash_base_url.clone()),
                )
            }
            None => {
                warn!("UNSPLASH_ACCESS_KEY not set; images will be omitted");
                Arc::new(Unconfigured::new("UNSPLASH_ACCESS_KEY"))
            }
        };

        let jobs: Arc<dyn ImageJobService> = match &config.replicate_api_token {
            Some(token) => {
                info!("Image provider: Replicate (model: {})", config.image_model);
                Arc::new(
                    ReplicateJobClient::new_with_client(
                        token.clone(),
                        config.image_model.clone(),
                        http,
                    )
                    .with_base_url(config.replicate_base_url.clone()),
                )
            }
            None => {
                warn!("REPLICATE_API_TOKEN not set; image rendering disabled");
                Arc::new(Unconfigured::new("REPLICATE_API_TOKEN"))
            }
        };

        Self::new(PipelineServices { text, search, jobs })
            .with_poll_options(config.poll)
            .with_alternate_pool_size(config.alternate_pool_size)
    }

    pub fn with_picker(mut self, picker: Arc<dyn CandidatePicker>) -> Self {
        self.finder = self.finder.with_picker(picker);
        self
    }

    pub fn with_poll_options(mut self, poll: PollOptions) -> Self {
        self.renderer = self.renderer.with_poll_options(poll);
        self
    }

    pub fn with_prompt_style(mut self, style: PromptStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_alternate_pool_size(mut self, size: usize) -> Self {
        self.alternate_pool_size = size.clamp(1, MAX_POOL_SIZE);
        self
    }

    /// Describe flow: post + caption, then a stock photo that may be `None`.
    pub async fn describe(&self, request: &GenerationRequest) -> Result<DescribeResponse> {
        let data = require("data", Some(&request.data))?;

        let mut object = self.text.generate_object(data, &DESCRIBE_SCHEMA).await?;
        let post = object.take("Post")?;
        let image_caption = object.take("ImageCaption")?;
        info!("Generated post ({} chars)", post.len());

        let term = match non_empty(request.image_query.as_deref()) {
            Some(query) => Some(query.to_string()),
            None => self.derive_search_term(data).await.unwrap_or_else(|e| {
                warn!("Search term derivation failed: {}", e);
                None
            }),
        };

        let image_url = match term {
            Some(term) => self.finder.search(&term).await,
            None => {
                info!("No search term; skipping image search");
                None
            }
        };

        Ok(DescribeResponse {
            post,
            image_caption,
            image_url,
        })
    }

    /// Pick a different stock photo than the one currently shown.
    pub async fn change_image(&self, request: &AlternateImageRequest) -> Result<String> {
        let term = match non_empty(request.search_term.as_deref()) {
            Some(term) => Some(term.to_string()),
            None => match non_empty(request.data.as_deref()) {
                Some(data) => self.derive_search_term(data).await?,
                None => None,
            },
        };
        let term = term.ok_or_else(|| {
            Error::Validation("No search term provided or generated.".to_string())
        })?;

        self.finder
            .search_excluding(
                &term,
                request.current_image_url.as_deref(),
                self.alternate_pool_size,
            )
            .await
            .ok_or_else(|| Error::NotFound("No different image found.".to_string()))
    }

    /// Generation flow text stage.
    pub async fn generate_copy(&self, data: &str) -> Result<GenerationCopy> {
        let data = require("data", Some(data))?;
        let prompt = prompts::build_generation_prompt(&self.style, &GENERATION_SCHEMA, data);

        let mut object = self.text.generate_object(&prompt, &GENERATION_SCHEMA).await?;
        let copy = GenerationCopy {
            post_copy: object.take("PostCopy")?,
            image_copy: object.take("ImageCopy")?,
            image_prompt_copy: object.take("ImagePromptCopy")?,
        };
        info!("Generated copy with image prompt ({} chars)", copy.image_prompt_copy.len());
        Ok(copy)
    }

    /// Full generation flow. Text failures fail the call; image failures are
    /// reported in `image_error` next to the text.
    pub async fn generate(&self, data: &str) -> Result<GenerationResponse> {
        let copy = self.generate_copy(data).await?;

        let (image_url, image_error) = match self.renderer.render(&copy.image_prompt_copy).await {
            Ok(url) => (Some(url), None),
            Err(Error::ImageRender {
                message,
                raw_output,
            }) => (
                None,
                Some(ImageFailure {
                    error: message,
                    raw_output,
                }),
            ),
            Err(e) => {
                warn!("Image rendering failed: {}", e);
                (
                    None,
                    Some(ImageFailure {
                        error: "Failed to generate image.".to_string(),
                        raw_output: serde_json::Value::Null,
                    }),
                )
            }
        };

        Ok(GenerationResponse {
            copy,
            image_url,
            image_error,
        })
    }

    pub async fn render_image(&self, prompt: &str) -> Result<String> {
        let prompt = require("prompt", Some(prompt))?;
        self.renderer.render(prompt).await
    }

    /// Ask the text model for a photo search term. `None` when the answer is blank.
    pub async fn derive_search_term(&self, data: &str) -> Result<Option<String>> {
        let raw = self
            .text
            .generate_text(&prompts::build_search_term_prompt(data))
            .await?;
        let term = strip_wrapping_quotes(&raw);
        info!("Derived search term: '{}'", term);
        Ok((!term.is_empty()).then_some(term))
    }
}

/// First line of `raw`, trimmed, with one surrounding pair of `"` removed.
pub fn strip_wrapping_quotes(raw: &str) -> String {
    let line = raw.trim().lines().next().unwrap_or_default().trim();
    let line = line.strip_prefix('"').unwrap_or(line);
    let line = line.strip_suffix('"').unwrap_or(line);
    line.trim().to_string()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn require<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str> {
    non_empty(value).ok_or_else(|| Error::Validation(format!("Missing or invalid {}", field)))
}
