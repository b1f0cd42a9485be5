//! Data models and structures
//!
//! Defines the request/response shapes of the HTTP surface, the structured
//! text schemas, the image job model and runtime configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// One inbound generation call. Immutable for the lifetime of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub data: String,
    pub image_query: Option<String>,
}

impl GenerationRequest {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            image_query: None,
        }
    }

    pub fn with_image_query(mut self, image_query: impl Into<String>) -> Self {
        self.image_query = Some(image_query.into());
        self
    }
}

/// "Change image" call: a term, or data to derive one from, plus the URL to avoid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlternateImageRequest {
    pub search_term: Option<String>,
    pub data: Option<String>,
    pub current_image_url: Option<String>,
}

/// Named set of string fields a structured completion must populate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: &'static str,
    pub fields: &'static [&'static str],
}

pub const DESCRIBE_SCHEMA: FieldSchema = FieldSchema {
    name: "post_with_caption",
    fields: &["Post", "ImageCaption"],
};

pub const GENERATION_SCHEMA: FieldSchema = FieldSchema {
    name: "post_with_image_prompt",
    fields: &["PostCopy", "ImageCopy", "ImagePromptCopy"],
};

/// Values produced for every field of a [`FieldSchema`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredResult {
    fields: BTreeMap<String, String>,
}

impl StructuredResult {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Move a field out; a missing field means the result never matched its schema.
    pub fn take(&mut self, field: &str) -> crate::Result<String> {
        self.fields
            .remove(field)
            .ok_or_else(|| crate::Error::Generation(format!("Missing field '{}'", field)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DescribeResponse {
    #[serde(rename = "Post")]
    pub post: String,
    #[serde(rename = "ImageCaption")]
    pub image_caption: String,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationCopy {
    #[serde(rename = "PostCopy")]
    pub post_copy: String,
    #[serde(rename = "ImageCopy")]
    pub image_copy: String,
    #[serde(rename = "ImagePromptCopy")]
    pub image_prompt_copy: String,
}

/// Generation flow output: text always present, image either resolved or reported.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationResponse {
    #[serde(flatten)]
    pub copy: GenerationCopy,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
    #[serde(rename = "imageError")]
    pub image_error: Option<ImageFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageFailure {
    pub error: String,
    #[serde(rename = "rawOutput")]
    pub raw_output: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageUrlResponse {
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[serde(alias = "starting")]
    Queued,
    Processing,
    Succeeded,
    #[serde(alias = "canceled")]
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Snapshot of one asynchronous image generation attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageJob {
    pub id: String,
    pub status: JobStatus,
    /// Either a URL string or an ordered list of URL candidates, kept raw for diagnostics.
    pub output: serde_json::Value,
    pub error: Option<String>,
}

/// Fixed rendering configuration sent with every job.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RenderOptions {
    pub aspect_ratio: String,
    pub safety_filter_level: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            aspect_ratio: "16:9".to_string(),
            safety_filter_level: "block_medium_and_above".to_string(),
        }
    }
}

/// Poll budget for image jobs. Both bounds apply; whichever trips first ends the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub max_wait: Duration,
    pub max_attempts: usize,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1500),
            max_wait: Duration::from_secs(300),
            max_attempts: 200,
        }
    }
}

/// Largest candidate pool a single search page can return.
pub const MAX_POOL_SIZE: usize = 30;

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub unsplash_access_key: Option<String>,
    pub replicate_api_token: Option<String>,
    pub text_model: String,
    pub image_model: String,
    pub openai_base_url: String,
    pub unsplash_base_url: String,
    pub replicate_base_url: String,
    pub poll: PollOptions,
    pub alternate_pool_size: usize,
    pub access_token: Option<String>,
}

impl Config {
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = PollOptions::default();

        Ok(Self {
            openai_api_key: get("OPENAI_API_KEY"),
            unsplash_access_key: get("UNSPLASH_ACCESS_KEY"),
            replicate_api_token: get("REPLICATE_API_TOKEN"),
            text_model: get("TEXT_MODEL").unwrap_or_else(|| "gpt-4o".to_string()),
            image_model: get("IMAGE_MODEL").unwrap_or_else(|| "google/imagen-4".to_string()),
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            unsplash_base_url: get("UNSPLASH_BASE_URL")
                .unwrap_or_else(|| "https://api.unsplash.com".to_string()),
            replicate_base_url: get("REPLICATE_BASE_URL")
                .unwrap_or_else(|| "https://api.replicate.com".to_string()),
            poll: PollOptions {
                interval: parse_nonzero(get("POLL_INTERVAL_MS"), "POLL_INTERVAL_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.interval),
                max_wait: parse_nonzero(get("POLL_MAX_WAIT_SECS"), "POLL_MAX_WAIT_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.max_wait),
                max_attempts: parse_nonzero(get("POLL_MAX_ATTEMPTS"), "POLL_MAX_ATTEMPTS")?
                    .unwrap_or(defaults.max_attempts),
            },
            alternate_pool_size: parse_nonzero(get("ALTERNATE_POOL_SIZE"), "ALTERNATE_POOL_SIZE")?
                .map(|size: usize| size.min(MAX_POOL_SIZE))
                .unwrap_or(10),
            access_token: get("ACCESS_TOKEN"),
        })
    }
}

fn parse_var<T: std::str::FromStr>(value: Option<String>, key: &str) -> crate::Result<Option<T>> {
    value
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| crate::Error::Generic(format!("{} has invalid value '{}'", key, raw)))
        })
        .transpose()
}

/// Like [`parse_var`], but zero is rejected.
fn parse_nonzero<T>(value: Option<String>, key: &str) -> crate::Result<Option<T>>
where
    T: std::str::FromStr + Default + PartialEq,
{
    match parse_var::<T>(value, key)? {
        Some(parsed) if parsed == T::default() => Err(crate::Error::Generic(format!(
            "{} must be greater than zero",
            key
        ))),
        parsed => Ok(parsed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_describe_response_serializes_null_image() {
        let response = DescribeResponse {
            post: "post".to_string(),
            image_caption: "caption".to_string(),
            image_url: None,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"Post": "post", "ImageCaption": "caption", "imageUrl": null})
        );
    }

    #[test]
    fn test_generation_response_flattens_copy() {
        let response = GenerationResponse {
            copy: GenerationCopy {
                post_copy: "a".to_string(),
                image_copy: "b".to_string(),
                image_prompt_copy: "c".to_string(),
            },
            image_url: None,
            image_error: Some(ImageFailure {
                error: "boom".to_string(),
                raw_output: serde_json::Value::Null,
            }),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["PostCopy"], "a");
        assert_eq!(json["ImagePromptCopy"], "c");
        assert_eq!(json["imageError"]["error"], "boom");
        assert!(json["imageError"]["rawOutput"].is_null());
    }

    #[test]
    fn test_job_status_provider_aliases() {
        let starting: JobStatus = serde_json::from_str("\"starting\"").unwrap();
        let canceled: JobStatus = serde_json::from_str("\"canceled\"").unwrap();
        assert_eq!(starting, JobStatus::Queued);
        assert_eq!(canceled, JobStatus::Failed);
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_structured_result_take() {
        let mut fields = BTreeMap::new();
        fields.insert("Post".to_string(), "hello".to_string());
        let mut result = StructuredResult::new(fields);

        assert_eq!(result.take("Post").unwrap(), "hello");
        assert!(matches!(
            result.take("Post"),
            Err(crate::Error::Generation(_))
        ));
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();

        assert!(config.openai_api_key.is_none());
        assert_eq!(config.text_model, "gpt-4o");
        assert_eq!(config.image_model, "google/imagen-4");
        assert_eq!(config.poll, PollOptions::default());
        assert_eq!(config.poll.interval, Duration::from_millis(1500));
        assert_eq!(config.alternate_pool_size, 10);
    }

    #[test]
    fn test_config_overrides_and_blank_keys() {
        let config = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-1"),
            ("UNSPLASH_ACCESS_KEY", "   "),
            ("POLL_INTERVAL_MS", "250"),
            ("POLL_MAX_ATTEMPTS", "4"),
            ("ACCESS_TOKEN", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.openai_api_key.as_deref(), Some("sk-1"));
        assert!(config.unsplash_access_key.is_none());
        assert_eq!(config.poll.interval, Duration::from_millis(250));
        assert_eq!(config.poll.max_attempts, 4);
        assert_eq!(config.access_token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_config_rejects_malformed_number() {
        let err = Config::from_lookup(lookup_from(&[("POLL_MAX_WAIT_SECS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("POLL_MAX_WAIT_SECS"));
    }

    #[test]
    fn test_config_rejects_zero_poll_bounds() {
        for key in [
            "POLL_INTERVAL_MS",
            "POLL_MAX_WAIT_SECS",
            "POLL_MAX_ATTEMPTS",
            "ALTERNATE_POOL_SIZE",
        ] {
            let err = Config::from_lookup(lookup_from(&[(key, "0")])).unwrap_err();
            assert!(matches!(err, crate::Error::Generic(_)), "{key}");
            assert!(err.to_string().contains(key));
        }
    }

    #[test]
    fn test_config_clamps_pool_size_to_page_limit() {
        let config = Config::from_lookup(lookup_from(&[("ALTERNATE_POOL_SIZE", "100")])).unwrap();
        assert_eq!(config.alternate_pool_size, MAX_POOL_SIZE);
    }
}
