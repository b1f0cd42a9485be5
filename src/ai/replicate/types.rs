//! Replicate prediction payloads.

use crate::models::{ImageJob, JobStatus, RenderOptions};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct PredictionRequest<'a> {
    pub input: PredictionInput<'a>,
}

#[derive(Debug, Serialize)]
pub struct PredictionInput<'a> {
    pub prompt: &'a str,
    #[serde(flatten)]
    pub options: &'a RenderOptions,
}

#[derive(Debug, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub output: serde_json::Value,
    #[serde(default)]
    pub error: serde_json::Value,
}

impl From<Prediction> for ImageJob {
    fn from(prediction: Prediction) -> Self {
        let error = match prediction.error {
            serde_json::Value::Null => None,
            serde_json::Value::String(message) => Some(message),
            other => Some(other.to_string()),
        };

        ImageJob {
            id: prediction.id,
            status: prediction.status,
            output: prediction.output,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_flattens_render_options() {
        let options = RenderOptions::default();
        let request = PredictionRequest {
            input: PredictionInput {
                prompt: "a bike",
                options: &options,
            },
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "input": {
                    "prompt": "a bike",
                    "aspect_ratio": "16:9",
                    "safety_filter_level": "block_medium_and_above"
                }
            })
        );
    }

    #[test]
    fn test_prediction_into_job_normalizes_error() {
        let prediction: Prediction = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "status": "failed",
            "output": null,
            "error": { "detail": "nsfw" }
        }))
        .unwrap();

        let job = ImageJob::from(prediction);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("{\"detail\":\"nsfw\"}"));
    }
}
