use super::{ImageJobService, ImageSearchService, TextGenerationService};
use crate::models::{FieldSchema, ImageJob, JobStatus, RenderOptions, StructuredResult};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Scripted [`TextGenerationService`]. Responses cycle; `None` entries fail.
#[derive(Clone)]
pub struct MockTextClient {
    object_responses: Arc<Mutex<Vec<Option<BTreeMap<String, String>>>>>,
    text_responses: Arc<Mutex<Vec<Option<String>>>>,
    object_calls: Arc<Mutex<usize>>,
    text_calls: Arc<Mutex<usize>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockTextClient {
    pub fn new() -> Self {
        Self {
            object_responses: Arc::new(Mutex::new(Vec::new())),
            text_responses: Arc::new(Mutex::new(Vec::new())),
            object_calls: Arc::new(Mutex::new(0)),
            text_calls: Arc::new(Mutex::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_object_response(self, fields: &[(&str, &str)]) -> Self {
        let fields = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.object_responses.lock().unwrap().push(Some(fields));
        self
    }

    pub fn with_object_failure(self) -> Self {
        self.object_responses.lock().unwrap().push(None);
        self
    }

    pub fn with_text_response(self, response: String) -> Self {
        self.text_responses.lock().unwrap().push(Some(response));
        self
    }

    pub fn with_text_failure(self) -> Self {
        self.text_responses.lock().unwrap().push(None);
        self
    }

    pub fn object_call_count(&self) -> usize {
        *self.object_calls.lock().unwrap()
    }

    pub fn text_call_count(&self) -> usize {
        *self.text_calls.lock().unwrap()
    }

    pub fn get_call_count(&self) -> usize {
        self.object_call_count() + self.text_call_count()
    }

    pub fn get_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Default for MockTextClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerationService for MockTextClient {
    async fn generate_object(
        &self,
        prompt: &str,
        schema: &FieldSchema,
    ) -> Result<StructuredResult> {
        let mut count = self.object_calls.lock().unwrap();
        *count += 1;
        self.prompts.lock().unwrap().push(prompt.to_string());

        let responses = self.object_responses.lock().unwrap();
        if responses.is_empty() {
            // Default mock response
            let fields = schema
                .fields
                .iter()
                .map(|field| (field.to_string(), format!("Mock {}", field)))
                .collect();
            return Ok(StructuredResult::new(fields));
        }

        let index = (*count - 1) % responses.len();
        match &responses[index] {
            Some(fields) => Ok(StructuredResult::new(fields.clone())),
            None => Err(Error::Generation("Mock structured failure".to_string())),
        }
    }

    async fn generate_text(&self, prompt: &str) -> Result<String> {
        let mut count = self.text_calls.lock().unwrap();
        *count += 1;
        self.prompts.lock().unwrap().push(prompt.to_string());

        let responses = self.text_responses.lock().unwrap();
        if responses.is_empty() {
            return Ok("mock search term".to_string());
        }

        let index = (*count - 1) % responses.len();
        responses[index]
            .clone()
            .ok_or_else(|| Error::AiProvider("Mock text failure".to_string()))
    }
}

/// Scripted [`ImageSearchService`] returning a fixed candidate list.
#[derive(Clone)]
pub struct MockImageSearchClient {
    results: Arc<Mutex<Vec<String>>>,
    fail: bool,
    call_count: Arc<Mutex<usize>>,
    queries: Arc<Mutex<Vec<(String, usize)>>>,
}

impl MockImageSearchClient {
    pub fn new() -> Self {
        Self {
            results: Arc::new(Mutex::new(Vec::new())),
            fail: false,
            call_count: Arc::new(Mutex::new(0)),
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_results(self, results: &[&str]) -> Self {
        *self.results.lock().unwrap() = results.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// Every `(query, per_page)` pair received, in call order.
    pub fn get_queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }
}

impl Default for MockImageSearchClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageSearchService for MockImageSearchClient {
    async fn search_photos(&self, query: &str, per_page: usize) -> Result<Vec<String>> {
        *self.call_count.lock().unwrap() += 1;
        self.queries
            .lock()
            .unwrap()
            .push((query.to_string(), per_page));

        if self.fail {
            return Err(Error::AiProvider("Mock search failure".to_string()));
        }

        Ok(self
            .results
            .lock()
            .unwrap()
            .iter()
            .take(per_page)
            .cloned()
            .collect())
    }
}

/// Scripted [`ImageJobService`].
///
/// `create_job` returns a queued job; each `get_job` consumes the next scripted
/// state, repeating the last one once the script is exhausted.
#[derive(Clone)]
pub struct MockImageJobClient {
    polls: Arc<Mutex<Vec<(JobStatus, serde_json::Value, Option<String>)>>>,
    fail_create: bool,
    fail_get: bool,
    get_delay: Option<Duration>,
    cancel_delay: Option<Duration>,
    create_count: Arc<Mutex<usize>>,
    get_times: Arc<Mutex<Vec<Instant>>>,
    canceled: Arc<Mutex<Vec<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockImageJobClient {
    pub const JOB_ID: &'static str = "mock-job";

    pub fn new() -> Self {
        Self {
            polls: Arc::new(Mutex::new(Vec::new())),
            fail_create: false,
            fail_get: false,
            get_delay: None,
            cancel_delay: None,
            create_count: Arc::new(Mutex::new(0)),
            get_times: Arc::new(Mutex::new(Vec::new())),
            canceled: Arc::new(Mutex::new(Vec::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_poll(self, status: JobStatus, output: serde_json::Value) -> Self {
        self.polls.lock().unwrap().push((status, output, None));
        self
    }

    pub fn with_failed_poll(self, error: Option<&str>, output: serde_json::Value) -> Self {
        self.polls.lock().unwrap().push((
            JobStatus::Failed,
            output,
            error.map(str::to_string),
        ));
        self
    }

    pub fn with_create_failure(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn with_get_failure(mut self) -> Self {
        self.fail_get = true;
        self
    }

    /// Every status fetch takes `delay` on the tokio clock before answering.
    pub fn with_get_delay(mut self, delay: Duration) -> Self {
        self.get_delay = Some(delay);
        self
    }

    /// Cancels are recorded only once `delay` has passed.
    pub fn with_cancel_delay(mut self, delay: Duration) -> Self {
        self.cancel_delay = Some(delay);
        self
    }

    pub fn create_count(&self) -> usize {
        *self.create_count.lock().unwrap()
    }

    pub fn get_count(&self) -> usize {
        self.get_times.lock().unwrap().len()
    }

    /// Instants at which status fetches happened, on the tokio clock.
    pub fn get_times(&self) -> Vec<Instant> {
        self.get_times.lock().unwrap().clone()
    }

    pub fn canceled_jobs(&self) -> Vec<String> {
        self.canceled.lock().unwrap().clone()
    }

    pub fn get_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Default for MockImageJobClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageJobService for MockImageJobClient {
    async fn create_job(&self, prompt: &str, _options: &RenderOptions) -> Result<ImageJob> {
        *self.create_count.lock().unwrap() += 1;
        self.prompts.lock().unwrap().push(prompt.to_string());

        if self.fail_create {
            return Err(Error::AiProvider("Mock create failure".to_string()));
        }

        Ok(ImageJob {
            id: Self::JOB_ID.to_string(),
            status: JobStatus::Queued,
            output: serde_json::Value::Null,
            error: None,
        })
    }

    async fn get_job(&self, id: &str) -> Result<ImageJob> {
        let fetch = {
            let mut times = self.get_times.lock().unwrap();
            times.push(Instant::now());
            times.len()
        };

        if let Some(delay) = self.get_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_get {
            return Err(Error::AiProvider("Mock get failure".to_string()));
        }

        let polls = self.polls.lock().unwrap();
        let (status, output, error) = match polls.get(fetch - 1).or(polls.last()) {
            Some(poll) => poll.clone(),
            None => (JobStatus::Processing, serde_json::Value::Null, None),
        };

        Ok(ImageJob {
            id: id.to_string(),
            status,
            output,
            error,
        })
    }

    async fn cancel_job(&self, id: &str) -> Result<()> {
        if let Some(delay) = self.cancel_delay {
            tokio::time::sleep(delay).await;
        }
        self.canceled.lock().unwrap().push(id.to_string());
        Ok(())
    }
}
