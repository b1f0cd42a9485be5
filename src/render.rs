//! Asynchronous image rendering: submit a job, then poll it to a terminal state.
//!
//! The wait is bounded by [`PollOptions`] (attempt ceiling and wall-clock
//! budget). Dropping an in-flight [`ImageRenderer::await_completion`] future
//! stops polling at once and fires a best-effort remote cancel.

use crate::ai::ImageJobService;
use crate::models::{ImageJob, JobStatus, PollOptions, RenderOptions};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, info, warn};

const GENERIC_FAILURE: &str = "Image generation failed.";

pub struct ImageRenderer {
    jobs: Arc<dyn ImageJobService>,
    options: RenderOptions,
    poll: PollOptions,
}

impl ImageRenderer {
    pub fn new(jobs: Arc<dyn ImageJobService>) -> Self {
        Self {
            jobs,
            options: RenderOptions::default(),
            poll: PollOptions::default(),
        }
    }

    pub fn with_render_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_poll_options(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }

    pub fn poll_options(&self) -> PollOptions {
        self.poll
    }

    pub async fn submit(&self, prompt: &str) -> Result<ImageJob> {
        let job = self.jobs.create_job(prompt, &self.options).await?;
        info!("Submitted image job {} ({:?})", job.id, job.status);
        Ok(job)
    }

    /// Poll `job` until it succeeds or fails, then normalize its output to one URL.
    pub async fn await_completion(&self, job: ImageJob) -> Result<String> {
        let mut guard = CancelOnDrop::new(self.jobs.clone(), job.id.clone());
        let deadline = Instant::now() + self.poll.max_wait;
        let mut schedule = FixedInterval::new(self.poll.interval).take(self.poll.max_attempts);
        let mut current = job;
        let mut attempts = 0usize;

        while !current.status.is_terminal() {
            let delay = match schedule.next() {
                Some(delay) if Instant::now() + delay <= deadline => delay,
                _ => return Err(self.give_up(&mut guard, current, attempts).await),
            };

            sleep(delay).await;
            let fetched = timeout_at(deadline, self.jobs.get_job(&current.id)).await;
            current = match fetched {
                Ok(job) => job?,
                Err(_) => return Err(self.give_up(&mut guard, current, attempts).await),
            };
            attempts += 1;
            debug!(
                "Image job {} poll {}: {:?}",
                current.id, attempts, current.status
            );
        }

        guard.disarm();
        finish(&current)
    }

    pub async fn render(&self, prompt: &str) -> Result<String> {
        let job = self.submit(prompt).await?;
        self.await_completion(job).await
    }

    /// Cancel the remote job once the poll budget is spent. `guard` stays armed
    /// until the cancel call returns.
    async fn give_up(&self, guard: &mut CancelOnDrop, job: ImageJob, attempts: usize) -> Error {
        warn!(
            "Image job {} still {:?} after {} polls; canceling",
            job.id, job.status, attempts
        );
        if let Err(e) = self.jobs.cancel_job(&job.id).await {
            warn!("Failed to cancel image job {}: {}", job.id, e);
        }
        guard.disarm();
        Error::image_render(
            format!(
                "Image generation timed out after {} polls ({:?} budget)",
                attempts, self.poll.max_wait
            ),
            job.output,
        )
    }
}

/// Canonical URL of a job output: a string, or the last entry of a list.
/// Only `http://` and `https://` values qualify.
pub fn resolve_output(output: &serde_json::Value) -> Option<&str> {
    let candidate = match output {
        serde_json::Value::String(url) => Some(url.as_str()),
        serde_json::Value::Array(items) => items.last().and_then(serde_json::Value::as_str),
        _ => None,
    }?;

    (candidate.starts_with("http://") || candidate.starts_with("https://")).then_some(candidate)
}

fn finish(job: &ImageJob) -> Result<String> {
    match job.status {
        JobStatus::Succeeded => match resolve_output(&job.output) {
            Some(url) => {
                info!("Image job {} succeeded: {}", job.id, url);
                Ok(url.to_string())
            }
            None => {
                warn!("Image job {} succeeded without a usable URL", job.id);
                Err(Error::image_render(GENERIC_FAILURE, job.output.clone()))
            }
        },
        _ => {
            let message = job.error.clone().unwrap_or_else(|| GENERIC_FAILURE.to_string());
            warn!("Image job {} failed: {}", job.id, message);
            Err(Error::image_render(message, job.output.clone()))
        }
    }
}

/// Cancels the remote job if the poll loop is abandoned before a terminal state.
struct CancelOnDrop {
    jobs: Arc<dyn ImageJobService>,
    id: Option<String>,
}

impl CancelOnDrop {
    fn new(jobs: Arc<dyn ImageJobService>, id: String) -> Self {
        Self { jobs, id: Some(id) }
    }

    fn disarm(&mut self) {
        self.id = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let jobs = self.jobs.clone();
        handle.spawn(async move {
            info!("Image job {} abandoned; canceling", id);
            if let Err(e) = jobs.cancel_job(&id).await {
                warn!("Failed to cancel image job {}: {}", id, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockImageJobClient;
    use serde_json::json;
    use std::time::Duration;

    fn renderer(jobs: &MockImageJobClient) -> ImageRenderer {
        ImageRenderer::new(Arc::new(jobs.clone()))
    }

    fn render_error(err: Error) -> (String, serde_json::Value) {
        match err {
            Error::ImageRender {
                message,
                raw_output,
            } => (message, raw_output),
            other => panic!("expected image render error, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_output_takes_last_list_entry() {
        let output = json!(["http://a/partial.png", "http://a/final.png"]);
        assert_eq!(resolve_output(&output), Some("http://a/final.png"));
    }

    #[test]
    fn test_resolve_output_rejects_non_urls() {
        assert_eq!(resolve_output(&json!("not-a-url")), None);
        assert_eq!(resolve_output(&json!("")), None);
        assert_eq!(resolve_output(&json!(["https://a/ok.png", 7])), None);
        assert_eq!(resolve_output(&json!([])), None);
        assert_eq!(resolve_output(&json!({"url": "https://a"})), None);
        assert_eq!(resolve_output(&serde_json::Value::Null), None);
        assert_eq!(resolve_output(&json!("https://a/x.png")), Some("https://a/x.png"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_at_fixed_interval_until_succeeded() {
        let jobs = MockImageJobClient::new()
            .with_poll(JobStatus::Processing, json!(null))
            .with_poll(JobStatus::Processing, json!(["http://a/partial.png"]))
            .with_poll(
                JobStatus::Succeeded,
                json!(["http://a/partial.png", "http://a/final.png"]),
            );
        let renderer = renderer(&jobs);
        let interval = renderer.poll_options().interval;

        let start = Instant::now();
        let url = renderer.render("a bike").await.unwrap();

        assert_eq!(url, "http://a/final.png");
        assert_eq!(jobs.create_count(), 1);
        assert_eq!(jobs.get_count(), 3);

        let times = jobs.get_times();
        assert_eq!(times[0].duration_since(start), interval);
        assert_eq!(times[1].duration_since(times[0]), interval);
        assert_eq!(times[2].duration_since(times[1]), interval);
        assert_eq!(interval, Duration::from_millis(1500));
        assert!(jobs.canceled_jobs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeded_with_non_url_output_is_failure() {
        let jobs = MockImageJobClient::new().with_poll(JobStatus::Succeeded, json!("not-a-url"));

        let err = renderer(&jobs).render("prompt").await.unwrap_err();
        let (message, raw_output) = render_error(err);
        assert_eq!(message, "Image generation failed.");
        assert_eq!(raw_output, json!("not-a-url"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_surfaces_provider_error() {
        let jobs = MockImageJobClient::new()
            .with_failed_poll(Some("NSFW content detected"), json!(null));

        let (message, raw_output) = render_error(renderer(&jobs).render("p").await.unwrap_err());
        assert_eq!(message, "NSFW content detected");
        assert!(raw_output.is_null());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_without_detail_uses_generic_message() {
        let jobs = MockImageJobClient::new().with_failed_poll(None, json!(["partial"]));

        let (message, raw_output) = render_error(renderer(&jobs).render("p").await.unwrap_err());
        assert_eq!(message, "Image generation failed.");
        assert_eq!(raw_output, json!(["partial"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_job_is_not_polled() {
        let jobs = MockImageJobClient::new();
        let job = ImageJob {
            id: "done".to_string(),
            status: JobStatus::Succeeded,
            output: json!("https://a/done.png"),
            error: None,
        };

        let url = renderer(&jobs).await_completion(job).await.unwrap();
        assert_eq!(url, "https://a/done.png");
        assert_eq!(jobs.get_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_ceiling_cancels_job() {
        let jobs = MockImageJobClient::new().with_poll(JobStatus::Processing, json!(null));
        let renderer = renderer(&jobs).with_poll_options(PollOptions {
            interval: Duration::from_millis(100),
            max_wait: Duration::from_secs(60),
            max_attempts: 3,
        });

        let (message, _) = render_error(renderer.render("p").await.unwrap_err());
        assert!(message.contains("timed out"));
        assert_eq!(jobs.get_count(), 3);

        tokio::task::yield_now().await;
        assert_eq!(jobs.canceled_jobs(), vec![MockImageJobClient::JOB_ID]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wall_clock_budget_stops_polling() {
        let jobs = MockImageJobClient::new().with_poll(JobStatus::Processing, json!(null));
        let renderer = renderer(&jobs).with_poll_options(PollOptions {
            interval: Duration::from_secs(1),
            max_wait: Duration::from_millis(2500),
            max_attempts: 100,
        });

        let start = Instant::now();
        let err = renderer.render("p").await.unwrap_err();
        assert!(matches!(err, Error::ImageRender { .. }));
        assert_eq!(jobs.get_count(), 2);
        assert!(start.elapsed() <= Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_wait_stops_polling_and_cancels() {
        let jobs = MockImageJobClient::new().with_poll(JobStatus::Processing, json!(null));
        let renderer = renderer(&jobs);

        let outcome = tokio::time::timeout(Duration::from_secs(5), renderer.render("p")).await;
        assert!(outcome.is_err());

        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert_eq!(jobs.canceled_jobs(), vec![MockImageJobClient::JOB_ID]);

        let polled = jobs.get_count();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(jobs.get_count(), polled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_status_fetch_is_cut_off_at_deadline() {
        let jobs = MockImageJobClient::new()
            .with_poll(JobStatus::Processing, json!(null))
            .with_get_delay(Duration::from_secs(20));
        let renderer = renderer(&jobs).with_poll_options(PollOptions {
            interval: Duration::from_millis(1500),
            max_wait: Duration::from_secs(5),
            max_attempts: 200,
        });

        let start = Instant::now();
        let (message, _) = render_error(renderer.render("p").await.unwrap_err());

        assert!(message.contains("timed out"));
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(6));
        assert_eq!(jobs.get_count(), 1);
        assert_eq!(jobs.canceled_jobs(), vec![MockImageJobClient::JOB_ID]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_wait_during_timeout_cancel_still_cancels() {
        let jobs = MockImageJobClient::new()
            .with_poll(JobStatus::Processing, json!(null))
            .with_cancel_delay(Duration::from_secs(10));
        let renderer = renderer(&jobs).with_poll_options(PollOptions {
            interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(60),
            max_attempts: 1,
        });

        // Budget runs out at 1s; the cancel call is still in flight at 3s.
        let outcome = tokio::time::timeout(Duration::from_secs(3), renderer.render("p")).await;
        assert!(outcome.is_err());
        assert!(jobs.canceled_jobs().is_empty());

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(jobs.canceled_jobs(), vec![MockImageJobClient::JOB_ID]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_fetch_failure_propagates_and_cancels_once() {
        let jobs = MockImageJobClient::new().with_get_failure();

        let err = renderer(&jobs).render("p").await.unwrap_err();
        assert!(matches!(err, Error::AiProvider(_)));
        assert_eq!(jobs.get_count(), 1);

        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert_eq!(jobs.canceled_jobs(), vec![MockImageJobClient::JOB_ID]);
    }

    #[tokio::test]
    async fn test_submit_failure_propagates() {
        let jobs = MockImageJobClient::new().with_create_failure();

        let err = renderer(&jobs).render("p").await.unwrap_err();
        assert!(matches!(err, Error::AiProvider(_)));
        assert_eq!(jobs.get_count(), 0);
    }
}
