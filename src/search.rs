//! Best-effort image lookup on top of [`ImageSearchService`]
//!
//! Search is a soft dependency: provider errors and empty result sets both
//! collapse to `None` and are only logged.

use crate::ai::ImageSearchService;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, warn};

/// Chooses an index in `0..len` among alternate candidates. `len` is never zero.
pub trait CandidatePicker: Send + Sync {
    fn pick(&self, len: usize) -> usize;
}

/// Uniform pick from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPicker;

impl CandidatePicker for RandomPicker {
    fn pick(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

pub struct ImageFinder {
    search: Arc<dyn ImageSearchService>,
    picker: Arc<dyn CandidatePicker>,
}

impl ImageFinder {
    pub fn new(search: Arc<dyn ImageSearchService>) -> Self {
        Self {
            search,
            picker: Arc::new(RandomPicker),
        }
    }

    pub fn with_picker(mut self, picker: Arc<dyn CandidatePicker>) -> Self {
        self.picker = picker;
        self
    }

    async fn candidates(&self, query: &str, pool_size: usize) -> Vec<String> {
        match self.search.search_photos(query, pool_size).await {
            Ok(urls) => urls,
            Err(e) => {
                warn!("Image search for '{}' failed: {}", query, e);
                Vec::new()
            }
        }
    }

    /// Top result for `query`.
    pub async fn search(&self, query: &str) -> Option<String> {
        let url = self.candidates(query, 1).await.into_iter().next();
        debug!("Image search '{}' -> {:?}", query, url);
        url
    }

    /// Random pick among the top `pool_size` results, skipping `exclude`.
    pub async fn search_excluding(
        &self,
        query: &str,
        exclude: Option<&str>,
        pool_size: usize,
    ) -> Option<String> {
        let mut pool = self.candidates(query, pool_size.max(1)).await;
        if let Some(exclude) = exclude {
            pool.retain(|url| url != exclude);
        }

        if pool.is_empty() {
            debug!("No alternate image for '{}'", query);
            return None;
        }

        let index = self.picker.pick(pool.len()).min(pool.len() - 1);
        Some(pool.swap_remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockImageSearchClient;

    struct LastPicker;

    impl CandidatePicker for LastPicker {
        fn pick(&self, len: usize) -> usize {
            len - 1
        }
    }

    fn finder(search: MockImageSearchClient) -> ImageFinder {
        ImageFinder::new(Arc::new(search))
    }

    #[tokio::test]
    async fn test_search_returns_first_result() {
        let search = MockImageSearchClient::new().with_results(&["https://a", "https://b"]);
        let finder = finder(search.clone());

        assert_eq!(finder.search("cats").await.as_deref(), Some("https://a"));
        assert_eq!(search.get_queries(), vec![("cats".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_search_empty_results_is_none() {
        let finder = finder(MockImageSearchClient::new());
        assert!(finder.search("cats").await.is_none());
    }

    #[tokio::test]
    async fn test_search_swallows_provider_errors() {
        let finder = finder(MockImageSearchClient::new().with_failure());
        assert!(finder.search("cats").await.is_none());
        assert!(finder.search_excluding("cats", None, 10).await.is_none());
    }

    #[tokio::test]
    async fn test_search_excluding_never_returns_excluded_url() {
        let search =
            MockImageSearchClient::new().with_results(&["https://a", "https://b", "https://c"]);
        let finder = finder(search);

        for _ in 0..50 {
            let url = finder
                .search_excluding("cats", Some("https://b"), 10)
                .await
                .unwrap();
            assert_ne!(url, "https://b");
        }
    }

    #[tokio::test]
    async fn test_search_excluding_none_when_every_candidate_is_excluded() {
        let search = MockImageSearchClient::new().with_results(&["https://a", "https://a"]);
        let finder = finder(search);

        assert!(finder
            .search_excluding("cats", Some("https://a"), 2)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_search_excluding_uses_picker_not_first() {
        let search =
            MockImageSearchClient::new().with_results(&["https://a", "https://b", "https://c"]);
        let finder = finder(search.clone()).with_picker(Arc::new(LastPicker));

        let url = finder.search_excluding("cats", Some("https://a"), 10).await;
        assert_eq!(url.as_deref(), Some("https://c"));
        assert_eq!(search.get_queries(), vec![("cats".to_string(), 10)]);
    }

    #[tokio::test]
    async fn test_search_excluding_without_current_url_keeps_whole_pool() {
        let search = MockImageSearchClient::new().with_results(&["https://a", "https://b"]);
        let finder = finder(search).with_picker(Arc::new(LastPicker));

        let url = finder.search_excluding("cats", None, 10).await;
        assert_eq!(url.as_deref(), Some("https://b"));
    }

    #[test]
    fn test_random_picker_stays_in_range() {
        for len in 1..20 {
            assert!(RandomPicker.pick(len) < len);
        }
    }
}
