//! Client-side request throttling for search providers.
//!
//! Wraps any [`SearchProvider`] with a sliding one-minute window so a research
//! call never bursts past the backend's requests-per-minute quota. Waiting
//! happens before the request instead of relying on 429 backpressure.

use super::SearchProvider;
use crate::error::ProviderError;
use crate::types::SearchResult;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window request counter.
#[derive(Debug)]
struct RequestWindow {
    rpm: usize,
    window: Duration,
    /// Start times of requests still inside the window.
    requests: VecDeque<Instant>,
}

impl RequestWindow {
    fn new(rpm: usize) -> Self {
        Self {
            rpm,
            window: Duration::from_secs(60),
            requests: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.requests.front() {
            if now.duration_since(oldest) >= self.window {
                self.requests.pop_front();
            } else {
                break;
            }
        }
    }

    /// `None` if a request may start now, else how long to wait.
    fn check(&mut self, now: Instant) -> Option<Duration> {
        self.prune(now);
        if self.rpm == 0 || self.requests.len() < self.rpm {
            return None;
        }
        let oldest = *self.requests.front()?;
        let wait = self.window.saturating_sub(now.duration_since(oldest));
        (!wait.is_zero()).then_some(wait)
    }

    fn record(&mut self, now: Instant) {
        if self.rpm > 0 {
            self.requests.push_back(now);
        }
    }
}

/// A [`SearchProvider`] decorator enforcing a requests-per-minute limit.
///
/// `rpm == 0` disables throttling.
pub struct ThrottledSearch<S> {
    inner: S,
    window: Mutex<RequestWindow>,
}

impl<S: SearchProvider> ThrottledSearch<S> {
    pub fn new(inner: S, rpm: usize) -> Self {
        Self {
            inner,
            window: Mutex::new(RequestWindow::new(rpm)),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Block until the window has room, then claim a slot.
    async fn acquire(&self) {
        let mut window = self.window.lock().await;
        while let Some(wait) = window.check(Instant::now()) {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "Search rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
        window.record(Instant::now());
    }
}

#[async_trait]
impl<S: SearchProvider> SearchProvider for ThrottledSearch<S> {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ProviderError> {
        self.acquire().await;
        self.inner.search(query).await
    }
}
