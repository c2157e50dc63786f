//! Request pacing for provider calls.
//!
//! Every model call goes through a `RateGovernor`, which keeps call starts
//! for the same model at least `60_000 / rpm` milliseconds apart. Callers
//! are delayed, never dropped or batched. The governor is an explicit,
//! injected object — call sites never consult ambient global state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use ai_client::{ChatCompleter, Completion, CompletionRequest};

/// Per-model requests-per-minute ceilings.
#[derive(Debug, Clone)]
pub struct RateLimits {
    per_model: HashMap<String, u32>,
    default_rpm: u32,
}

impl RateLimits {
    pub const DEFAULT_RPM: u32 = 15;

    pub fn new() -> Self {
        Self {
            per_model: HashMap::new(),
            default_rpm: Self::DEFAULT_RPM,
        }
    }

    pub fn with_limit(mut self, model: impl Into<String>, rpm: u32) -> Self {
        self.per_model.insert(model.into(), rpm.max(1));
        self
    }

    pub fn rpm_for(&self, model: &str) -> u32 {
        self.per_model.get(model).copied().unwrap_or(self.default_rpm)
    }

    fn min_gap(&self, model: &str) -> Duration {
        Duration::from_millis(60_000 / u64::from(self.rpm_for(model)))
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps any `ChatCompleter`; behaviorally identical except for the pacing
/// delay. State is one mutex-protected map of the next free call slot per
/// model name, so concurrent callers stay rate-correct (order among waiters
/// is whoever wakes first, not FIFO).
pub struct RateGovernor {
    inner: Arc<dyn ChatCompleter>,
    limits: RateLimits,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl RateGovernor {
    pub fn new(inner: Arc<dyn ChatCompleter>, limits: RateLimits) -> Self {
        Self {
            inner,
            limits,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically claim the next call slot for `model`. The lock is held
    /// only for the map update, never across the wait.
    fn reserve(&self, model: &str) -> Instant {
        let gap = self.limits.min_gap(model);
        let now = Instant::now();

        let mut slots = self.next_slot.lock().expect("rate governor lock poisoned");
        let at = match slots.get(model) {
            Some(&prev) if prev + gap > now => prev + gap,
            _ => now,
        };
        slots.insert(model.to_string(), at);
        at
    }

    async fn pace(&self, model: &str) {
        let at = self.reserve(model);
        let wait = at.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            debug!(model, wait_ms = wait.as_millis() as u64, "rate governor pacing call");
        }
        sleep_until(at).await;
    }
}

#[async_trait]
impl ChatCompleter for RateGovernor {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        self.pace(&request.model).await;
        self.inner.complete(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubCompleter;
    use ai_client::Message;

    fn request(model: &str) -> CompletionRequest {
        CompletionRequest::new(model, vec![Message::user("hi")])
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_calls_are_spaced() {
        let stub = Arc::new(StubCompleter::always(r#"{"summary":"x"}"#));
        let governor =
            RateGovernor::new(stub, RateLimits::new().with_limit("fast-model", 30));

        let t0 = Instant::now();
        governor.complete(&request("fast-model")).await.unwrap();
        let first = Instant::now() - t0;
        governor.complete(&request("fast-model")).await.unwrap();
        let second = Instant::now() - t0;

        // 30 RPM → at least 2000ms between call starts.
        assert!(second - first >= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_call_is_not_delayed() {
        let stub = Arc::new(StubCompleter::always(r#"{"summary":"x"}"#));
        let governor = RateGovernor::new(stub, RateLimits::new());

        let t0 = Instant::now();
        governor.complete(&request("any-model")).await.unwrap();
        assert_eq!(Instant::now() - t0, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_models_are_paced_independently() {
        let stub = Arc::new(StubCompleter::always(r#"{"summary":"x"}"#));
        let governor = RateGovernor::new(stub, RateLimits::new());

        let t0 = Instant::now();
        governor.complete(&request("model-a")).await.unwrap();
        governor.complete(&request("model-b")).await.unwrap();
        // Different model names never wait on each other.
        assert_eq!(Instant::now() - t0, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_rpm_applies_to_unknown_models() {
        let limits = RateLimits::new();
        assert_eq!(limits.rpm_for("never-configured"), 15);
        assert_eq!(limits.min_gap("never-configured"), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_stay_under_ceiling() {
        let stub = Arc::new(StubCompleter::always(r#"{"summary":"x"}"#));
        let governor = Arc::new(RateGovernor::new(
            stub,
            RateLimits::new().with_limit("shared", 30),
        ));

        let t0 = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let g = governor.clone();
            handles.push(tokio::spawn(async move {
                g.complete(&request("shared")).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // Three calls at 30 RPM need two full gaps.
        assert!(Instant::now() - t0 >= Duration::from_millis(4000));
    }
}
