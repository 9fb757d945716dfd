//! Per-platform generation honours `workflow.concurrency_limit`
//!
//! A backend that holds every generation call open for a short while records
//! how many calls were in flight at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use appforge::llm::{LlmBackend, LlmError, LlmInvocation, LlmResult, LlmRouter, StubBackend};
use appforge::retrieval::InMemoryCorpus;
use appforge::{Config, Orchestrator, Platform, Services, WorkflowStatus};

const EVERY_PLATFORM: &str =
    "a shop with a website, an electron desktop app, an android phone app and a node api backend";

#[derive(Default)]
struct PeakTracking {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl LlmBackend for PeakTracking {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        if inv.step == "generation" {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(25)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        let body = StubBackend::respond(&inv)?;
        Ok(LlmResult::new(body, "tracking", "tracking-1"))
    }
}

async fn peak_generation_calls(limit: usize) -> usize {
    let backend = Arc::new(PeakTracking::default());
    let config = Config::builder()
        .backoff(Duration::ZERO, Duration::ZERO)
        .concurrency_limit(limit)
        .build()
        .unwrap();
    let orchestrator = Orchestrator::new(Services {
        config,
        llm: LlmRouter::single("tracking", backend.clone()),
        retrieval: Arc::new(InMemoryCorpus::empty()),
    });

    let state = orchestrator.run(EVERY_PLATFORM).await;
    assert_eq!(state.status, WorkflowStatus::Done, "{:?}", state.error);
    assert_eq!(state.platforms.len(), Platform::ALL.len());
    assert_eq!(backend.in_flight.load(Ordering::SeqCst), 0);
    backend.peak.load(Ordering::SeqCst)
}

#[tokio::test]
async fn limit_of_one_generates_platforms_one_at_a_time() {
    assert_eq!(peak_generation_calls(1).await, 1);
}

#[tokio::test]
async fn higher_limit_generates_platforms_in_parallel() {
    let peak = peak_generation_calls(4).await;
    assert!(peak > 1, "peak in-flight generation calls was {peak}");
    assert!(peak <= 4);
}
