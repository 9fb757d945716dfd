//! Scripted backend for tests
//!
//! Replies are queued per `(step, platform)` key. The last reply of a queue
//! repeats forever, so `always` is a single-entry queue. Unscripted calls fall
//! through to [`StubBackend`]. Every call is recorded.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use appforge_utils::error::LlmError;
use appforge_utils::types::Platform;

use crate::stub_backend::StubBackend;
use crate::types::{LlmBackend, LlmInvocation, LlmResult};

type Key = (String, Option<Platform>);

/// One invocation observed by a [`ScriptedBackend`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub step: String,
    pub platform: Option<Platform>,
    pub model: String,
    pub prompt: String,
}

#[derive(Default)]
struct Inner {
    scripts: HashMap<Key, VecDeque<Result<String, LlmError>>>,
    calls: Vec<RecordedCall>,
}

/// Test backend with scripted replies and call recording.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `step`, optionally scoped to one platform.
    #[must_use]
    pub fn then(self, step: &str, platform: Option<Platform>, reply: Result<String, LlmError>) -> Self {
        self.lock()
            .scripts
            .entry((step.to_string(), platform))
            .or_default()
            .push_back(reply);
        self
    }

    /// Reply the same way to every call for `step` (and `platform`).
    #[must_use]
    pub fn always(self, step: &str, platform: Option<Platform>, reply: Result<String, LlmError>) -> Self {
        self.lock()
            .scripts
            .insert((step.to_string(), platform), VecDeque::from([reply]));
        self
    }

    /// Fail every call for `step` (and `platform`) with `error`.
    #[must_use]
    pub fn always_fail(self, step: &str, platform: Option<Platform>, error: LlmError) -> Self {
        self.always(step, platform, Err(error))
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls for `step`, across platforms.
    #[must_use]
    pub fn call_count(&self, step: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.step == step).count()
    }

    /// Number of recorded calls for `step` scoped to `platform`.
    #[must_use]
    pub fn platform_call_count(&self, step: &str, platform: Platform) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.step == step && c.platform == Some(platform))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_reply(&self, inv: &LlmInvocation) -> Option<Result<String, LlmError>> {
        let mut inner = self.lock();
        inner.calls.push(RecordedCall {
            step: inv.step.clone(),
            platform: inv.platform,
            model: inv.model.clone(),
            prompt: inv.user_text(),
        });

        let exact = (inv.step.clone(), inv.platform);
        let any_platform = (inv.step.clone(), None);
        let key = if inner.scripts.contains_key(&exact) {
            exact
        } else {
            any_platform
        };
        let queue = inner.scripts.get_mut(&key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let body = match self.next_reply(&inv) {
            Some(reply) => reply?,
            None => StubBackend::respond(&inv)?,
        };
        Ok(LlmResult::new(body, "scripted", inv.model))
    }
}
