//! Mock Completion Provider for testing.
//!
//! Replays a scripted sequence of chunks and errors, allowing tests to run
//! without calling real AI APIs.
//!
//! # Features
//!
//! - Scripted tokens, final chunks and errors (replayed for every stream)
//! - Simulated per-chunk delays and stalls for timeout testing
//! - Call, pull and release tracking for verification
//!
//! # Example
//!
//! ```ignore
//! let provider = MockCompletionProvider::new()
//!     .with_tokens(["Hel", "lo"])
//!     .with_error(ProviderError::rate_limited(30));
//!
//! let chunks: Vec<_> = provider.create_stream(request).collect().await;
//! assert_eq!(provider.pulls(), 3);
//! ```

use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::ports::{
    CompletionProvider, CompletionRequest, CompletionStream, ProviderError, StreamChunk,
};

type ScriptItem = Result<StreamChunk, ProviderError>;

/// Mock completion provider for testing.
#[derive(Debug, Clone, Default)]
pub struct MockCompletionProvider {
    /// Items every stream yields, in order.
    script: Arc<Mutex<Vec<ScriptItem>>>,
    /// Never end after the script; hang instead.
    stall: bool,
    /// Simulated latency before each item.
    delay: Duration,
    /// Call history for verification.
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
    /// Items handed out across all streams.
    pulls: Arc<AtomicUsize>,
    /// Set once the most recent stream was dropped.
    released: Arc<AtomicBool>,
}

impl MockCompletionProvider {
    /// Creates a mock whose streams end immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends content chunks.
    pub fn with_tokens<I, S>(self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script
            .lock()
            .unwrap()
            .extend(tokens.into_iter().map(|t| Ok(StreamChunk::content(t))));
        self
    }

    /// Appends arbitrary items.
    pub fn with_chunks(self, chunks: Vec<ScriptItem>) -> Self {
        self.script.lock().unwrap().extend(chunks);
        self
    }

    /// Appends an error.
    pub fn with_error(self, error: ProviderError) -> Self {
        self.script.lock().unwrap().push(Err(error));
        self
    }

    /// Sets simulated latency before every item.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes streams hang after the script instead of ending.
    pub fn stalling(mut self) -> Self {
        self.stall = true;
        self
    }

    /// Returns all recorded requests.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Items pulled so far across all streams.
    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    /// True once the most recently created stream has been dropped.
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Marks the stream released when dropped.
struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct ReplayState {
    items: VecDeque<ScriptItem>,
    stall: bool,
    delay: Duration,
    pulls: Arc<AtomicUsize>,
    _guard: ReleaseGuard,
}

impl CompletionProvider for MockCompletionProvider {
    fn create_stream(&self, request: CompletionRequest) -> CompletionStream {
        self.calls.lock().unwrap().push(request);
        self.released.store(false, Ordering::SeqCst);

        let state = ReplayState {
            items: self.script.lock().unwrap().iter().cloned().collect(),
            stall: self.stall,
            delay: self.delay,
            pulls: self.pulls.clone(),
            _guard: ReleaseGuard(self.released.clone()),
        };

        stream::unfold(state, |mut state| async move {
            if !state.delay.is_zero() {
                sleep(state.delay).await;
            }
            match state.items.pop_front() {
                Some(item) => {
                    state.pulls.fetch_add(1, Ordering::SeqCst);
                    Some((item, state))
                }
                None if state.stall => futures::future::pending().await,
                None => None,
            }
        })
        .boxed()
    }

    fn name(&self) -> &str {
        "mock"
    }
}
