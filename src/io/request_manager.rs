//! Request manager for chunk and metadata fetches.
//!
//! Responsibilities:
//! - Singleflight: concurrent requests for the same URL share one fetch
//! - Tagging: every request carries an identifier (`{batch}/{...}`) so a whole
//!   batch can be cancelled by prefix
//! - Soft failure: transport errors and non-success statuses resolve to
//!   [`FetchOutcome::FailedSoft`], which callers treat as an absent object
//!
//! # Request lifecycle
//!
//! ```text
//! issued ──► in-flight ──┬──► resolved
//!                        ├──► aborted      (explicit cancellation only)
//!                        └──► failed-soft  (network / HTTP error)
//! ```
//!
//! If the task leading a shared fetch is cancelled, the followers that were
//! not cancelled retry and one of them becomes the new leader.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::StoreReader;
use crate::error::IoError;

/// Terminal state of one request.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The object was fetched
    Resolved(Bytes),

    /// Network failure or non-success status; treated as an absent object
    FailedSoft(IoError),

    /// The request was cancelled before it resolved
    Aborted,
}

impl FetchOutcome {
    /// Payload of a resolved request.
    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            FetchOutcome::Resolved(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, FetchOutcome::Aborted)
    }
}

/// Cancellation scope shared by all requests of one batch.
///
/// Request identifiers are `{batch_id}/{suffix}`, and every request token is a
/// child of the batch token, so cancelling the scope also stops requests that
/// have not been issued yet.
#[derive(Debug, Clone)]
pub struct RequestScope {
    batch_id: Arc<str>,
    token: CancellationToken,
}

impl RequestScope {
    pub fn new(batch_id: impl Into<Arc<str>>) -> Self {
        Self {
            batch_id: batch_id.into(),
            token: CancellationToken::new(),
        }
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Build a request identifier tagged with this batch.
    pub fn request_id(&self, suffix: &str) -> String {
        format!("{}/{}", self.batch_id, suffix)
    }
}

/// State for a shared in-flight fetch.
struct InFlightFetch {
    notify: Notify,
    outcome: Mutex<Option<FetchOutcome>>,
}

/// Deduplicating, cancellable fetch front end over a [`StoreReader`].
pub struct RequestManager<S> {
    source: Arc<S>,

    /// Shared fetches keyed by URL
    in_flight: Mutex<HashMap<String, Arc<InFlightFetch>>>,

    /// Live request tokens keyed by `{request_id}#{seq}`
    requests: Mutex<HashMap<String, CancellationToken>>,

    next_seq: AtomicU64,

    /// Number of fetches actually issued against the source
    fetches_issued: AtomicUsize,
}

impl<S: StoreReader> RequestManager<S> {
    pub fn new(source: S) -> Self {
        Self::with_shared_source(Arc::new(source))
    }

    pub fn with_shared_source(source: Arc<S>) -> Self {
        Self {
            source,
            in_flight: Mutex::new(HashMap::new()),
            requests: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            fetches_issued: AtomicUsize::new(0),
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Fetch `url` on behalf of the request `request_id`.
    ///
    /// The request is tracked until this future completes or is dropped. If
    /// another request is already fetching the same URL, this one waits for
    /// that fetch instead of issuing a duplicate.
    pub async fn fetch(&self, scope: &RequestScope, request_id: &str, url: &str) -> FetchOutcome {
        let (key, token) = self.register(request_id, scope.token());
        let _tracked = TrackedRequest {
            requests: &self.requests,
            key,
        };

        self.fetch_shared(url, &token).await
    }

    async fn fetch_shared(&self, url: &str, token: &CancellationToken) -> FetchOutcome {
        loop {
            if token.is_cancelled() {
                return FetchOutcome::Aborted;
            }

            let (state, leader) = {
                let mut in_flight = self.in_flight.lock();
                match in_flight.get(url) {
                    Some(state) => (state.clone(), false),
                    None => {
                        let state = Arc::new(InFlightFetch {
                            notify: Notify::new(),
                            outcome: Mutex::new(None),
                        });
                        in_flight.insert(url.to_string(), state.clone());
                        (state, true)
                    }
                }
            };

            if leader {
                let mut leader = LeaderGuard {
                    in_flight: &self.in_flight,
                    url,
                    state: state.clone(),
                    outcome: None,
                };

                self.fetches_issued.fetch_add(1, Ordering::SeqCst);
                let outcome = tokio::select! {
                    biased;
                    _ = token.cancelled() => FetchOutcome::Aborted,
                    result = self.source.get(url) => match result {
                        Ok(bytes) => FetchOutcome::Resolved(bytes),
                        Err(e) if e.is_cancelled() => FetchOutcome::Aborted,
                        Err(e) => {
                            debug!(url = %url, error = %e, "Fetch failed, treating as absent");
                            FetchOutcome::FailedSoft(e)
                        }
                    },
                };

                leader.outcome = Some(outcome.clone());
                return outcome;
            }

            // Follower: register interest before checking the outcome so a
            // notification between the two cannot be missed.
            let notified = state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let ready = state.outcome.lock().clone();
            let outcome = match ready {
                Some(outcome) => outcome,
                None => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return FetchOutcome::Aborted,
                        _ = &mut notified => {}
                    }
                    let published = state.outcome.lock().clone();
                    match published {
                        Some(outcome) => outcome,
                        None => continue,
                    }
                }
            };

            match outcome {
                // The leader was cancelled; retry unless we were too
                FetchOutcome::Aborted => continue,
                outcome => return outcome,
            }
        }
    }

    fn register(&self, request_id: &str, parent: &CancellationToken) -> (String, CancellationToken) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let key = format!("{}#{}", request_id, seq);
        let token = parent.child_token();
        self.requests.lock().insert(key.clone(), token.clone());
        (key, token)
    }

    /// Cancel one request by its exact identifier.
    pub fn cancel_request(&self, request_id: &str) -> usize {
        self.cancel_prefix(&format!("{}#", request_id))
    }

    /// Cancel every tracked request whose identifier starts with `prefix`.
    ///
    /// Returns the number of requests cancelled. Cancelled requests are
    /// removed from tracking immediately.
    pub fn cancel_prefix(&self, prefix: &str) -> usize {
        let cancelled: Vec<CancellationToken> = {
            let mut requests = self.requests.lock();
            let keys: Vec<String> = requests
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect();
            keys.iter().filter_map(|k| requests.remove(k)).collect()
        };

        for token in &cancelled {
            token.cancel();
        }

        if !cancelled.is_empty() {
            debug!(prefix = %prefix, count = cancelled.len(), "Cancelled requests");
        }
        cancelled.len()
    }

    /// Cancel every tracked request.
    pub fn cancel_all(&self) -> usize {
        self.cancel_prefix("")
    }

    /// Number of requests currently tracked (issued or in flight).
    pub fn tracked_requests(&self) -> usize {
        self.requests.lock().len()
    }

    /// Number of distinct URLs currently being fetched.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Total fetches issued against the underlying source.
    pub fn fetches_issued(&self) -> usize {
        self.fetches_issued.load(Ordering::SeqCst)
    }
}

/// Removes a request from tracking when its future completes or is dropped.
struct TrackedRequest<'a> {
    requests: &'a Mutex<HashMap<String, CancellationToken>>,
    key: String,
}

impl Drop for TrackedRequest<'_> {
    fn drop(&mut self) {
        self.requests.lock().remove(&self.key);
    }
}

/// Publishes the leader's outcome (or `Aborted` if the leader was dropped)
/// and wakes followers.
///
/// The URL is unregistered before the outcome is published, so a follower
/// that observes `Aborted` and retries never finds the stale entry.
struct LeaderGuard<'a> {
    in_flight: &'a Mutex<HashMap<String, Arc<InFlightFetch>>>,
    url: &'a str,
    state: Arc<InFlightFetch>,
    outcome: Option<FetchOutcome>,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(self.url);
        let outcome = self.outcome.take().unwrap_or(FetchOutcome::Aborted);
        *self.state.outcome.lock() = Some(outcome);
        self.state.notify.notify_waiters();
    }
}
