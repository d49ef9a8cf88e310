//! Forward polling loop.
//!
//! One loop per open conversation. Each iteration sleeps for the interval,
//! asks the store for messages after the cursor, hands non-empty batches to
//! the callback and advances the cursor to the largest id seen.
//!
//! Request failures are logged and retried on the next tick at the same
//! interval. Nothing but cancellation ends the loop.
//!
//! # Invariants
//!
//! - The cursor never decreases
//! - No callback runs after [`FetchHandle::cancel`] has returned
//! - [`MessageFetcher::retarget`] stops the old loop before starting the new
//!   one, so two loops never overlap

use std::{
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use epistle_core::{ConvoId, ConvoService, Environment, Message, MessageId};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Receives every non-empty batch fetched by a loop.
pub type FetchCallback = Box<dyn FnMut(Vec<Message>) + Send + 'static>;

/// Starts polling loops against one conversation store.
pub struct MessageFetcher<E: Environment> {
    service: Arc<dyn ConvoService>,
    env: E,
}

impl<E: Environment> Clone for MessageFetcher<E> {
    fn clone(&self) -> Self {
        Self { service: Arc::clone(&self.service), env: self.env.clone() }
    }
}

impl<E: Environment> MessageFetcher<E> {
    /// Create a fetcher over `service`.
    pub fn new(service: Arc<dyn ConvoService>, env: E) -> Self {
        Self { service, env }
    }

    /// Start polling `convo_id` for messages after `tail_id`.
    ///
    /// Must be called inside a tokio runtime. The loop runs until the
    /// returned handle is cancelled or dropped.
    pub fn start_auto_fetching(
        &self,
        convo_id: impl Into<ConvoId>,
        password_hash: impl Into<String>,
        tail_id: MessageId,
        interval: Duration,
        callback: impl FnMut(Vec<Message>) + Send + 'static,
    ) -> FetchHandle {
        let target = Arc::new(FetchTarget {
            convo_id: convo_id.into(),
            password_hash: password_hash.into(),
        });
        self.spawn(target, tail_id, interval, Box::new(callback))
    }

    /// Replace `previous` with a loop at `interval`, resuming from its cursor.
    ///
    /// Waits for the old loop to finish before the new one starts.
    pub async fn retarget(
        &self,
        previous: FetchHandle,
        interval: Duration,
        callback: impl FnMut(Vec<Message>) + Send + 'static,
    ) -> FetchHandle {
        let target = Arc::clone(&previous.target);
        let cursor = previous.cancel_and_wait().await;
        self.spawn(target, cursor, interval, Box::new(callback))
    }

    fn spawn(
        &self,
        target: Arc<FetchTarget>,
        tail_id: MessageId,
        interval: Duration,
        callback: FetchCallback,
    ) -> FetchHandle {
        let token = CancellationToken::new();
        let cursor = Arc::new(AtomicU64::new(tail_id));
        let callback = Arc::new(Mutex::new(callback));

        tracing::debug!(
            convo_id = %target.convo_id,
            tail_id,
            interval_ms = interval.as_millis() as u64,
            "starting fetch loop"
        );

        let task = tokio::spawn(run_fetch_loop(FetchLoop {
            service: Arc::clone(&self.service),
            env: self.env.clone(),
            target: Arc::clone(&target),
            interval,
            cursor: Arc::clone(&cursor),
            callback: Arc::clone(&callback),
            token: token.clone(),
        }));

        FetchHandle { token, task: Some(task), cursor, callback, target, interval }
    }
}

impl<E: Environment> fmt::Debug for MessageFetcher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageFetcher").finish_non_exhaustive()
    }
}

struct FetchTarget {
    convo_id: ConvoId,
    password_hash: String,
}

struct FetchLoop<E> {
    service: Arc<dyn ConvoService>,
    env: E,
    target: Arc<FetchTarget>,
    interval: Duration,
    cursor: Arc<AtomicU64>,
    callback: Arc<Mutex<FetchCallback>>,
    token: CancellationToken,
}

async fn run_fetch_loop<E: Environment>(state: FetchLoop<E>) {
    let FetchLoop { service, env, target, interval, cursor, callback, token } = state;
    let convo_id = target.convo_id.as_str();

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            () = env.sleep(interval) => {},
        }

        let tail_id = cursor.load(Ordering::Acquire);
        let started = env.now();
        let result = tokio::select! {
            biased;
            () = token.cancelled() => break,
            result = service.fetch_messages_after(convo_id, &target.password_hash, tail_id) => result,
        };

        let elapsed = env.now() - started;
        if elapsed > interval {
            tracing::debug!(
                convo_id,
                tail_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "poll slower than its interval"
            );
        }

        match result {
            Ok(messages) if messages.is_empty() => {},
            Ok(messages) => {
                let max_id = messages.iter().map(|m| m.id).max().unwrap_or(tail_id);
                tracing::trace!(convo_id, tail_id, count = messages.len(), "fetched messages");

                if !deliver(&callback, &token, messages) {
                    break;
                }
                cursor.fetch_max(max_id, Ordering::AcqRel);
            },
            Err(e) if e.is_transient() => {
                tracing::debug!(convo_id, tail_id, error = %e, "fetch failed, retrying");
            },
            Err(e) => {
                tracing::warn!(convo_id, tail_id, error = %e, "fetch failed, retrying");
            },
        }
    }

    tracing::debug!(convo_id, tail_id = cursor.load(Ordering::Acquire), "fetch loop stopped");
}

/// Run the callback unless the loop was cancelled. Returns false to stop.
///
/// The token is checked under the callback lock, which makes
/// [`FetchHandle::cancel`] a barrier for deliveries.
fn deliver(callback: &Mutex<FetchCallback>, token: &CancellationToken, batch: Vec<Message>) -> bool {
    let Ok(mut guard) = callback.lock() else {
        tracing::warn!("fetch callback poisoned, stopping loop");
        return false;
    };
    if token.is_cancelled() {
        return false;
    }
    (*guard)(batch);
    true
}

/// Cancellation scope of one running fetch loop.
///
/// Cancelling is idempotent. Dropping the handle cancels the loop.
pub struct FetchHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
    cursor: Arc<AtomicU64>,
    callback: Arc<Mutex<FetchCallback>>,
    target: Arc<FetchTarget>,
    interval: Duration,
}

impl FetchHandle {
    /// Stop the loop. A no-op if it is already stopped.
    ///
    /// When this returns, no further callback will run. Must not be called
    /// from inside the loop's own callback.
    pub fn cancel(&self) {
        self.token.cancel();
        // Wait out a delivery that passed its cancellation check.
        drop(self.callback.lock());
    }

    /// True once [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once the loop task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Largest id delivered so far, or the starting tail.
    pub fn cursor(&self) -> MessageId {
        self.cursor.load(Ordering::Acquire)
    }

    /// Conversation being polled.
    pub fn convo_id(&self) -> &str {
        &self.target.convo_id
    }

    /// Poll interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Cancel and wait for the loop task to exit. Returns the final cursor.
    pub async fn cancel_and_wait(mut self) -> MessageId {
        self.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
            && e.is_panic()
        {
            tracing::error!(convo_id = %self.target.convo_id, "fetch loop panicked");
        }
        self.cursor()
    }
}

impl Drop for FetchHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl fmt::Debug for FetchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchHandle")
            .field("convo_id", &self.target.convo_id)
            .field("interval", &self.interval)
            .field("cursor", &self.cursor())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
