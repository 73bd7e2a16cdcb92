//! # Downloader
//!
//! Fetches and decodes resources, collapsing concurrent requests for the same
//! locator into a single network operation.
//!
//! Every call to [`Downloader::fetch`] registers a subscriber on the in-flight
//! task for its locator, creating the task if there is none. Progress and the
//! terminal result fan out to all subscribers. A subscriber that cancels is
//! detached on its own; the network operation is only cancelled once the last
//! subscriber is gone.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::FetcherConfig;
use crate::convert::DataConvertible;
use crate::error::{MapleBaconError, Result};
use crate::fetch::{Fetch, HttpFetcher, Progress, ProgressHandler};

type InFlight<V> = Arc<Mutex<HashMap<String, Arc<DownloadTask<V>>>>>;

struct Subscriber<V> {
    result_tx: oneshot::Sender<Result<V>>,
    progress_tx: mpsc::UnboundedSender<Progress>,
}

struct TaskState<V> {
    subscribers: HashMap<u64, Subscriber<V>>,
    last_progress: Option<Progress>,
    finished: bool,
}

/// One network operation shared by every subscriber of a locator
struct DownloadTask<V> {
    locator: String,
    token: CancellationToken,
    state: Mutex<TaskState<V>>,
}

impl<V: DataConvertible> DownloadTask<V> {
    fn new(locator: &str) -> Self {
        Self {
            locator: locator.to_owned(),
            token: CancellationToken::new(),
            state: Mutex::new(TaskState {
                subscribers: HashMap::new(),
                last_progress: None,
                finished: false,
            }),
        }
    }

    /// Forward progress to every subscriber, dropping updates that go backwards
    fn report_progress(&self, progress: Progress) {
        let mut state = self.state.lock();
        if state.finished {
            return;
        }
        if state
            .last_progress
            .is_some_and(|last| progress.received < last.received)
        {
            return;
        }
        state.last_progress = Some(progress);
        for subscriber in state.subscribers.values() {
            let _ = subscriber.progress_tx.send(progress);
        }
    }

    /// Deliver `result` to every subscriber and retire the task.
    ///
    /// Lock order is the in-flight table, then the task state.
    fn finish(self: &Arc<Self>, in_flight: &InFlight<V>, result: Result<V>) {
        let subscribers = {
            let mut table = in_flight.lock();
            if table
                .get(&self.locator)
                .is_some_and(|task| Arc::ptr_eq(task, self))
            {
                table.remove(&self.locator);
            }
            let mut state = self.state.lock();
            state.finished = true;
            std::mem::take(&mut state.subscribers)
        };

        match &result {
            Ok(_) => debug!(
                locator = %self.locator,
                subscribers = subscribers.len(),
                "Download finished"
            ),
            Err(e) => warn!(
                locator = %self.locator,
                subscribers = subscribers.len(),
                error = %e,
                "Download failed"
            ),
        }

        for (_, subscriber) in subscribers {
            let _ = subscriber.result_tx.send(result.clone());
        }
    }

    /// Detach subscriber `id`, cancelling the network operation if it was the
    /// last one. No-op once the task has finished.
    fn detach(self: &Arc<Self>, in_flight: &InFlight<V>, id: u64) {
        let mut table = in_flight.lock();
        let mut state = self.state.lock();
        if state.finished {
            return;
        }
        let Some(subscriber) = state.subscribers.remove(&id) else {
            return;
        };
        let _ = subscriber.result_tx.send(Err(MapleBaconError::Cancelled));

        if state.subscribers.is_empty() {
            if table
                .get(&self.locator)
                .is_some_and(|task| Arc::ptr_eq(task, self))
            {
                table.remove(&self.locator);
            }
            self.token.cancel();
            debug!(locator = %self.locator, "Last subscriber left, cancelling download");
        } else {
            debug!(
                locator = %self.locator,
                remaining = state.subscribers.len(),
                "Subscriber detached from download"
            );
        }
    }

    async fn run(self: Arc<Self>, fetcher: Arc<dyn Fetch>, in_flight: InFlight<V>) {
        let report = |progress: Progress| self.report_progress(progress);

        let result = tokio::select! {
            _ = self.token.cancelled() => Err(MapleBaconError::Cancelled),
            fetched = fetcher.fetch(&self.locator, &report) => match fetched {
                Ok(data) => decode(&self.locator, data).await,
                Err(e) => Err(MapleBaconError::from(e)),
            },
        };

        self.finish(&in_flight, result);
    }
}

async fn decode<V: DataConvertible>(locator: &str, data: Bytes) -> Result<V> {
    tokio::task::spawn_blocking(move || V::decode(&data))
        .await
        .ok()
        .flatten()
        .ok_or_else(|| MapleBaconError::Decode {
            locator: locator.to_owned(),
        })
}

#[derive(Default)]
struct CancellerInner {
    cancelled: AtomicBool,
    action: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

/// Cloneable handle that cancels one pending operation.
///
/// Cancelling is idempotent, and cancelling after the operation has delivered
/// its result has no effect on that result.
#[derive(Clone, Default)]
pub struct Canceller {
    inner: Arc<CancellerInner>,
}

impl fmt::Debug for Canceller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canceller")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Canceller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install what runs on cancellation, replacing any previous action.
    ///
    /// Runs `action` immediately if cancellation already happened.
    pub fn set_action(&self, action: impl FnOnce() + Send + 'static) {
        let mut slot = self.inner.action.lock();
        if self.inner.cancelled.load(Ordering::SeqCst) {
            drop(slot);
            action();
            return;
        }
        *slot = Some(Box::new(action));
    }

    pub fn cancel(&self) {
        let action = {
            let mut slot = self.inner.action.lock();
            if self.inner.cancelled.swap(true, Ordering::SeqCst) {
                return;
            }
            slot.take()
        };
        if let Some(action) = action {
            action();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }
}

/// Deduplicating fetch-and-decode front end over a [`Fetch`] implementation
pub struct Downloader<V> {
    fetcher: Arc<dyn Fetch>,
    in_flight: InFlight<V>,
    next_id: Arc<AtomicU64>,
}

impl<V> Clone for Downloader<V> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            in_flight: self.in_flight.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<V: DataConvertible> Downloader<V> {
    pub fn new(fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            fetcher,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Downloader backed by an [`HttpFetcher`] built from `config`
    pub fn http(config: &FetcherConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(config)?;
        Ok(Self::new(Arc::new(fetcher)))
    }

    /// Number of distinct locators currently being fetched
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Fetch and decode the resource behind `locator`.
    ///
    /// Joins the in-flight task for `locator` if there is one. Must be called
    /// from within a Tokio runtime.
    pub fn fetch(&self, locator: &str, progress: Option<ProgressHandler>) -> DownloadHandle<V> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (result_tx, result_rx) = oneshot::channel();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();

        let (task, is_new) = {
            let mut table = self.in_flight.lock();
            let (task, is_new) = match table.get(locator) {
                Some(task) => (task.clone(), false),
                None => {
                    let task = Arc::new(DownloadTask::new(locator));
                    table.insert(locator.to_owned(), task.clone());
                    (task, true)
                }
            };

            // Registered under the table lock so the task cannot finish
            // between lookup and subscription
            let mut state = task.state.lock();
            if let Some(last) = state.last_progress {
                let _ = progress_tx.send(last);
            }
            state.subscribers.insert(
                id,
                Subscriber {
                    result_tx,
                    progress_tx,
                },
            );
            drop(state);
            (task, is_new)
        };

        if is_new {
            debug!(locator = %locator, "Starting download");
            tokio::spawn(
                task.clone()
                    .run(self.fetcher.clone(), self.in_flight.clone()),
            );
        } else {
            debug!(locator = %locator, "Joining in-flight download");
        }

        let canceller = Canceller::new();
        {
            let in_flight = self.in_flight.clone();
            let task = task.clone();
            canceller.set_action(move || task.detach(&in_flight, id));
        }

        DownloadHandle {
            locator: locator.to_owned(),
            result_rx,
            progress_rx: Some(progress_rx),
            on_progress: progress,
            canceller,
            done: false,
        }
    }
}

/// Pending result of [`Downloader::fetch`].
///
/// Awaiting the handle drives the progress handler and resolves with the
/// decoded value. Dropping an unfinished handle cancels it.
pub struct DownloadHandle<V> {
    locator: String,
    result_rx: oneshot::Receiver<Result<V>>,
    progress_rx: Option<mpsc::UnboundedReceiver<Progress>>,
    on_progress: Option<ProgressHandler>,
    canceller: Canceller,
    done: bool,
}

impl<V> DownloadHandle<V> {
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Detach from the download. The handle resolves with `Cancelled`.
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    /// A cancel handle usable after the download handle has been moved
    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    /// Consume the handle as a stream of progress events ending in the result
    pub fn into_stream(mut self) -> DownloadStream<V> {
        self.on_progress = None;
        DownloadStream {
            handle: Some(self),
            result: None,
        }
    }

    fn poll_progress(&mut self, cx: &mut Context<'_>) -> Poll<Option<Progress>> {
        if self.canceller.is_cancelled() {
            self.progress_rx = None;
        }
        let Some(rx) = self.progress_rx.as_mut() else {
            return Poll::Ready(None);
        };
        match rx.poll_recv(cx) {
            Poll::Ready(None) => {
                self.progress_rx = None;
                Poll::Ready(None)
            }
            other => other,
        }
    }

    fn drain_progress(&mut self, cx: &mut Context<'_>) {
        while let Poll::Ready(Some(progress)) = self.poll_progress(cx) {
            if let Some(handler) = self.on_progress.as_mut() {
                handler(progress);
            }
        }
    }

    fn poll_result(&mut self, cx: &mut Context<'_>) -> Poll<Result<V>> {
        if self.done {
            return Poll::Ready(Err(MapleBaconError::Cancelled));
        }
        let result = ready!(Pin::new(&mut self.result_rx).poll(cx))
            .unwrap_or(Err(MapleBaconError::Cancelled));
        self.done = true;
        Poll::Ready(result)
    }
}

impl<V> Future for DownloadHandle<V> {
    type Output = Result<V>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.drain_progress(cx);
        let result = ready!(this.poll_result(cx));
        // Progress sent before the result is still queued
        this.drain_progress(cx);
        Poll::Ready(result)
    }
}

impl<V> Drop for DownloadHandle<V> {
    fn drop(&mut self) {
        if !self.done {
            self.canceller.cancel();
        }
    }
}

/// Item of a [`DownloadStream`]
#[derive(Debug)]
pub enum DownloadEvent<V> {
    Progress(Progress),
    Finished(Result<V>),
}

/// Stream view of a [`DownloadHandle`]: progress events, then exactly one
/// `Finished` event
pub struct DownloadStream<V> {
    handle: Option<DownloadHandle<V>>,
    result: Option<Result<V>>,
}

// Never pin-projected
impl<V> Unpin for DownloadStream<V> {}

impl<V> DownloadStream<V> {
    pub fn cancel(&self) {
        if let Some(handle) = &self.handle {
            handle.cancel();
        }
    }
}

impl<V> Stream for DownloadStream<V> {
    type Item = DownloadEvent<V>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(handle) = this.handle.as_mut() else {
            return Poll::Ready(None);
        };

        if this.result.is_none() {
            if let Poll::Ready(Some(progress)) = handle.poll_progress(cx) {
                return Poll::Ready(Some(DownloadEvent::Progress(progress)));
            }
            this.result = Some(ready!(handle.poll_result(cx)));
        }

        if let Poll::Ready(Some(progress)) = handle.poll_progress(cx) {
            return Poll::Ready(Some(DownloadEvent::Progress(progress)));
        }

        this.handle = None;
        Poll::Ready(this.result.take().map(DownloadEvent::Finished))
    }
}
