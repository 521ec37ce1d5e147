//! Per-job progress fan-out
//!
//! Two delivery paths share one publish call:
//! - callbacks registered with [`ProgressHub::register`], invoked inline
//! - a `tokio::sync::broadcast` channel per job, consumed as a
//!   [`ProgressStream`] (connected, progress..., then exactly one terminal
//!   event, with keepalives while idle)

use crate::job::{JobProgress, JobStatus, MigrationResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};

/// Event published for a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    /// Status or progress changed
    Progress {
        /// Job id
        job_id: String,
        /// Status at publish time
        status: JobStatus,
        /// Snapshot
        progress: JobProgress,
        /// Human-readable message
        message: String,
        /// Publish time
        timestamp: DateTime<Utc>,
    },
    /// Job completed
    Complete {
        /// Job id
        job_id: String,
        /// Result
        result: Box<MigrationResult>,
        /// Publish time
        timestamp: DateTime<Utc>,
    },
    /// Job failed
    Error {
        /// Job id
        job_id: String,
        /// Error message
        message: String,
        /// Publish time
        timestamp: DateTime<Utc>,
    },
}

impl ProgressEvent {
    /// Job the event belongs to
    #[must_use]
    pub fn job_id(&self) -> &str {
        match self {
            ProgressEvent::Progress { job_id, .. }
            | ProgressEvent::Complete { job_id, .. }
            | ProgressEvent::Error { job_id, .. } => job_id,
        }
    }

    /// Complete or error
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Progress { .. })
    }
}

/// Handle returned by [`ProgressHub::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(u64);

/// Progress callback
pub type ProgressListener = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Listener registry and broadcast channels keyed by job id
pub struct ProgressHub {
    listeners: DashMap<String, Vec<(ListenerId, ProgressListener)>>,
    channels: DashMap<String, broadcast::Sender<ProgressEvent>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl std::fmt::Debug for ProgressHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressHub")
            .field("jobs_with_listeners", &self.listeners.len())
            .field("channels", &self.channels.len())
            .field("buffer", &self.buffer)
            .finish()
    }
}

impl ProgressHub {
    /// Hub whose channels buffer `buffer` events per job
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            listeners: DashMap::new(),
            channels: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Add a callback for `job_id`
    pub fn register(&self, job_id: &str, listener: ProgressListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .entry(job_id.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove a callback; returns whether it was registered
    pub fn unregister(&self, job_id: &str, id: ListenerId) -> bool {
        let removed = match self.listeners.get_mut(job_id) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|(lid, _)| *lid != id);
                before != entry.len()
            }
            None => false,
        };
        self.listeners.remove_if(job_id, |_, v| v.is_empty());
        removed
    }

    /// Callbacks registered for `job_id`
    #[must_use]
    pub fn listener_count(&self, job_id: &str) -> usize {
        self.listeners.get(job_id).map_or(0, |v| v.len())
    }

    /// Receiver for every event published after this call
    #[must_use]
    pub fn subscribe(&self, job_id: &str) -> broadcast::Receiver<ProgressEvent> {
        self.channels
            .entry(job_id.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .subscribe()
    }

    /// Deliver `event` to the job's callbacks and stream subscribers
    pub fn publish(&self, event: &ProgressEvent) {
        self.recipients(event.job_id()).deliver(event);
    }

    /// Callbacks and channel of `job_id` as registered right now
    ///
    /// Listeners registered after this call do not receive the delivery.
    #[must_use]
    pub fn recipients(&self, job_id: &str) -> Recipients {
        Recipients {
            listeners: self
                .listeners
                .get(job_id)
                .map(|v| v.iter().map(|(_, l)| Arc::clone(l)).collect())
                .unwrap_or_default(),
            tx: self.channels.get(job_id).map(|tx| tx.clone()),
        }
    }

    /// Call a single listener with `event`
    pub fn notify_one(&self, job_id: &str, id: ListenerId, event: &ProgressEvent) {
        let listener = self.listeners.get(job_id).and_then(|v| {
            v.iter()
                .find(|(lid, _)| *lid == id)
                .map(|(_, l)| Arc::clone(l))
        });
        if let Some(listener) = listener {
            listener(event);
        }
    }

    /// Drop all listeners and channels of a job
    pub fn remove_job(&self, job_id: &str) {
        self.listeners.remove(job_id);
        self.channels.remove(job_id);
    }
}

/// Delivery targets captured by [`ProgressHub::recipients`]
pub struct Recipients {
    listeners: Vec<ProgressListener>,
    tx: Option<broadcast::Sender<ProgressEvent>>,
}

impl Recipients {
    /// Invoke the captured callbacks and send on the channel
    ///
    /// Runs outside any hub lock so listeners may (un)register.
    pub fn deliver(self, event: &ProgressEvent) {
        for listener in self.listeners {
            listener(event);
        }
        if let Some(tx) = self.tx {
            // No receivers is fine
            let _ = tx.send(event.clone());
        }
    }
}

/// Item of a [`ProgressStream`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum StreamEvent {
    /// First event: status at subscription time
    Connected {
        /// Job id
        job_id: String,
        /// Status
        status: JobStatus,
        /// Progress
        progress: JobProgress,
    },
    /// Progress update
    Progress {
        /// Job id
        job_id: String,
        /// Progress
        progress: JobProgress,
        /// Message
        message: String,
        /// Time
        timestamp: DateTime<Utc>,
    },
    /// Terminal success
    Complete {
        /// Job id
        job_id: String,
        /// Result
        result: Box<MigrationResult>,
    },
    /// Terminal failure or stream timeout
    Error {
        /// Job id
        job_id: String,
        /// Message
        message: String,
    },
    /// Idle marker
    KeepAlive,
}

impl From<ProgressEvent> for StreamEvent {
    fn from(event: ProgressEvent) -> Self {
        match event {
            ProgressEvent::Progress {
                job_id,
                progress,
                message,
                timestamp,
                ..
            } => StreamEvent::Progress {
                job_id,
                progress,
                message,
                timestamp,
            },
            ProgressEvent::Complete { job_id, result, .. } => {
                StreamEvent::Complete { job_id, result }
            }
            ProgressEvent::Error {
                job_id, message, ..
            } => StreamEvent::Error { job_id, message },
        }
    }
}

impl StreamEvent {
    /// SSE event name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Connected { .. } => "connected",
            StreamEvent::Progress { .. } => "progress",
            StreamEvent::Complete { .. } => "complete",
            StreamEvent::Error { .. } => "error",
            StreamEvent::KeepAlive => "keepalive",
        }
    }

    /// Complete or error
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. } | StreamEvent::Error { .. })
    }

    /// Server-sent-events framing
    #[must_use]
    pub fn to_sse(&self) -> String {
        if matches!(self, StreamEvent::KeepAlive) {
            return ": keepalive\n\n".to_string();
        }
        let data = serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "event": "error", "message": e.to_string() }).to_string()
        });
        format!("event: {}\ndata: {data}\n\n", self.name())
    }
}

struct Live {
    job_id: String,
    connected: Option<StreamEvent>,
    rx: broadcast::Receiver<ProgressEvent>,
    keepalive: Interval,
    deadline: Pin<Box<Sleep>>,
    done: bool,
}

async fn next_live(mut s: Live) -> Option<(StreamEvent, Live)> {
    if s.done {
        return None;
    }
    if let Some(connected) = s.connected.take() {
        return Some((connected, s));
    }
    loop {
        tokio::select! {
            msg = s.rx.recv() => match msg {
                Ok(event) => {
                    s.done = event.is_terminal();
                    return Some((event.into(), s));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(job_id = %s.job_id, skipped, "progress subscriber lagged");
                }
                Err(RecvError::Closed) => {
                    s.done = true;
                    let event = StreamEvent::Error {
                        job_id: s.job_id.clone(),
                        message: "progress channel closed".to_string(),
                    };
                    return Some((event, s));
                }
            },
            _ = s.keepalive.tick() => return Some((StreamEvent::KeepAlive, s)),
            () = &mut s.deadline => {
                s.done = true;
                let event = StreamEvent::Error {
                    job_id: s.job_id.clone(),
                    message: "progress stream exceeded its maximum duration".to_string(),
                };
                return Some((event, s));
            }
        }
    }
}

/// Event stream for one job
pub struct ProgressStream {
    inner: Pin<Box<dyn Stream<Item = StreamEvent> + Send>>,
}

impl std::fmt::Debug for ProgressStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressStream").finish_non_exhaustive()
    }
}

impl ProgressStream {
    /// Stream yielding a single terminal event
    #[must_use]
    pub fn terminal(event: StreamEvent) -> Self {
        Self {
            inner: Box::pin(stream::once(async move { event })),
        }
    }

    /// Live stream: `connected`, then events from `rx` until a terminal one
    ///
    /// Emits a keepalive every `keepalive` of idleness and an error event
    /// once `max_duration` has elapsed.
    #[must_use]
    pub fn live(
        connected: StreamEvent,
        rx: broadcast::Receiver<ProgressEvent>,
        job_id: impl Into<String>,
        keepalive: Duration,
        max_duration: Duration,
    ) -> Self {
        let period = keepalive.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let state = Live {
            job_id: job_id.into(),
            connected: Some(connected),
            rx,
            keepalive: interval,
            deadline: Box::pin(tokio::time::sleep(max_duration)),
            done: false,
        };
        Self {
            inner: Box::pin(stream::unfold(state, next_live)),
        }
    }
}

impl Stream for ProgressStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use parking_lot::Mutex;

    fn progress(job: &str, n: usize) -> ProgressEvent {
        ProgressEvent::Progress {
            job_id: job.into(),
            status: JobStatus::Running,
            progress: JobProgress {
                processed_files: n,
                ..JobProgress::default()
            },
            message: format!("{n}"),
            timestamp: Utc::now(),
        }
    }

    fn error(job: &str) -> ProgressEvent {
        ProgressEvent::Error {
            job_id: job.into(),
            message: "boom".into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn listeners_are_scoped_per_job() {
        let hub = ProgressHub::new(8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = hub.register("a", Arc::new(move |e| sink.lock().push(e.job_id().to_string())));

        hub.publish(&progress("a", 1));
        hub.publish(&progress("b", 1));
        assert_eq!(*seen.lock(), vec!["a".to_string()]);

        assert!(hub.unregister("a", id));
        assert!(!hub.unregister("a", id));
        assert_eq!(hub.listener_count("a"), 0);
        hub.publish(&progress("a", 2));
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_registration_is_safe() {
        let hub = Arc::new(ProgressHub::new(8));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let hub = Arc::clone(&hub);
            handles.push(tokio::spawn(async move {
                let id = hub.register("job", Arc::new(|_| {}));
                hub.publish(&progress("job", 1));
                hub.unregister("job", id)
            }));
        }
        for h in handles {
            assert!(h.await.unwrap());
        }
        assert_eq!(hub.listener_count("job"), 0);
    }

    #[tokio::test]
    async fn live_stream_ends_after_terminal_event() {
        let hub = ProgressHub::new(8);
        let rx = hub.subscribe("j");
        let connected = StreamEvent::Connected {
            job_id: "j".into(),
            status: JobStatus::Running,
            progress: JobProgress::default(),
        };
        let stream = ProgressStream::live(
            connected,
            rx,
            "j",
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        hub.publish(&progress("j", 1));
        hub.publish(&error("j"));
        hub.publish(&progress("j", 2));

        let names: Vec<&str> = stream.map(|e| e.name()).collect().await;
        assert_eq!(names, vec!["connected", "progress", "error"]);
    }

    #[tokio::test]
    async fn idle_stream_sends_keepalive_then_times_out() {
        let hub = ProgressHub::new(8);
        let connected = StreamEvent::Connected {
            job_id: "j".into(),
            status: JobStatus::Running,
            progress: JobProgress::default(),
        };
        let stream = ProgressStream::live(
            connected,
            hub.subscribe("j"),
            "j",
            Duration::from_millis(10),
            Duration::from_millis(35),
        );
        let events: Vec<StreamEvent> = stream.collect().await;
        assert_eq!(events.first().map(StreamEvent::name), Some("connected"));
        assert!(events.iter().any(|e| matches!(e, StreamEvent::KeepAlive)));
        let last = events.last().unwrap();
        assert!(matches!(last, StreamEvent::Error { message, .. } if message.contains("maximum duration")));
    }

    #[tokio::test]
    async fn terminal_stream_is_single_event() {
        let events: Vec<StreamEvent> = ProgressStream::terminal(error("j").into()).collect().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_terminal());
    }

    #[test]
    fn sse_framing() {
        assert_eq!(StreamEvent::KeepAlive.to_sse(), ": keepalive\n\n");
        let sse = StreamEvent::Error {
            job_id: "j".into(),
            message: "boom".into(),
        }
        .to_sse();
        assert_eq!(
            sse,
            "event: error\ndata: {\"event\":\"error\",\"job_id\":\"j\",\"message\":\"boom\"}\n\n"
        );
    }
}
