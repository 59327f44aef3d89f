//! Paced request queue
//!
//! The management API throttles concurrent certificate issuance, so those
//! calls go through one [`RequestQueue`] shared by every deployment. A single
//! timer pops and dispatches one entry per tick; it stops when the queue is
//! empty and the next submission starts it again.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::errors::DeployError;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct QueueState {
    pending: VecDeque<Job>,
    timer: Option<JoinHandle<()>>,
}

/// FIFO queue dispatching at most one request per interval
#[derive(Clone)]
pub struct RequestQueue {
    interval: Duration,
    state: Arc<Mutex<QueueState>>,
}

impl RequestQueue {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Arc::new(Mutex::new(QueueState {
                pending: VecDeque::new(),
                timer: None,
            })),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Queue `request` and wait for its outcome. The request starts no sooner
    /// than one interval after the previous dispatch.
    pub async fn submit<F, Fut, T>(&self, request: F) -> Result<T, DeployError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let receiver = self.enqueue(request).await;
        receiver
            .await
            .map_err(|_| DeployError::Internal("queued request was dropped before completing".to_string()))
    }

    /// Queue `request`, returning the channel its outcome is delivered on
    pub async fn enqueue<F, Fut, T>(&self, request: F) -> oneshot::Receiver<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let outcome = request().await;
                // the caller may have stopped waiting
                let _ = sender.send(outcome);
            })
        });

        let mut state = self.state.lock().await;
        state.pending.push_back(job);
        trace!("request queued, {} pending", state.pending.len());
        if state.timer.is_none() {
            debug!("starting request queue timer");
            state.timer = Some(tokio::spawn(run_timer(self.state.clone(), self.interval)));
        }
        receiver
    }

    /// Number of requests waiting for dispatch
    pub async fn pending(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Whether the dispatch timer is active
    pub async fn is_running(&self) -> bool {
        self.state.lock().await.timer.is_some()
    }
}

async fn run_timer(state: Arc<Mutex<QueueState>>, interval: Duration) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let job = {
            let mut state = state.lock().await;
            match state.pending.pop_front() {
                Some(job) => job,
                None => {
                    debug!("request queue drained, stopping timer");
                    state.timer = None;
                    return;
                }
            }
        };
        tokio::spawn(job());
    }
}
