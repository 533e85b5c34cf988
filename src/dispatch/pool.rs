//! Work queue and worker pool.
//!
//! # Responsibilities
//! - Own the admission controller, the bounded queue and the workers
//! - Start N workers once, each pulling one job at a time
//! - Hand every outcome to the job's reply path
//! - Stop cleanly: refuse new work, drain what is queued, join workers
//!
//! # Design Decisions
//! - Queue capacity equals worker count; admission guarantees it never fills
//! - Workers share one receiver behind an async mutex (multi-consumer)
//! - The slot is released before delivery so a caller that retries right
//!   after its answer sees the freed capacity

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use futures_util::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::dispatch::admission::{AdmissionController, CapacityPermit};
use crate::dispatch::router::{Reply, Ticket};
use crate::dispatch::types::{DispatchError, ForwardError, WorkItem};
use crate::forward::Forward;
use crate::observability::metrics;

/// A queued work item with its reply path and the slot it occupies.
struct Job {
    item: WorkItem,
    reply: Reply,
    permit: CapacityPermit,
    queued_at: Instant,
}

type SharedQueue = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Bounded-concurrency forwarding engine.
pub struct Dispatcher {
    admission: AdmissionController,
    queue: RwLock<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawn `workers` workers driving `forwarder`. Must be called inside a
    /// Tokio runtime.
    pub fn start(workers: usize, forwarder: Arc<dyn Forward>) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel(workers);
        let rx: SharedQueue = Arc::new(Mutex::new(rx));

        let handles = (0..workers)
            .map(|worker_id| tokio::spawn(worker_loop(worker_id, rx.clone(), forwarder.clone())))
            .collect();

        tracing::info!(workers, "Worker pool started");

        Self {
            admission: AdmissionController::new(workers),
            queue: RwLock::new(Some(tx)),
            workers: Mutex::new(handles),
        }
    }

    /// Admit and enqueue a work item.
    ///
    /// Never blocks: a saturated pool is refused immediately. The returned
    /// ticket resolves to the outcome (synchronous items) or is detached.
    pub fn submit(&self, item: WorkItem) -> Result<Ticket, DispatchError> {
        let permit = match self.admission.try_admit() {
            Ok(permit) => permit,
            Err(e) => {
                tracing::warn!(
                    request_id = %item.id,
                    capacity = self.admission.capacity(),
                    error = %e,
                    "Admission rejected"
                );
                metrics::record_admission(false);
                return Err(e);
            }
        };

        tracing::debug!(
            request_id = %item.id,
            available = self.admission.available(),
            "Admitted"
        );
        metrics::record_admission(true);

        let sender = self
            .queue
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(DispatchError::ShuttingDown)?;

        let (reply, ticket) = if item.fire_and_forget {
            (Reply::Detached, Ticket::Detached)
        } else {
            Reply::channel()
        };

        let job = Job {
            item,
            reply,
            permit,
            queued_at: Instant::now(),
        };

        sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::SaturatedCapacity,
            mpsc::error::TrySendError::Closed(_) => DispatchError::ShuttingDown,
        })?;

        Ok(ticket)
    }

    /// Idle worker slots.
    pub fn available(&self) -> usize {
        self.admission.available()
    }

    /// Admitted items not yet finished.
    pub fn in_flight(&self) -> usize {
        self.admission.in_flight()
    }

    /// Worker count.
    pub fn capacity(&self) -> usize {
        self.admission.capacity()
    }

    /// Refuse new work, let workers drain the queue, and wait for them.
    pub async fn shutdown(&self) {
        self.admission.close();
        self.queue
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        if handles.is_empty() {
            return;
        }

        tracing::info!(
            workers = handles.len(),
            in_flight = self.in_flight(),
            "Draining worker pool"
        );
        for result in futures_util::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker task ended abnormally");
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

/// Worker task: pull one job, process it exclusively, repeat until the
/// queue is closed and empty.
async fn worker_loop(worker_id: usize, queue: SharedQueue, forwarder: Arc<dyn Forward>) {
    tracing::trace!(worker_id, "Worker started");

    loop {
        let job = {
            let mut rx = queue.lock().await;
            rx.recv().await
        };
        let Some(job) = job else { break };
        process(worker_id, job, forwarder.as_ref()).await;
    }

    tracing::trace!(worker_id, "Worker stopped");
}

async fn process(worker_id: usize, job: Job, forwarder: &dyn Forward) {
    let Job {
        item,
        reply,
        permit,
        queued_at,
    } = job;

    let started = Instant::now();
    tracing::debug!(
        worker_id,
        request_id = %item.id,
        target = %item.target,
        queued_ms = started.duration_since(queued_at).as_millis() as u64,
        "Forwarding"
    );

    let outcome = {
        let _in_flight = metrics::InFlightGuard::new();
        match AssertUnwindSafe(forwarder.forward(&item)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(worker_id, request_id = %item.id, "Forwarder panicked");
                Err(ForwardError::Internal("forwarder panicked".to_string()))
            }
        }
    };

    metrics::record_outcome(&outcome, started);
    match &outcome {
        Ok(result) => tracing::info!(
            worker_id,
            request_id = %item.id,
            status = %result.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Forward completed"
        ),
        Err(e) => tracing::error!(
            worker_id,
            request_id = %item.id,
            error = %e,
            "Forward failed"
        ),
    }

    drop(permit);
    reply.deliver(&item.id, outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::types::{ForwardOutcome, ForwardResult, Payload, TransportError};
    use async_trait::async_trait;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, Method, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    fn item(target: &str, fire_and_forget: bool) -> WorkItem {
        WorkItem {
            id: format!("req-{}", target),
            method: Method::GET,
            target: format!("http://{}/", target).parse().unwrap(),
            payload: Payload::Form(Vec::new()),
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            fire_and_forget,
        }
    }

    fn echo(item: &WorkItem) -> ForwardOutcome {
        Ok(ForwardResult {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            body: Bytes::from(item.target.to_string()),
        })
    }

    /// Holds every forward until the test releases a permit.
    struct Gated {
        gate: Arc<Semaphore>,
        concurrent: AtomicUsize,
        peak: AtomicUsize,
        completed: AtomicUsize,
    }

    impl Gated {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                gate: Arc::new(Semaphore::new(0)),
                concurrent: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Forward for Gated {
        async fn forward(&self, item: &WorkItem) -> ForwardOutcome {
            let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.gate.acquire().await.unwrap().forget();
            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            self.completed.fetch_add(1, Ordering::SeqCst);
            echo(item)
        }
    }

    /// Sleeps longer for earlier targets so completions come back reordered.
    struct Staggered;

    #[async_trait]
    impl Forward for Staggered {
        async fn forward(&self, item: &WorkItem) -> ForwardOutcome {
            let delay = if item.target.host() == Some("first") { 60 } else { 5 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            echo(item)
        }
    }

    struct Unreachable;

    #[async_trait]
    impl Forward for Unreachable {
        async fn forward(&self, _item: &WorkItem) -> ForwardOutcome {
            Err(ForwardError::Exhausted {
                attempts: 3,
                last: TransportError::Connect("refused".into()),
            })
        }
    }

    struct Panicky;

    #[async_trait]
    impl Forward for Panicky {
        async fn forward(&self, item: &WorkItem) -> ForwardOutcome {
            if item.target.host() == Some("boom") {
                panic!("forwarder exploded");
            }
            echo(item)
        }
    }

    async fn wait_until_idle(dispatcher: &Dispatcher) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while dispatcher.available() != dispatcher.capacity() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("pool never became idle");
    }

    #[tokio::test]
    async fn rejects_submission_beyond_capacity() {
        let forwarder = Gated::new();
        let dispatcher = Dispatcher::start(2, forwarder.clone());

        let a = dispatcher.submit(item("a", false)).unwrap();
        let b = dispatcher.submit(item("b", false)).unwrap();
        assert_eq!(
            dispatcher.submit(item("c", false)).unwrap_err(),
            DispatchError::SaturatedCapacity
        );
        assert_eq!(dispatcher.in_flight(), 2);

        forwarder.gate.add_permits(2);
        assert!(a.outcome().await.unwrap().unwrap().is_ok());
        assert!(b.outcome().await.unwrap().unwrap().is_ok());
        assert_eq!(dispatcher.available(), 2);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_worker_count() {
        let forwarder = Gated::new();
        let dispatcher = Arc::new(Dispatcher::start(3, forwarder.clone()));
        forwarder.gate.add_permits(1_000);

        let mut tickets = Vec::new();
        let mut i = 0;
        while tickets.len() < 30 {
            match dispatcher.submit(item(&format!("t{}", i), false)) {
                Ok(ticket) => tickets.push(ticket),
                Err(DispatchError::SaturatedCapacity) => tokio::task::yield_now().await,
                Err(e) => panic!("unexpected {:?}", e),
            }
            i += 1;
        }
        for ticket in tickets {
            assert!(ticket.outcome().await.unwrap().unwrap().is_ok());
        }

        assert!(forwarder.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(forwarder.completed.load(Ordering::SeqCst), 30);
    }

    #[tokio::test]
    async fn each_caller_gets_its_own_result() {
        let dispatcher = Dispatcher::start(2, Arc::new(Staggered));

        let first = dispatcher.submit(item("first", false)).unwrap();
        let second = dispatcher.submit(item("second", false)).unwrap();

        let (first, second) = tokio::join!(first.outcome(), second.outcome());
        let first = first.unwrap().unwrap().unwrap();
        let second = second.unwrap().unwrap().unwrap();
        assert_eq!(first.body, Bytes::from_static(b"http://first/"));
        assert_eq!(second.body, Bytes::from_static(b"http://second/"));
    }

    #[tokio::test]
    async fn exhausted_forward_still_answers_and_frees_slot() {
        let dispatcher = Dispatcher::start(1, Arc::new(Unreachable));

        let ticket = dispatcher.submit(item("down", false)).unwrap();
        let outcome = ticket.outcome().await.unwrap().unwrap();
        assert!(matches!(outcome, Err(ForwardError::Exhausted { attempts: 3, .. })));
        assert_eq!(dispatcher.available(), 1);
    }

    #[tokio::test]
    async fn fire_and_forget_returns_before_forward_completes() {
        let forwarder = Gated::new();
        let dispatcher = Dispatcher::start(1, forwarder.clone());

        let ticket = dispatcher.submit(item("detached", true)).unwrap();
        assert!(ticket.is_detached());
        assert!(ticket.outcome().await.unwrap().is_none());
        assert_eq!(forwarder.completed.load(Ordering::SeqCst), 0);

        forwarder.gate.add_permits(1);
        wait_until_idle(&dispatcher).await;
        assert_eq!(forwarder.completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn worker_survives_a_panicking_forward() {
        let dispatcher = Dispatcher::start(1, Arc::new(Panicky));

        let failed = dispatcher.submit(item("boom", false)).unwrap();
        let outcome = failed.outcome().await.unwrap().unwrap();
        assert!(matches!(outcome, Err(ForwardError::Internal(_))));

        let next = dispatcher.submit(item("fine", false)).unwrap();
        assert!(next.outcome().await.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn shutdown_drains_queue_then_refuses() {
        let forwarder = Gated::new();
        let dispatcher = Dispatcher::start(2, forwarder.clone());

        let a = dispatcher.submit(item("a", false)).unwrap();
        let b = dispatcher.submit(item("b", false)).unwrap();
        forwarder.gate.add_permits(2);

        dispatcher.shutdown().await;

        assert!(a.outcome().await.unwrap().unwrap().is_ok());
        assert!(b.outcome().await.unwrap().unwrap().is_ok());
        assert_eq!(
            dispatcher.submit(item("late", false)).unwrap_err(),
            DispatchError::ShuttingDown
        );
        dispatcher.shutdown().await;
    }
}
