//! Per-host worker pool for XML-RPC calls.
//!
//! One Tokio task per destination host runs that host's calls in order.
//! Every worker reports into one bounded result channel which the provider
//! drains without blocking once per tick.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::transport::RpcTransport;
use super::xmlrpc::RpcError;

/// Completed calls buffered before workers wait on the tick.
const RESULT_CAPACITY: usize = 64;

/// One call to run.
#[derive(Debug)]
pub(crate) struct Job {
    pub correlation: u64,
    pub endpoint: String,
    pub body: String,
}

/// Outcome of a job, matched back by correlation.
#[derive(Debug)]
pub(crate) struct JobResult {
    pub correlation: u64,
    pub outcome: Result<String, RpcError>,
}

struct Worker {
    jobs: mpsc::UnboundedSender<Job>,
    task: JoinHandle<()>,
}

pub(crate) struct WorkerPool {
    transport: Arc<dyn RpcTransport>,
    runtime: Handle,
    workers: HashMap<String, Worker>,
    results_tx: mpsc::Sender<JobResult>,
    results_rx: mpsc::Receiver<JobResult>,
}

impl WorkerPool {
    pub fn new(transport: Arc<dyn RpcTransport>, runtime: Handle) -> Self {
        let (results_tx, results_rx) = mpsc::channel(RESULT_CAPACITY);
        Self {
            transport,
            runtime,
            workers: HashMap::new(),
            results_tx,
            results_rx,
        }
    }

    /// Queue a job on the worker for `host`, starting one if needed.
    pub fn submit(&mut self, host: &str, job: Job) {
        let job = match self.workers.get(host) {
            Some(worker) => match worker.jobs.send(job) {
                Ok(()) => return,
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        // No worker for the host, or its task has ended
        let worker = self.spawn_worker(host);
        if let Err(mpsc::error::SendError(job)) = worker.jobs.send(job) {
            debug!(host, correlation = job.correlation, "Worker refused job");
        }
        self.workers.insert(host.to_string(), worker);
    }

    fn spawn_worker(&self, host: &str) -> Worker {
        debug!(host, "Starting RPC worker");
        let (jobs, mut job_rx) = mpsc::unbounded_channel::<Job>();
        let transport = Arc::clone(&self.transport);
        let results = self.results_tx.clone();
        let host = host.to_string();

        let task = self.runtime.spawn(async move {
            while let Some(job) = job_rx.recv().await {
                trace!(%host, correlation = job.correlation, "Running RPC job");
                let outcome = transport.call(&job.endpoint, job.body).await;
                let result = JobResult {
                    correlation: job.correlation,
                    outcome,
                };
                if results.send(result).await.is_err() {
                    break;
                }
            }
        });

        Worker { jobs, task }
    }

    /// Completed results, without waiting.
    pub fn poll(&mut self) -> Vec<JobResult> {
        let mut results = Vec::new();
        while let Ok(result) = self.results_rx.try_recv() {
            results.push(result);
        }
        results
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop every worker. Calls already running are abandoned.
    pub fn release(&mut self) {
        for (host, worker) in self.workers.drain() {
            debug!(%host, "Releasing RPC worker");
            worker.task.abort();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::transport::tests::MockRpcTransport;
    use super::*;

    async fn poll_until(pool: &mut WorkerPool, count: usize) -> Vec<JobResult> {
        let mut results = Vec::new();
        for _ in 0..200 {
            results.extend(pool.poll());
            if results.len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        results
    }

    fn job(correlation: u64, body: &str) -> Job {
        Job {
            correlation,
            endpoint: "http://storage.local/xmlrpc/".to_string(),
            body: body.to_string(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_one_worker_per_host() {
        let transport = Arc::new(MockRpcTransport::new());
        transport.reply("one", Ok("1".to_string()));
        transport.reply("two", Ok("2".to_string()));
        let mut pool = WorkerPool::new(transport.clone(), Handle::current());

        pool.submit("storage.local", job(1, "one"));
        pool.submit("storage.local", job(2, "two"));
        pool.submit("other.local", job(3, "three"));
        assert_eq!(pool.worker_count(), 2);

        let mut results = poll_until(&mut pool, 3).await;
        results.sort_by_key(|r| r.correlation);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].outcome.as_deref().ok(), Some("1"));
        assert_eq!(results[1].outcome.as_deref().ok(), Some("2"));
        assert!(matches!(results[2].outcome, Err(RpcError::Status(404))));
        assert_eq!(transport.calls().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_release_drops_workers() {
        let transport = Arc::new(MockRpcTransport::new());
        let mut pool = WorkerPool::new(transport, Handle::current());

        pool.submit("storage.local", job(1, "x"));
        poll_until(&mut pool, 1).await;
        pool.release();
        assert_eq!(pool.worker_count(), 0);

        // A released host gets a fresh worker
        pool.submit("storage.local", job(2, "y"));
        assert_eq!(pool.worker_count(), 1);
        let results = poll_until(&mut pool, 1).await;
        assert_eq!(results[0].correlation, 2);
    }
}
