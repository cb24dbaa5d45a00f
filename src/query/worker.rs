//! Worker pool
//!
//! Long-lived OS threads consuming scan jobs from a bounded queue. Each
//! job produces private partial top-k buffers and ships them back over a
//! per-search reply channel; the dispatcher counts replies, which doubles
//! as the completion latch. The pool never shares buffers between jobs, so
//! no lock is held during distance computation.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::info;

use crate::query::scan::{scan_partition_batched, scan_partition_serial, ScanContext};
use crate::query::topk::TopKBuffer;
use crate::types::PartitionId;
use crate::{Error, Result};

/// Unit of scan work, keyed by partition (batched) or by
/// `(query, partition)` pair (serial).
#[derive(Debug, Clone)]
pub(crate) enum ScanJob {
    Batched {
        partition: PartitionId,
        queries: Vec<usize>,
    },
    Serial {
        query: usize,
        partition: PartitionId,
    },
}

pub(crate) struct JobRequest {
    pub ctx: Arc<ScanContext>,
    pub job: ScanJob,
    pub reply: Sender<JobReply>,
}

pub(crate) struct JobReply {
    /// Partial buffers per query index, or the captured job error.
    pub partials: Result<Vec<(usize, TopKBuffer)>>,
}

/// Execute one job against the shared scan context.
pub(crate) fn run_job(ctx: &ScanContext, job: ScanJob) -> Result<Vec<(usize, TopKBuffer)>> {
    match job {
        ScanJob::Batched { partition, queries } => scan_partition_batched(ctx, partition, &queries),
        ScanJob::Serial { query, partition } => {
            scan_partition_serial(ctx, partition, query).map(|buffer| vec![(query, buffer)])
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Uninitialized,
    Running,
    Draining,
    Shutdown,
}

struct PoolInner {
    state: PoolState,
    sender: Option<Sender<JobRequest>>,
    handles: Vec<JoinHandle<()>>,
}

/// Pool of long-lived scan workers owned by the coordinator.
pub(crate) struct WorkerPool {
    queue_capacity: usize,
    inner: Mutex<PoolInner>,
}

impl WorkerPool {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue_capacity: queue_capacity.max(1),
            inner: Mutex::new(PoolInner {
                state: PoolState::Uninitialized,
                sender: None,
                handles: Vec::new(),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().state == PoolState::Running
    }

    /// Spawn `num_workers` threads and open the job queue.
    pub fn initialize(&self, num_workers: usize) -> Result<()> {
        if num_workers == 0 {
            return Err(Error::invalid_input(
                "worker pool requires at least one worker",
            ));
        }
        let mut inner = self.inner.lock();
        if inner.state == PoolState::Running {
            return Err(Error::invalid_state("workers are already initialized"));
        }
        if inner.state == PoolState::Draining {
            return Err(Error::cancelled("worker pool is draining"));
        }

        let (sender, receiver) = bounded::<JobRequest>(self.queue_capacity);
        let mut handles = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("quiver-scan-{worker_id}"))
                .spawn(move || worker_loop(receiver))
                .map_err(|err| Error::backend(format!("failed to spawn scan worker: {err}")))?;
            handles.push(handle);
        }

        inner.state = PoolState::Running;
        inner.sender = Some(sender);
        inner.handles = handles;
        info!(num_workers, "scan worker pool initialized");
        Ok(())
    }

    /// Handle for enqueueing jobs. Fails once the pool is draining or down.
    pub fn job_sender(&self) -> Result<Sender<JobRequest>> {
        let inner = self.inner.lock();
        match inner.state {
            PoolState::Running => inner
                .sender
                .clone()
                .ok_or_else(|| Error::invalid_state("worker pool lost its job queue")),
            PoolState::Draining => Err(Error::cancelled("worker pool is draining")),
            PoolState::Uninitialized | PoolState::Shutdown => {
                Err(Error::invalid_state("worker pool is not running"))
            }
        }
    }

    /// Refuse new jobs, let queued and in-flight jobs finish, then join the
    /// worker threads. Idempotent.
    pub fn shutdown(&self) {
        let handles = {
            let mut inner = self.inner.lock();
            if inner.state != PoolState::Running {
                return;
            }
            inner.state = PoolState::Draining;
            // Dropping the last sender closes the queue; workers exit after
            // draining what was already enqueued.
            inner.sender = None;
            std::mem::take(&mut inner.handles)
        };

        let num_workers = handles.len();
        for handle in handles {
            let _ = handle.join();
        }

        self.inner.lock().state = PoolState::Shutdown;
        info!(num_workers, "scan worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: Receiver<JobRequest>) {
    while let Ok(request) = receiver.recv() {
        let partials = run_job(&request.ctx, request.job);
        // The dispatcher may have bailed out already; a closed reply
        // channel is not the worker's problem.
        let _ = request.reply.send(JobReply { partials });
    }
}
