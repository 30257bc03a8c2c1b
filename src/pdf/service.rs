//! Render service - manages the worker pool

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;

use flume::{Receiver, Sender};
use log::{debug, error};

use super::handle::{RenderFault, RenderHandle};
use super::registry::DocumentRegistry;
use super::request::{RenderRequest, RequestId};
use super::worker::{Job, LoadJob, RenderTask, render_worker};

/// Worker count used when settings leave it at zero
#[must_use]
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism().map_or(2, std::num::NonZeroUsize::get)
}

/// Submission side of the worker pool, shared by the registry and gateway
#[derive(Clone, Debug)]
pub struct JobQueue {
    tx: Sender<Job>,
    next_request_id: Arc<AtomicU64>,
    stopped: Arc<AtomicBool>,
}

impl JobQueue {
    pub(crate) fn next_request_id(&self) -> RequestId {
        RequestId::new(self.next_request_id.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Queue a render. The handle resolves from a worker, or right away with
    /// `ExecutorStopped` once the pool is gone.
    pub(crate) fn submit_render(
        &self,
        request: RenderRequest,
        registry: Arc<DocumentRegistry>,
    ) -> RenderHandle {
        let id = self.next_request_id();
        if self.is_stopped() {
            error!("Render {id} submitted after executor shutdown");
            return RenderHandle::resolved(id, Err(RenderFault::ExecutorStopped));
        }

        let (reply, handle) = RenderHandle::channel(id);
        debug!(
            "Queueing render {id} of {}/{} at {}",
            request.document_id, request.page, request.size
        );
        let task = RenderTask {
            request,
            registry,
            reply,
        };

        if let Err(flume::SendError(job)) = self.tx.send(Job::Render(task)) {
            error!("Render {id} could not be queued: executor is gone");
            if let Job::Render(task) = job {
                task.reply.resolve(Err(RenderFault::ExecutorStopped));
            }
        }
        handle
    }

    /// Queue a document load. Returns false if the pool is gone.
    pub(crate) fn submit_load(&self, job: LoadJob) -> bool {
        if self.is_stopped() {
            return false;
        }
        self.tx.send(Job::Load(job)).is_ok()
    }
}

/// Fixed pool of named render threads pulling from one shared queue
pub struct RenderExecutor {
    queue: JobQueue,
    num_workers: usize,
    workers: Vec<JoinHandle<()>>,
    /// Kept so leftover jobs can be drained after the workers exit
    drain_rx: Receiver<Job>,
}

impl RenderExecutor {
    /// Spawn `num_workers` threads (at least one)
    pub fn new(num_workers: usize) -> std::io::Result<Self> {
        let num_workers = num_workers.max(1);

        // flume gives MPMC: every worker clones the receiver and pulls from
        // the same queue.
        let (tx, rx) = flume::unbounded();

        let mut workers = Vec::with_capacity(num_workers);
        for worker in 0..num_workers {
            let jobs = rx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("pdf-render-{worker}"))
                .spawn(move || render_worker(worker, jobs));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Release the threads that did start before bailing out
                    for _ in 0..workers.len() {
                        let _ = tx.send(Job::Shutdown);
                    }
                    return Err(e);
                }
            }
        }

        debug!("Render executor started with {num_workers} workers");

        Ok(Self {
            queue: JobQueue {
                tx,
                next_request_id: Arc::new(AtomicU64::new(1)),
                stopped: Arc::new(AtomicBool::new(false)),
            },
            num_workers,
            workers,
            drain_rx: rx,
        })
    }

    #[must_use]
    pub fn queue(&self) -> JobQueue {
        self.queue.clone()
    }

    #[must_use]
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Shutdown all workers. Work queued before this call still runs.
    pub fn shutdown(&self) {
        if self.queue.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        for _ in 0..self.num_workers {
            let _ = self.queue.tx.send(Job::Shutdown);
        }
    }
}

impl Drop for RenderExecutor {
    fn drop(&mut self) {
        self.shutdown();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Render worker thread panicked");
            }
        }

        // Jobs that raced in behind the shutdown messages never run; dropping
        // their reply slots resolves the handles as abandoned.
        let leftover = self.drain_rx.drain().count();
        if leftover > 0 {
            debug!("Dropped {leftover} jobs queued after shutdown");
        }
    }
}
