//! The dispatch queue and flush scheduler.
//!
//! Producers enqueue serialized payloads; a flush drains them in FIFO batches to the
//! [`Uploader`]. Flushes are triggered by queue size, by a periodic timer thread, or explicitly,
//! and are single-flight: a request while one is in progress is absorbed, not queued twice.
//! Flush execution runs on the injected [`TaskRunner`], so the upload blocks the worker but
//! never producer threads. There is no busy-retry: a retryable upload failure leaves the batch
//! queued for the next natural trigger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::queue::PayloadQueue;
use crate::task_runner::TaskRunner;
use crate::uploader::Uploader;
use crate::{Error, Result};

/// Queue size at which a flush is triggered; also the maximum payloads per upload.
pub const DEFAULT_BATCH_SIZE: usize = 20;
/// Default interval of the periodic flush timer.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> DispatcherConfig {
        DispatcherConfig {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
    timer: Mutex<Option<FlushTimer>>,
}

struct DispatcherInner {
    queue: Mutex<PayloadQueue>,
    uploader: Arc<dyn Uploader>,
    runner: Arc<dyn TaskRunner>,
    batch_size: usize,
    flushing: AtomicBool,
    is_shutdown: AtomicBool,
}

impl Dispatcher {
    /// Create the dispatcher and start its periodic flush timer.
    pub fn new(
        queue: PayloadQueue,
        uploader: Arc<dyn Uploader>,
        runner: Arc<dyn TaskRunner>,
        config: DispatcherConfig,
    ) -> std::io::Result<Dispatcher> {
        let inner = Arc::new(DispatcherInner {
            queue: Mutex::new(queue),
            uploader,
            runner,
            batch_size: config.batch_size.max(1),
            flushing: AtomicBool::new(false),
            is_shutdown: AtomicBool::new(false),
        });

        let timer = FlushTimer::start(config.flush_interval, Arc::downgrade(&inner))?;

        Ok(Dispatcher {
            inner,
            timer: Mutex::new(Some(timer)),
        })
    }

    /// Append one serialized payload to the durable queue. Triggers a flush once the queue
    /// reaches the batch size. Queue-full and persistence problems are absorbed (logged); only
    /// shutdown is surfaced.
    pub fn enqueue(&self, serialized: String) -> Result<()> {
        if self.inner.is_shutdown.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }

        let should_flush = {
            let mut queue = self.inner.queue.lock().expect("queue lock poisoned");
            match queue.append(serialized) {
                Ok(Some(_dropped)) => {
                    log::warn!(target: "beacon", "payload queue full, dropped oldest payload");
                }
                Ok(None) => {}
                Err(err) => {
                    log::warn!(target: "beacon", "failed to persist payload to journal: {}", err);
                }
            }
            queue.len() >= self.inner.batch_size
        };

        if should_flush {
            self.inner.request_flush();
        }
        Ok(())
    }

    /// Request an asynchronous flush. Returns immediately; absorbed if a flush is already in
    /// progress.
    pub fn flush(&self) -> Result<()> {
        if self.inner.is_shutdown.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }
        self.inner.request_flush();
        Ok(())
    }

    /// Stop the timer, reject further enqueue/flush calls, and release the worker. An in-flight
    /// flush is allowed to complete. Idempotent: resources are released exactly once.
    pub fn shutdown(&self) {
        if self.inner.is_shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(timer) = self.timer.lock().expect("timer lock poisoned").take() {
            timer.stop();
        }
        self.inner.runner.shutdown();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown.load(Ordering::Acquire)
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.lock().expect("queue lock poisoned").len()
    }
}

impl DispatcherInner {
    fn request_flush(self: &Arc<Self>) {
        // Single-flight: a flush already in progress absorbs this request.
        if self.flushing.swap(true, Ordering::AcqRel) {
            return;
        }

        let inner = Arc::clone(self);
        self.runner.submit(Box::new(move || {
            inner.drain();
            inner.flushing.store(false, Ordering::Release);
        }));
    }

    // Drains the queue in FIFO batches. Items are removed only after the uploader acknowledges
    // their batch.
    fn drain(&self) {
        loop {
            let batch = {
                let queue = self.queue.lock().expect("queue lock poisoned");
                queue.batch(self.batch_size)
            };
            if batch.is_empty() {
                return;
            }

            match self.uploader.upload(&batch) {
                Ok(()) => {
                    let mut queue = self.queue.lock().expect("queue lock poisoned");
                    if let Err(err) = queue.remove(batch.len()) {
                        log::warn!(target: "beacon", "failed to compact journal: {}", err);
                    }
                    log::debug!(target: "beacon", "uploaded {} payloads", batch.len());
                }
                Err(err) if err.is_retryable() => {
                    // Left in place; the next size/time trigger retries.
                    log::debug!(target: "beacon", "upload failed, will retry on next flush: {}", err);
                    return;
                }
                Err(err) => {
                    log::warn!(target: "beacon", "dropping {} permanently rejected payloads: {}", batch.len(), err);
                    let mut queue = self.queue.lock().expect("queue lock poisoned");
                    if let Err(err) = queue.remove(batch.len()) {
                        log::warn!(target: "beacon", "failed to compact journal: {}", err);
                    }
                }
            }
        }
    }
}

/// Periodic flush trigger thread. Stopped through a bounded channel; `recv_timeout` doubles as
/// the tick.
struct FlushTimer {
    stop_sender: SyncSender<()>,
    join_handle: JoinHandle<()>,
}

impl FlushTimer {
    fn start(interval: Duration, dispatcher: Weak<DispatcherInner>) -> std::io::Result<FlushTimer> {
        let (stop_sender, stop_receiver) = std::sync::mpsc::sync_channel::<()>(1);

        let join_handle = std::thread::Builder::new()
            .name("beacon-flush".to_owned())
            .spawn(move || loop {
                match stop_receiver.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let Some(dispatcher) = dispatcher.upgrade() else {
                            return;
                        };
                        if dispatcher.is_shutdown.load(Ordering::Acquire) {
                            return;
                        }
                        dispatcher.request_flush();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        return;
                    }
                }
            })?;

        Ok(FlushTimer {
            stop_sender,
            join_handle,
        })
    }

    fn stop(self) {
        // Error means the buffer is full (a stop was already sent) or the thread exited; either
        // way the timer is stopping.
        let _ = self.stop_sender.try_send(());
        if self.join_handle.join().is_err() {
            log::error!(target: "beacon", "flush timer panicked");
        }
    }
}
