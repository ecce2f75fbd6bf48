//! Abstract task execution for the dispatch worker.
//!
//! The flush scheduler only ever needs `submit(task)`: production uses a dedicated serial
//! background thread ([`ThreadRunner`]), tests substitute [`InlineRunner`] to make dispatch
//! synchronous and deterministic. No core logic depends on which.

use std::sync::mpsc::Sender;
use std::sync::Mutex;
use std::thread::JoinHandle;

pub type Task = Box<dyn FnOnce() + Send>;

pub trait TaskRunner: Send + Sync {
    /// Schedule `task`. Tasks run one at a time in submission order.
    fn submit(&self, task: Task);

    /// Stop accepting tasks and release worker resources. Submitted tasks are allowed to
    /// complete. Idempotent; the default is a no-op for runners without resources.
    fn shutdown(&self) {}
}

/// Runs tasks on a single dedicated background thread, in FIFO order.
pub struct ThreadRunner {
    sender: Mutex<Option<Sender<Task>>>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadRunner {
    pub fn new() -> std::io::Result<ThreadRunner> {
        let (sender, receiver) = std::sync::mpsc::channel::<Task>();

        let join_handle = std::thread::Builder::new()
            .name("beacon-dispatch".to_owned())
            .spawn(move || {
                // Exits when all senders are dropped.
                while let Ok(task) = receiver.recv() {
                    task();
                }
            })?;

        Ok(ThreadRunner {
            sender: Mutex::new(Some(sender)),
            join_handle: Mutex::new(Some(join_handle)),
        })
    }
}

impl TaskRunner for ThreadRunner {
    fn submit(&self, task: Task) {
        let sender = self.sender.lock().expect("runner lock poisoned");
        match &*sender {
            // Error means the worker exited, which only happens after shutdown.
            Some(sender) => {
                let _ = sender.send(task);
            }
            None => {
                log::debug!(target: "beacon", "task submitted after runner shutdown, dropping");
            }
        }
    }

    fn shutdown(&self) {
        // Dropping the sender makes the worker drain remaining tasks and exit.
        drop(self.sender.lock().expect("runner lock poisoned").take());
        if let Some(handle) = self.join_handle.lock().expect("runner lock poisoned").take() {
            if handle.join().is_err() {
                log::error!(target: "beacon", "dispatch worker panicked");
            }
        }
    }
}

/// Runs tasks immediately on the submitting thread. Used in tests.
pub struct InlineRunner;

impl TaskRunner for InlineRunner {
    fn submit(&self, task: Task) {
        task();
    }
}
