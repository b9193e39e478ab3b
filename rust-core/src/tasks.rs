//! Background task bookkeeping.
//!
//! Location captures and notification dispatches are fire-and-forget from
//! the caller's point of view. They still need an owner: a dropped
//! `smol::Task` is cancelled, and tests need a way to wait for in-flight
//! work. `BackgroundTasks` holds them until they finish, lets callers
//! `flush` them, and detaches whatever is left when it is dropped so
//! pending notifications still go out during teardown.

use std::future::Future;
use std::sync::Mutex;

use smol::Task;
use tracing::warn;

/// A set of spawned, unawaited tasks.
#[derive(Debug, Default)]
pub struct BackgroundTasks {
    tasks: Mutex<Vec<Task<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `future` on the global executor and keep its handle.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = smol::spawn(future);
        match self.tasks.lock() {
            Ok(mut tasks) => {
                tasks.retain(|t| !t.is_finished());
                tasks.push(task);
            }
            Err(_) => {
                warn!("task list poisoned, detaching task");
                task.detach();
            }
        }
    }

    /// Number of tasks not yet finished.
    pub fn pending(&self) -> usize {
        self.tasks
            .lock()
            .map(|tasks| tasks.iter().filter(|t| !t.is_finished()).count())
            .unwrap_or(0)
    }

    /// Wait for every task, including ones spawned while waiting.
    pub async fn flush(&self) {
        loop {
            let batch: Vec<Task<()>> = match self.tasks.lock() {
                Ok(mut tasks) => tasks.drain(..).collect(),
                Err(_) => return,
            };
            if batch.is_empty() {
                return;
            }
            for task in batch {
                task.await;
            }
        }
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.detach();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_flush_waits_for_all() {
        let tasks = BackgroundTasks::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let counter = Arc::clone(&counter);
            tasks.spawn(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        smol::block_on(tasks.flush());
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(tasks.pending(), 0);
    }

    #[test]
    fn test_drop_detaches() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = smol::channel::bounded::<()>(1);
        {
            let tasks = BackgroundTasks::new();
            let counter = Arc::clone(&counter);
            tasks.spawn(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(()).await;
            });
        }
        smol::block_on(rx.recv()).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
