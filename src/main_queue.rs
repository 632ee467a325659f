//! Hand-off point between background work and the UI thread.
//!
//! Completions are boxed and sent to a [`MainQueue`] which the UI loop drains
//! on its own thread, so callbacks never run on a runtime worker.

use tokio::sync::mpsc;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Sending side, cloned into whatever needs to reach the main context.
#[derive(Clone)]
pub struct MainHandle {
    tx: mpsc::UnboundedSender<Task>,
}

/// Receiving side, owned by the UI loop.
pub struct MainQueue {
    rx: mpsc::UnboundedReceiver<Task>,
}

pub fn main_queue() -> (MainHandle, MainQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MainHandle { tx }, MainQueue { rx })
}

impl MainHandle {
    /// Schedule `task` on the main context. Returns false once the queue is gone.
    pub fn dispatch<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx.send(Box::new(task)).is_ok()
    }
}

impl MainQueue {
    /// Run every task queued so far without waiting. Returns how many ran.
    pub fn drain(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Wait for the next task and run it. Returns false when every handle is dropped.
    pub async fn run_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn tasks_run_only_when_drained_in_order() {
        let (handle, mut queue) = main_queue();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            assert!(handle.dispatch(move || log.lock().unwrap().push(i)));
        }
        assert!(log.lock().unwrap().is_empty());

        assert_eq!(queue.drain(), 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(queue.drain(), 0);
    }

    #[tokio::test]
    async fn run_next_stops_after_handles_drop() {
        let (handle, mut queue) = main_queue();
        handle.dispatch(|| {});
        drop(handle);
        assert!(queue.run_next().await);
        assert!(!queue.run_next().await);
    }

    #[test]
    fn dispatch_fails_once_queue_is_dropped() {
        let (handle, queue) = main_queue();
        drop(queue);
        assert!(!handle.dispatch(|| {}));
    }
}
