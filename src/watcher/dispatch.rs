//! Owner-thread work queue. Any thread may post; only the owner drains, in
//! enqueue order, against its own state `C`.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;
use thiserror::Error;

type Task<C> = Box<dyn FnOnce(&mut C) + Send>;

#[derive(Debug, Error)]
#[error("dispatcher has shut down")]
pub struct DispatcherClosed;

pub struct Dispatcher<C> {
    sender: Sender<Task<C>>,
    receiver: Receiver<Task<C>>,
}

/// Cloneable, `Send` posting end of a [`Dispatcher`].
pub struct DispatcherHandle<C> {
    sender: Sender<Task<C>>,
}

impl<C> Clone for DispatcherHandle<C> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<C> DispatcherHandle<C> {
    /// Non-blocking, FIFO.
    pub fn post(&self, task: impl FnOnce(&mut C) + Send + 'static) -> Result<(), DispatcherClosed> {
        self.sender.send(Box::new(task)).map_err(|_| DispatcherClosed)
    }
}

impl<C> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Dispatcher<C> {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver }
    }

    pub fn handle(&self) -> DispatcherHandle<C> {
        DispatcherHandle {
            sender: self.sender.clone(),
        }
    }

    /// Run everything queued right now, plus anything those tasks post.
    pub fn run_pending(&self, ctx: &mut C) -> usize {
        let mut ran = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(task) => {
                    task(ctx);
                    ran += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return ran,
            }
        }
    }

    /// Wait up to `timeout` for the first task, then drain.
    pub fn run_for(&self, ctx: &mut C, timeout: Duration) -> usize {
        match self.receiver.recv_timeout(timeout) {
            Ok(task) => {
                task(ctx);
                1 + self.run_pending(ctx)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn runs_tasks_in_post_order() {
        let d: Dispatcher<Vec<u32>> = Dispatcher::new();
        let h = d.handle();
        for i in 0..5 {
            h.post(move |v| v.push(i)).unwrap();
        }
        let mut out = Vec::new();
        assert_eq!(d.run_pending(&mut out), 5);
        assert_eq!(out, vec![0, 1, 2, 3, 4]);
        assert_eq!(d.run_pending(&mut out), 0);
    }

    #[test]
    fn accepts_posts_from_other_threads() {
        let d: Dispatcher<Vec<u32>> = Dispatcher::new();
        let h = d.handle();
        thread::spawn(move || {
            for i in 0..3 {
                h.post(move |v| v.push(i)).unwrap();
            }
        })
        .join()
        .unwrap();
        let mut out = Vec::new();
        d.run_for(&mut out, Duration::from_millis(100));
        assert_eq!(out, vec![0, 1, 2]);
    }

    #[test]
    fn post_after_drop_fails() {
        let d: Dispatcher<()> = Dispatcher::new();
        let h = d.handle();
        drop(d);
        assert!(h.post(|_| {}).is_err());
    }

    #[test]
    fn run_for_times_out_when_idle() {
        let d: Dispatcher<()> = Dispatcher::new();
        assert_eq!(d.run_for(&mut (), Duration::from_millis(10)), 0);
    }
}
