//! Process lifecycle watcher.
//!
//! An [`EventSource`] pushes batches of [`InstanceEvent`]s on a background
//! thread. The watcher classifies each record, resolves creations right there
//! on the delivering thread, and posts the result to the owner's
//! [`Dispatcher`]. The owner's callbacks therefore always run on the owner
//! thread, so the state they mutate needs no lock.
//!
//! - [`polling`]: snapshot-diff source, any platform
//! - `wmi`: WMI instrumentation source (Windows)

pub mod dispatch;
pub mod polling;
#[cfg(windows)]
pub mod wmi;

use crate::error::Result;
use crate::process::Process;
use crate::resolver::Resolve;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

pub use dispatch::{Dispatcher, DispatcherClosed, DispatcherHandle};
pub use polling::PollingEventSource;
#[cfg(windows)]
pub use wmi::WmiEventSource;

pub const CREATION_CLASS: &str = "__InstanceCreationEvent";
pub const DELETION_CLASS: &str = "__InstanceDeletionEvent";

/// One raw record as delivered by a source. The class name decides what it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceEvent {
    pub class_name: String,
    pub pid: u32,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Deleted,
}

impl InstanceEvent {
    pub fn creation(pid: u32, name: impl Into<String>) -> Self {
        Self {
            class_name: CREATION_CLASS.to_string(),
            pid,
            name: name.into(),
        }
    }

    pub fn deletion(pid: u32, name: impl Into<String>) -> Self {
        Self {
            class_name: DELETION_CLASS.to_string(),
            pid,
            name: name.into(),
        }
    }

    pub fn lifecycle(&self) -> Option<Lifecycle> {
        match self.class_name.as_str() {
            CREATION_CLASS => Some(Lifecycle::Created),
            DELETION_CLASS => Some(Lifecycle::Deleted),
            _ => None,
        }
    }
}

/// Receives batches on the source's thread.
pub type BatchSink = Box<dyn Fn(Vec<InstanceEvent>) + Send + Sync>;

/// A push channel of process lifecycle records.
pub trait EventSource {
    /// Connect and start delivering to `sink`. Called exactly once.
    fn subscribe(self, sink: BatchSink) -> Result<Box<dyn Subscription>>;
}

/// A live subscription. `cancel` returns only once no further sink call can start.
pub trait Subscription {
    fn cancel(&mut self);
}

struct Callbacks<C> {
    on_added: Box<dyn Fn(&mut C, Process) + Send + Sync>,
    on_removed: Box<dyn Fn(&mut C, u32) + Send + Sync>,
}

enum Change {
    Added(Process),
    Removed(u32),
}

impl<C> Callbacks<C> {
    fn apply(&self, ctx: &mut C, change: Change) {
        match change {
            Change::Added(p) => (self.on_added)(ctx, p),
            Change::Removed(pid) => (self.on_removed)(ctx, pid),
        }
    }
}

/// Keeps one subscription alive and routes its events to the owner.
///
/// Not `Send`: it is dropped on the owner thread, which is what makes
/// "no callback after drop" hold.
pub struct ProcessWatcher<C> {
    subscription: Option<Box<dyn Subscription>>,
    callbacks: Option<Arc<Callbacks<C>>>,
}

impl<C: 'static> ProcessWatcher<C> {
    pub fn new<S, A, R>(
        source: S,
        resolver: Arc<dyn Resolve>,
        dispatcher: DispatcherHandle<C>,
        on_added: A,
        on_removed: R,
    ) -> Result<Self>
    where
        S: EventSource,
        A: Fn(&mut C, Process) + Send + Sync + 'static,
        R: Fn(&mut C, u32) + Send + Sync + 'static,
    {
        let callbacks = Arc::new(Callbacks {
            on_added: Box::new(on_added),
            on_removed: Box::new(on_removed),
        });
        let weak = Arc::downgrade(&callbacks);
        let sink: BatchSink =
            Box::new(move |batch| deliver_batch(batch, resolver.as_ref(), &dispatcher, &weak));

        let subscription = source.subscribe(sink)?;
        info!("process watcher subscribed");
        Ok(Self {
            subscription: Some(subscription),
            callbacks: Some(callbacks),
        })
    }
}

impl<C> Drop for ProcessWatcher<C> {
    fn drop(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
        // Queued tasks only hold a Weak; they turn into no-ops from here on.
        self.callbacks.take();
        debug!("process watcher stopped");
    }
}

fn deliver_batch<C: 'static>(
    batch: Vec<InstanceEvent>,
    resolver: &dyn Resolve,
    dispatcher: &DispatcherHandle<C>,
    callbacks: &Weak<Callbacks<C>>,
) {
    for record in batch {
        let change = match record.lifecycle() {
            Some(Lifecycle::Created) => match resolver.resolve(record.pid, &record.name) {
                Ok(Some(process)) => Change::Added(process),
                Ok(None) => {
                    debug!(pid = record.pid, name = %record.name, "created process already exited");
                    continue;
                }
                Err(e) => {
                    warn!(pid = record.pid, name = %record.name, error = %e, "skipping creation event");
                    continue;
                }
            },
            Some(Lifecycle::Deleted) => Change::Removed(record.pid),
            None => {
                debug!(class = %record.class_name, pid = record.pid, "ignoring event class");
                continue;
            }
        };

        let callbacks = callbacks.clone();
        let posted = dispatcher.post(move |ctx| {
            if let Some(cb) = callbacks.upgrade() {
                cb.apply(ctx, change);
            }
        });
        if posted.is_err() {
            debug!("owner dispatcher closed; dropping events");
            return;
        }
    }
}
