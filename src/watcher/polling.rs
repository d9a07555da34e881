//! Snapshot-diff event source. Lists processes on an interval and reports the
//! difference as creation / deletion records, for hosts (or configs) without
//! an instrumentation channel.

use super::{BatchSink, EventSource, InstanceEvent, Subscription};
use crate::error::{Error, Result};
use crate::os::{OsError, OsErrorKind, ProcessQuery};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

type Listing = BTreeMap<u32, String>;

pub struct PollingEventSource<Q> {
    query: Arc<Q>,
    interval: Duration,
}

impl<Q: ProcessQuery + 'static> PollingEventSource<Q> {
    pub fn new(query: Arc<Q>, interval: Duration) -> Self {
        Self { query, interval }
    }
}

fn listing<Q: ProcessQuery>(query: &Q) -> std::result::Result<Listing, OsError> {
    Ok(query
        .list_processes()?
        .into_iter()
        .map(|e| (e.pid, e.name))
        .collect())
}

/// Deletions first, then creations, each by pid. A pid whose name changed
/// was reused: it is reported as both.
fn diff(previous: &Listing, current: &Listing) -> Vec<InstanceEvent> {
    let mut events = Vec::new();
    for (pid, name) in previous {
        if current.get(pid) != Some(name) {
            events.push(InstanceEvent::deletion(*pid, name.clone()));
        }
    }
    for (pid, name) in current {
        if previous.get(pid) != Some(name) {
            events.push(InstanceEvent::creation(*pid, name.clone()));
        }
    }
    events
}

impl<Q: ProcessQuery + 'static> EventSource for PollingEventSource<Q> {
    fn subscribe(self, sink: BatchSink) -> Result<Box<dyn Subscription>> {
        let baseline = listing(self.query.as_ref()).map_err(Error::Subscription)?;
        let (stop, stopped) = mpsc::channel();
        let query = self.query;
        let interval = self.interval;
        let thread = thread::Builder::new()
            .name("procview-poll".to_string())
            .spawn(move || poll_loop(query.as_ref(), interval, baseline, sink, stopped))
            .map_err(|e| Error::Subscription(OsError::new("spawn", OsErrorKind::Other, 0, e.to_string())))?;
        debug!(interval_ms = interval.as_millis() as u64, "polling source started");
        Ok(Box::new(PollingSubscription {
            stop: Some(stop),
            thread: Some(thread),
        }))
    }
}

fn poll_loop<Q: ProcessQuery>(
    query: &Q,
    interval: Duration,
    mut known: Listing,
    sink: BatchSink,
    stopped: Receiver<()>,
) {
    loop {
        match stopped.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        let current = match listing(query) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "process listing failed; retrying next interval");
                continue;
            }
        };
        let batch = diff(&known, &current);
        known = current;
        if !batch.is_empty() {
            sink(batch);
        }
    }
}

struct PollingSubscription {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Subscription for PollingSubscription {
    fn cancel(&mut self) {
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("polling thread panicked");
            }
        }
    }
}

impl Drop for PollingSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
