//! procview entrypoint: prints a sorted process snapshot, then optionally keeps
//! it current from lifecycle events until Ctrl+C.

use procview::{
    config::{ViewerConfig, WatchSource},
    logging::{ProcessLine, StructuredLogger},
    resolver::Resolve,
    watcher::PollingEventSource,
    Dispatcher, Enumerator, MetadataResolver, PlatformQuery, Process, ProcessWatcher, SortedRegistry,
};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

static STOP: AtomicBool = AtomicBool::new(false);

fn print_row(json: bool, event: &str, process: &Process) {
    let mut out = std::io::stdout().lock();
    let result = if json {
        StructuredLogger::emit_json(&ProcessLine::row(event, process), &mut out)
    } else {
        writeln!(
            out,
            "{:>7}  {:<32}  {:<10}  {:<16}  {:<18}  {}",
            process.pid,
            process.name,
            process.process_type_label(),
            process.architecture_label(),
            process.integrity_label(),
            process.executable_path
        )
    };
    if let Err(e) = result {
        warn!(error = %e, "stdout write failed");
    }
}

fn print_removed(json: bool, pid: u32) {
    let mut out = std::io::stdout().lock();
    let result = if json {
        StructuredLogger::emit_json(&ProcessLine::removed(pid), &mut out)
    } else {
        writeln!(out, "{:>7}  <exited>", pid)
    };
    if let Err(e) = result {
        warn!(error = %e, "stdout write failed");
    }
}

fn watch(
    config: &ViewerConfig,
    query: Arc<PlatformQuery>,
    resolver: Arc<dyn Resolve>,
    registry: &mut SortedRegistry,
) -> procview::Result<()> {
    let json = config.output.json;
    let dispatcher: Dispatcher<SortedRegistry> = Dispatcher::new();
    let on_added = move |registry: &mut SortedRegistry, process: Process| {
        print_row(json, "added", &process);
        registry.insert(process);
    };
    let on_removed = move |registry: &mut SortedRegistry, pid: u32| {
        if registry.remove_by_pid(pid).is_some() {
            print_removed(json, pid);
        }
    };

    let watcher = match config.watch.source {
        #[cfg(windows)]
        WatchSource::Instrumentation => ProcessWatcher::new(
            procview::watcher::WmiEventSource::new(),
            resolver,
            dispatcher.handle(),
            on_added,
            on_removed,
        )?,
        #[cfg(not(windows))]
        WatchSource::Instrumentation => {
            warn!("instrumentation events are unavailable on this platform; polling instead");
            subscribe_polling(config, query, resolver, &dispatcher, on_added, on_removed)?
        }
        WatchSource::Polling => subscribe_polling(config, query, resolver, &dispatcher, on_added, on_removed)?,
    };

    info!("watching for process changes (Ctrl+C to stop)");
    while !STOP.load(Ordering::Relaxed) {
        dispatcher.run_for(registry, Duration::from_millis(250));
    }
    drop(watcher);
    // Anything queued before the drop is now a no-op.
    dispatcher.run_pending(registry);
    info!(count = registry.len(), "procview stopping");
    Ok(())
}

fn subscribe_polling<A, R>(
    config: &ViewerConfig,
    query: Arc<PlatformQuery>,
    resolver: Arc<dyn Resolve>,
    dispatcher: &Dispatcher<SortedRegistry>,
    on_added: A,
    on_removed: R,
) -> procview::Result<ProcessWatcher<SortedRegistry>>
where
    A: Fn(&mut SortedRegistry, Process) + Send + Sync + 'static,
    R: Fn(&mut SortedRegistry, u32) + Send + Sync + 'static,
{
    let source = PollingEventSource::new(query, Duration::from_millis(config.watch.poll_interval_ms.max(1)));
    ProcessWatcher::new(source, resolver, dispatcher.handle(), on_added, on_removed)
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = ViewerConfig::default_path();
    let (config, config_error) = match ViewerConfig::try_load(&config_path) {
        Ok(c) => (c, None),
        Err(e) => (ViewerConfig::default(), Some(e)),
    };

    StructuredLogger::init(config.log.json, &config.log.level);
    if let Some(e) = config_error {
        warn!(error = %e, "using default configuration");
    }
    info!(config = %config_path.display(), "procview starting");

    let query = Arc::new(PlatformQuery::new());
    let resolver = Arc::new(MetadataResolver::new(Arc::clone(&query)));
    let enumerator = Enumerator::new(Arc::clone(&resolver));

    let mut registry = SortedRegistry::new(config.sort);
    registry.reset(enumerator.snapshot(config.include_inaccessible)?, config.sort);
    info!(count = registry.len(), sort = ?config.sort, "snapshot taken");
    for process in registry.iter() {
        print_row(config.output.json, "snapshot", process);
    }

    if config.watch.enabled {
        if let Err(e) = ctrlc::set_handler(|| STOP.store(true, Ordering::Relaxed)) {
            warn!(error = %e, "could not install Ctrl+C handler");
        }
        watch(&config, query, resolver, &mut registry)?;
    }
    Ok(())
}
