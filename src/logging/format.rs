//! Log subscriber setup and one-object-per-line (ndjson) output.

use crate::process::Process;
use serde::Serialize;
use std::io::Write;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// One CLI output line: a snapshot row or a watcher change.
#[derive(Serialize)]
pub struct ProcessLine<'a> {
    pub ts: String,
    pub event: &'a str,
    pub pid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<&'a Process>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
}

impl<'a> ProcessLine<'a> {
    pub fn row(event: &'a str, process: &'a Process) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339(),
            event,
            pid: process.pid,
            process: Some(process),
            architecture: Some(process.architecture_label()),
        }
    }

    pub fn removed(pid: u32) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339(),
            event: "removed",
            pid,
            process: None,
            architecture: None,
        }
    }
}

pub struct StructuredLogger;

impl StructuredLogger {
    /// Install the global subscriber on stderr; `RUST_LOG` overrides `default_level`.
    pub fn init(json: bool, default_level: &str) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        if json {
            let fmt = tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(FmtSpan::NONE)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry().with(filter).with(fmt).init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    /// Write `event` as a single JSON line.
    pub fn emit_json(event: &impl Serialize, w: &mut impl Write) -> std::io::Result<()> {
        let line = serde_json::to_string(event)?;
        writeln!(w, "{}", line)
    }
}
