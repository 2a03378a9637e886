//! Client for a long-lived exiftool process in stay-open mode.
//!
//! A request is a block of argument lines closed by `-execute`; the reply is every line
//! the tool prints before the `{ready}` marker. One request is in flight at a time.

pub mod normalize;
pub mod transport;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub use transport::{check_installed, ProcessTransport, Transport};

/// Line the tool prints once a request has been fully answered.
pub const READY_MARKER: &str = "{ready}";

const EXECUTE: &str = "-execute";

/// How long `shutdown` waits for the tool to exit before killing it.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Namespaces whose presence in the general payload warrants a structured request.
/// The general reply is flattened, so person details show up as `PersonInImageName`,
/// `PersonInImageId` and friends.
const STRUCTURED_PREFIXES: &[&str] = &[
    "XMP-mwg-rs:",
    "XMP-mwg-coll:",
    "XMP-iptcExt:PersonInImage",
];

const STRUCTURED_TAGS: &[&str] = &[
    "-XMP-mwg-rs:RegionInfo",
    "-XMP-mwg-coll:Collections",
    "-XMP-iptcExt:PersonInImageWDetails",
];

/// Normalized payloads for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    /// Group-qualified tags (`Group:Tag`), every scalar rendered as a string.
    pub general: Map<String, Value>,
    /// Raw structured reply, present only when the general payload hinted at it.
    pub structured: Option<String>,
}

impl Metadata {
    /// Trimmed, non-empty string value of a tag.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.general
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn general_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.general)?)
    }

    fn wants_structured(general: &Map<String, Value>) -> bool {
        general
            .keys()
            .any(|k| STRUCTURED_PREFIXES.iter().any(|p| k.starts_with(p)))
    }
}

/// Typed outcome of an extraction. A missing payload is not an error in the I/O sense:
/// the caller logs it and moves on without retrying.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Metadata(Metadata),
    Failed { reason: String },
}

struct Channel<T> {
    transport: T,
    started: bool,
    starts: usize,
}

/// Lock-guarded handle to the tool process.
pub struct ExifTool<T: Transport> {
    channel: Mutex<Channel<T>>,
}

impl ExifTool<ProcessTransport> {
    /// Client for the exiftool binary at `program` (resolved through PATH if bare).
    pub fn spawn_lazy(program: &str) -> Self {
        Self::new(ProcessTransport::new(program))
    }
}

impl<T: Transport> ExifTool<T> {
    pub fn new(transport: T) -> Self {
        Self {
            channel: Mutex::new(Channel {
                transport,
                started: false,
                starts: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Channel<T>> {
        // A panic mid-request leaves the channel in an unknown state; the health check
        // on the next request restarts the process if needed.
        self.channel.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start the process if it has never run, or restart it if it has exited.
    pub fn ensure_started(&self) -> Result<()> {
        let mut channel = self.lock();
        Self::ensure_locked(&mut channel)
    }

    fn ensure_locked(channel: &mut Channel<T>) -> Result<()> {
        if channel.started && channel.transport.is_alive() {
            return Ok(());
        }
        if channel.started {
            warn!("metadata tool exited unexpectedly, restarting");
        }
        channel.transport.start()?;
        channel.started = true;
        channel.starts += 1;
        Ok(())
    }

    /// Number of times the process has been (re)started.
    pub fn starts(&self) -> usize {
        self.lock().starts
    }

    /// Send one request block and collect the payload printed before the ready marker.
    pub fn request(&self, args: &[&str]) -> Result<String> {
        let mut channel = self.lock();
        Self::ensure_locked(&mut channel)?;

        let mut lines: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        lines.push(EXECUTE.to_string());
        debug!(?args, "metadata tool request");
        channel.transport.send(&lines)?;

        let mut payload = Vec::new();
        loop {
            match channel.transport.read_line()? {
                Some(line) if line.trim() == READY_MARKER => break,
                Some(line) => payload.push(line),
                None => {
                    return Err(Error::ToolIo(
                        "output ended before the ready marker".into(),
                    ))
                }
            }
        }
        Ok(payload.join("\n"))
    }

    /// General request, followed by the structured request when the general payload
    /// carries region, collection or person-detail tags.
    pub fn extract(&self, path: &Path) -> Result<Extraction> {
        let path_arg = path.to_string_lossy();
        let raw = self.request(&["-json", "-G1", "-n", path_arg.as_ref()])?;

        let general = match normalize::parse_payload(&raw) {
            Ok(Some(map)) => map,
            Ok(None) => {
                return Ok(Extraction::Failed {
                    reason: "tool returned no metadata".into(),
                })
            }
            Err(e) => {
                return Ok(Extraction::Failed {
                    reason: format!("unreadable tool output: {e}"),
                })
            }
        };

        let structured = if Metadata::wants_structured(&general) {
            let mut args = vec!["-json", "-struct", "-n"];
            args.extend_from_slice(STRUCTURED_TAGS);
            args.push(path_arg.as_ref());
            let raw = self.request(&args)?;
            normalize_structured(&raw)
        } else {
            None
        };

        Ok(Extraction::Metadata(Metadata {
            general,
            structured,
        }))
    }

    /// Ask the tool to exit. A later request starts it again.
    pub fn shutdown(&self) -> Result<()> {
        let mut channel = self.lock();
        if !channel.started {
            return Ok(());
        }
        channel.started = false;
        channel.transport.terminate(SHUTDOWN_GRACE)
    }
}

impl<T: Transport> Drop for ExifTool<T> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("metadata tool shutdown failed: {e}");
        }
    }
}

/// Unwrap and stringify a structured reply. Unparsable text is passed through untouched
/// so the structured parser can report it.
fn normalize_structured(raw: &str) -> Option<String> {
    match normalize::parse_payload(raw) {
        Ok(Some(mut map)) => {
            map.remove("SourceFile");
            if map.is_empty() {
                None
            } else {
                serde_json::to_string(&map).ok()
            }
        }
        Ok(None) => None,
        Err(_) => Some(raw.trim().to_string()),
    }
}
