//! Capability probe cache
//!
//! Backend documents and local command output are expensive to produce and
//! change slowly, so each probe result is kept for a short fixed TTL. Failures
//! are cached too (a missing `vcgencmd` stays missing for the window) except
//! backend connect failures and timeouts, which are retried on the next call.

use crate::error::ProbeFailure;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Outcome of one probe
pub type ProbeOutcome = std::result::Result<Value, ProbeFailure>;

/// Default TTL for cached probe results
pub const DEFAULT_PROBE_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
struct CacheEntry {
    outcome: ProbeOutcome,
    expires_at: Instant,
}

/// TTL cache keyed by probe name
#[derive(Debug)]
pub struct ProbeCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
}

impl Default for ProbeCache {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TTL)
    }
}

impl ProbeCache {
    /// Create an empty cache
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Entry lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unexpired outcome for `key`, without probing
    pub fn peek(&self, key: &str) -> Option<&ProbeOutcome> {
        self.entries
            .get(key)
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| &entry.outcome)
    }

    /// Forget one entry
    pub fn invalidate(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Return the cached outcome for `key` if still fresh, otherwise run
    /// `probe`, store its outcome and return it.
    pub async fn get_or_probe<F, Fut>(&mut self, key: &str, probe: F) -> ProbeOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProbeOutcome>,
    {
        if let Some(entry) = self.entries.get(key) {
            if Instant::now() < entry.expires_at {
                debug!(key, "probe cache hit");
                return entry.outcome.clone();
            }
        }

        debug!(key, "probe cache miss");
        let outcome = probe().await;
        if is_cacheable(&outcome) {
            self.entries.insert(
                key.to_string(),
                CacheEntry {
                    outcome: outcome.clone(),
                    expires_at: Instant::now() + self.ttl,
                },
            );
        } else {
            self.entries.remove(key);
        }
        outcome
    }
}

fn is_cacheable(outcome: &ProbeOutcome) -> bool {
    match outcome {
        Err(ProbeFailure::Backend(err)) => !err.is_transient(),
        _ => true,
    }
}

/// Runs local diagnostic binaries on behalf of the dispatcher
pub trait CommandRunner: fmt::Debug + Send + Sync {
    /// Run `program` with `args`, bounded by `timeout`. Success carries
    /// stdout as a JSON string.
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [&'a str],
        timeout: Duration,
    ) -> BoxFuture<'a, ProbeOutcome>;
}

/// Runs binaries found on `PATH`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommands;

impl CommandRunner for SystemCommands {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [&'a str],
        timeout: Duration,
    ) -> BoxFuture<'a, ProbeOutcome> {
        run_command(program, args, timeout).boxed()
    }
}

/// Run a local diagnostic command and capture its stdout as a JSON string.
///
/// stdin is always null: the process's own stdin carries the protocol.
#[instrument(skip(args))]
pub async fn run_command(program: &str, args: &[&str], timeout: Duration) -> ProbeOutcome {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match tokio::time::timeout(timeout, command.output()).await {
        Err(_) => Err(ProbeFailure::CommandTimeout {
            program: program.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ProbeFailure::MissingBinary(program.to_string()))
        }
        Ok(Err(e)) => Err(ProbeFailure::CommandFailed {
            program: program.to_string(),
            status: None,
            stderr: e.to_string(),
        }),
        Ok(Ok(output)) if !output.status.success() => Err(ProbeFailure::CommandFailed {
            program: program.to_string(),
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }),
        Ok(Ok(output)) => Ok(Value::String(
            String::from_utf8_lossy(&output.stdout).into_owned(),
        )),
    }
}
