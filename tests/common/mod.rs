//! Shared test utilities: an in-process fake of the inspector HTTP API and a
//! scripted stand-in for local helper binaries.
//!
//! The fake binds `127.0.0.1:0`, serves the four documents the dispatcher
//! reads, and exposes knobs for the device list, the `lsusb` capability, a
//! response delay and hit counters.

#![allow(dead_code)]

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use futures::future::BoxFuture;
use inspector_raspi::backend::BackendClient;
use inspector_raspi::error::ProbeFailure;
use inspector_raspi::mcp::{Dispatcher, McpServer};
use inspector_raspi::probe::{CommandRunner, ProbeOutcome};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mutable fixture behind the fake backend
#[derive(Debug, Clone)]
pub struct Fixture {
    pub devices: Vec<String>,
    pub lsusb_available: bool,
    pub cpu_delay: Duration,
    pub system_info_hits: usize,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            devices: vec![
                "Bus 001 Device 001: ID 1d6b:0002 Linux Foundation 2.0 root hub".to_string(),
                "Bus 001 Device 002: ID 2109:3431 VIA Labs, Inc. Hub".to_string(),
            ],
            lsusb_available: true,
            cpu_delay: Duration::ZERO,
            system_info_hits: 0,
        }
    }
}

type Shared = Arc<Mutex<Fixture>>;

/// Handle to a running fake backend
pub struct FakeBackend {
    pub addr: SocketAddr,
    fixture: Shared,
}

impl FakeBackend {
    /// Start a fake backend on an ephemeral loopback port
    pub async fn start() -> Self {
        let fixture: Shared = Arc::new(Mutex::new(Fixture::default()));

        let app = Router::new()
            .route("/health", get(health))
            .route("/cpu-temp", get(cpu_temp))
            .route("/capabilities", get(capabilities))
            .route("/system-info", get(system_info))
            .route("/broken", get(broken))
            .route("/not-json", get(not_json))
            .with_state(fixture.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, fixture }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn client(&self, timeout: Duration) -> BackendClient {
        BackendClient::new(self.port(), timeout).unwrap()
    }

    pub fn dispatcher(&self, timeout: Duration) -> Dispatcher {
        Dispatcher::new(
            self.client(timeout),
            Duration::from_secs(3),
            Duration::from_secs(3),
        )
    }

    pub fn server(&self, timeout: Duration) -> McpServer {
        McpServer::new(self.dispatcher(timeout))
    }

    pub fn set_devices(&self, devices: &[&str]) {
        self.fixture.lock().unwrap().devices = devices.iter().map(|d| d.to_string()).collect();
    }

    pub fn set_lsusb_available(&self, available: bool) {
        self.fixture.lock().unwrap().lsusb_available = available;
    }

    pub fn set_cpu_delay(&self, delay: Duration) {
        self.fixture.lock().unwrap().cpu_delay = delay;
    }

    pub fn system_info_hits(&self) -> usize {
        self.fixture.lock().unwrap().system_info_hits
    }
}

/// Canned outputs for local binaries, keyed by the full command line.
///
/// A command line with no script fails like a non-zero exit when its program
/// has other scripted lines, and like a missing binary otherwise.
#[derive(Debug, Default)]
pub struct ScriptedCommands {
    scripts: HashMap<String, ProbeOutcome>,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedCommands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful run printing `stdout`
    pub fn ok(mut self, command: &str, stdout: &str) -> Self {
        self.scripts
            .insert(command.to_string(), Ok(Value::String(stdout.to_string())));
        self
    }

    /// Script a non-zero exit
    pub fn fail(mut self, command: &str, status: i32, stderr: &str) -> Self {
        let program = command.split(' ').next().unwrap_or(command).to_string();
        self.scripts.insert(
            command.to_string(),
            Err(ProbeFailure::CommandFailed {
                program,
                status: Some(status),
                stderr: stderr.to_string(),
            }),
        );
        self
    }

    /// Shared record of every command line actually run
    pub fn log(&self) -> Arc<Mutex<Vec<String>>> {
        self.log.clone()
    }
}

impl CommandRunner for ScriptedCommands {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [&'a str],
        _timeout: Duration,
    ) -> BoxFuture<'a, ProbeOutcome> {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        self.log.lock().unwrap().push(line.clone());

        let known = self
            .scripts
            .keys()
            .any(|k| k.split(' ').next() == Some(program));
        let outcome = match self.scripts.get(&line) {
            Some(outcome) => outcome.clone(),
            None if known => Err(ProbeFailure::CommandFailed {
                program: program.to_string(),
                status: Some(1),
                stderr: format!("unscripted: {line}"),
            }),
            None => Err(ProbeFailure::MissingBinary(program.to_string())),
        };
        Box::pin(async move { outcome })
    }
}

/// Dispatcher with an unreachable backend, scripted binaries and a host
/// tree rooted at `root`
pub fn local_dispatcher(root: &Path, commands: ScriptedCommands) -> Dispatcher {
    let backend = BackendClient::new(closed_port(), Duration::from_millis(200)).unwrap();
    Dispatcher::new(backend, Duration::from_secs(3), Duration::from_secs(3))
        .with_commands(commands)
        .with_host_root(root)
}

/// Write `contents` to `root/relative`, creating parent directories
pub fn write_host_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

/// Port with nothing listening on it
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn cpu_temp(State(fixture): State<Shared>) -> Json<Value> {
    let delay = fixture.lock().unwrap().cpu_delay;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    Json(json!({ "celsius": 48.3 }))
}

async fn capabilities(State(fixture): State<Shared>) -> Json<Value> {
    let lsusb = fixture.lock().unwrap().lsusb_available;
    Json(json!({
        "lsusb": lsusb,
        "vcgencmd": true,
        "v4l2_ctl": true,
        "libcamera": false,
    }))
}

async fn system_info(State(fixture): State<Shared>) -> Json<Value> {
    let devices = {
        let mut fixture = fixture.lock().unwrap();
        fixture.system_info_hits += 1;
        fixture.devices.clone()
    };
    Json(json!({
        "hostname": "raspberrypi",
        "gpu": { "gpu_mem": "gpu=76M", "throttled": "throttled=0x0" },
        "peripherals": {
            "video_devices": ["/dev/video0", "/dev/video10"],
            "camera": "supported=1 detected=1",
        },
        "usb": { "lsusb": devices },
    }))
}

async fn broken() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

async fn not_json() -> &'static str {
    "definitely not json"
}
