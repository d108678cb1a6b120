//! Tool dispatcher
//!
//! Resolves the requested tool (canonical name or alias), validates its
//! arguments, runs the handler and folds every outcome into exactly one
//! [`ToolResponse`]. The dispatcher owns all mutable per-process state (the
//! probe cache and the USB watch), so handlers take `&mut self` and no locks
//! are needed.

use crate::backend::BackendClient;
use crate::config::ServerConfig;
use crate::error::{BackendError, ProbeFailure, ToolError};
use crate::host::{self, HostFs, CLOCKS, VOLT_DOMAINS};
use crate::mcp::tools::{ToolKind, ToolRegistry, DEFAULT_DMESG_LINES};
use crate::mcp::types::{ToolFailure, ToolRequest, ToolResponse};
use crate::probe::{CommandRunner, ProbeCache, SystemCommands};
use crate::usb::UsbWatch;
use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Throttle bits reported by `vcgencmd get_throttled`
const THROTTLE_FLAGS: &[(u32, &str)] = &[
    (0, "under_voltage"),
    (1, "freq_capped"),
    (2, "throttled"),
    (3, "soft_temp_limit"),
    (16, "under_voltage_has_occurred"),
    (17, "freq_capped_has_occurred"),
    (18, "throttled_has_occurred"),
    (19, "soft_temp_limit_has_occurred"),
];

/// Routes tool calls to their handlers
#[derive(Debug)]
pub struct Dispatcher {
    registry: ToolRegistry,
    backend: BackendClient,
    probes: ProbeCache,
    usb_watch: UsbWatch,
    commands: Box<dyn CommandRunner>,
    host: HostFs,
    command_timeout: Duration,
}

impl Dispatcher {
    /// Dispatcher with the built-in tools and fresh state
    pub fn new(backend: BackendClient, cache_ttl: Duration, command_timeout: Duration) -> Self {
        Self {
            registry: ToolRegistry::new(),
            backend,
            probes: ProbeCache::new(cache_ttl),
            usb_watch: UsbWatch::new(cache_ttl),
            commands: Box::new(SystemCommands),
            host: HostFs::default(),
            command_timeout,
        }
    }

    /// Dispatcher for a resolved configuration
    pub fn from_config(config: &ServerConfig) -> Result<Self, BackendError> {
        let backend = BackendClient::new(config.port, config.timeout)?;
        Ok(Self::new(backend, config.cache_ttl, config.command_timeout))
    }

    /// Replace the tool registry
    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace how local binaries are run
    pub fn with_commands(mut self, commands: impl CommandRunner + 'static) -> Self {
        self.commands = Box::new(commands);
        self
    }

    /// Read sysfs and device nodes below `root` instead of `/`
    pub fn with_host_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.host = HostFs::new(root);
        self
    }

    /// Host filesystem view
    pub fn host(&self) -> &HostFs {
        &self.host
    }

    /// Tool registry
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Backend client
    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    /// Probe cache
    pub fn probes(&self) -> &ProbeCache {
        &self.probes
    }

    /// Probe cache, mutable
    pub fn probes_mut(&mut self) -> &mut ProbeCache {
        &mut self.probes
    }

    /// USB watch state
    pub fn usb_watch(&self) -> &UsbWatch {
        &self.usb_watch
    }

    /// USB watch state, mutable
    pub fn usb_watch_mut(&mut self) -> &mut UsbWatch {
        &mut self.usb_watch
    }

    /// Handle one tool request. Always returns a response carrying the
    /// request's id; a panicking handler becomes `internal-error`.
    #[instrument(skip(self, request), fields(tool = %request.tool))]
    pub async fn dispatch(&mut self, request: ToolRequest) -> ToolResponse {
        let ToolRequest {
            id,
            tool,
            arguments,
        } = request;

        let outcome = guarded(self.call(&tool, &arguments)).await;
        match &outcome {
            Ok(_) => debug!("tool call succeeded"),
            Err(err) => warn!(kind = %err.kind(), error = %err, "tool call failed"),
        }

        ToolResponse {
            id,
            outcome: outcome.map_err(|err| ToolFailure::from(&err)),
        }
    }

    /// Resolve, validate and run a tool
    pub async fn call(&mut self, name: &str, arguments: &Value) -> Result<Value, ToolError> {
        let descriptor = *self
            .registry
            .resolve(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let args = descriptor.input.validate(arguments)?;

        match descriptor.kind {
            ToolKind::Health => self.backend_json("/health").await,
            ToolKind::CpuTemp => self.backend_json("/cpu-temp").await,
            ToolKind::SystemInfo => self.backend_json("/system-info").await,
            ToolKind::Capabilities => self.backend_json("/capabilities").await,
            ToolKind::GpuInfo => self.gpu_info().await,
            ToolKind::CameraInfo => self.camera_info().await,
            ToolKind::UsbList => {
                let devices = self.usb_devices().await?;
                Ok(json!({ "count": devices.len(), "devices": devices }))
            }
            ToolKind::UsbWatch => self.usb_watch_report(&args).await,
            ToolKind::UsbTree => {
                let tree = self.local_command("lsusb", &["-t"]).await?;
                Ok(json!({ "tree": tree }))
            }
            ToolKind::ThrottleStatus => {
                let raw = self.local_command("vcgencmd", &["get_throttled"]).await?;
                decode_throttled(&raw)
            }
            ToolKind::DmesgTail => self.dmesg_tail(&args).await,
            ToolKind::CpuFreq => Ok(serde_json::to_value(self.host.cpu_freq().await)?),
            ToolKind::ThermalZones => {
                let zones = self.host.thermal_zones().await;
                Ok(json!({ "zones": zones }))
            }
            ToolKind::NetInterfaces => self.net_interfaces().await,
            ToolKind::WifiStatus => self.wifi_status().await,
            ToolKind::V4l2Formats => self.v4l2_formats().await,
            ToolKind::Power => self.power().await,
            ToolKind::Services => {
                let output = self
                    .local_command(
                        "systemctl",
                        &["list-units", "--type=service", "--all", "--no-legend", "--no-pager"],
                    )
                    .await?;
                let services = host::parse_systemctl_units(&output);
                Ok(json!({ "count": services.len(), "services": services }))
            }
            ToolKind::I2cScan => self.i2c_scan().await,
        }
    }

    async fn backend_json(&mut self, path: &str) -> Result<Value, ToolError> {
        let key = format!("GET {}", path);
        let backend = &self.backend;
        self.probes
            .get_or_probe(&key, || async move {
                backend.get_json(path).await.map_err(ProbeFailure::from)
            })
            .await
            .map_err(ToolError::from)
    }

    async fn local_command(&mut self, program: &str, args: &[&str]) -> Result<String, ToolError> {
        let key = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        let timeout = self.command_timeout;
        let commands = &self.commands;
        let output = self
            .probes
            .get_or_probe(&key, || commands.run(program, args, timeout))
            .await?;

        match output {
            Value::String(text) => Ok(text),
            other => Ok(other.to_string()),
        }
    }

    async fn gpu_info(&mut self) -> Result<Value, ToolError> {
        let info = self.backend_json("/system-info").await?;
        Ok(info.get("gpu").cloned().unwrap_or_else(|| json!({})))
    }

    async fn camera_info(&mut self) -> Result<Value, ToolError> {
        let info = self.backend_json("/system-info").await?;
        let caps = self.backend_json("/capabilities").await?;
        let peripherals = info.get("peripherals");

        Ok(json!({
            "video_devices": peripherals
                .and_then(|p| p.get("video_devices"))
                .cloned()
                .unwrap_or_else(|| json!([])),
            "camera_status": peripherals
                .and_then(|p| p.get("camera"))
                .cloned()
                .unwrap_or(Value::Null),
            "v4l2_ctl": capability(&caps, "v4l2_ctl"),
            "libcamera": capability(&caps, "libcamera"),
        }))
    }

    /// Current USB device lines from the backend's system info
    async fn usb_devices(&mut self) -> Result<Vec<String>, ToolError> {
        let caps = self.backend_json("/capabilities").await?;
        if caps.get("lsusb").and_then(Value::as_bool) == Some(false) {
            return Err(ToolError::MissingDependency(
                "lsusb is not available on this system".to_string(),
            ));
        }

        let info = self.backend_json("/system-info").await?;
        let lines: Vec<String> = match info.pointer("/usb/lsusb") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(text)) => text.lines().map(str::to_string).collect(),
            _ => {
                return Err(ToolError::Upstream(
                    "system info has no usb.lsusb device list".to_string(),
                ))
            }
        };

        Ok(lines
            .into_iter()
            .filter(|line| !line.trim().is_empty())
            .collect())
    }

    async fn usb_watch_report(&mut self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let reset = args.get("reset").and_then(Value::as_bool).unwrap_or(false);
        let devices = self.usb_devices().await?;
        let report = self.usb_watch.observe(devices, reset);
        Ok(serde_json::to_value(report)?)
    }

    async fn dmesg_tail(&mut self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let wanted = args
            .get("lines")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_DMESG_LINES)
            .max(1) as usize;
        let output = self.local_command("dmesg", &[]).await?;

        let all: Vec<&str> = output.lines().collect();
        let tail = &all[all.len().saturating_sub(wanted)..];
        Ok(json!({ "count": tail.len(), "lines": tail }))
    }

    async fn net_interfaces(&mut self) -> Result<Value, ToolError> {
        match self.local_command("ip", &["-j", "addr"]).await {
            Ok(output) => match host::parse_ip_addr(&output) {
                Ok(interfaces) => {
                    return Ok(json!({ "source": "ip", "interfaces": interfaces }));
                }
                Err(e) => warn!(error = %e, "unreadable ip -j output, falling back to sysfs"),
            },
            Err(e) => debug!(error = %e, "ip unavailable, falling back to sysfs"),
        }

        let interfaces: Vec<Value> = self
            .host
            .net_interface_names()
            .await
            .into_iter()
            .map(|name| json!({ "name": name, "mac": null, "addrs": [] }))
            .collect();
        Ok(json!({ "source": "sysfs", "interfaces": interfaces }))
    }

    async fn wifi_status(&mut self) -> Result<Value, ToolError> {
        // iwgetid exits non-zero when no interface is associated
        let (iface, ssid) = match self.local_command("iwgetid", &[]).await {
            Ok(output) => host::parse_iwgetid(&output),
            Err(ToolError::Upstream(reason)) => {
                debug!(%reason, "no associated wireless interface");
                (String::new(), String::new())
            }
            Err(e) => return Err(e),
        };

        let (quality, bitrate) = if iface.is_empty() {
            (None, None)
        } else {
            match self.local_command("iwconfig", &[iface.as_str()]).await {
                Ok(output) => host::parse_iwconfig(&output),
                Err(e) => {
                    debug!(error = %e, "iwconfig unavailable");
                    (None, None)
                }
            }
        };

        Ok(json!({
            "connected": !iface.is_empty(),
            "iface": iface,
            "ssid": ssid,
            "quality": quality,
            "bitrate": bitrate,
        }))
    }

    async fn v4l2_formats(&mut self) -> Result<Value, ToolError> {
        let mut devices = Vec::new();
        let nodes = self.host.device_nodes("video").await;
        for node in nodes {
            let path = node.display().to_string();
            let entry = match self
                .local_command("v4l2-ctl", &["-d", path.as_str(), "--list-formats-ext"])
                .await
            {
                Ok(output) => json!({ "device": path, "formats": host::parse_v4l2_formats(&output) }),
                Err(e @ ToolError::MissingDependency(_)) => return Err(e),
                Err(e) => json!({ "device": path, "formats": [], "error": e.to_string() }),
            };
            devices.push(entry);
        }
        Ok(json!({ "devices": devices }))
    }

    async fn power(&mut self) -> Result<Value, ToolError> {
        let mut volt = Map::new();
        for &domain in VOLT_DOMAINS {
            match self.local_command("vcgencmd", &["measure_volts", domain]).await {
                Ok(output) => {
                    if let Some(v) = host::parse_measure_volts(&output) {
                        volt.insert(domain.to_string(), json!(v));
                    }
                }
                Err(e @ ToolError::MissingDependency(_)) => return Err(e),
                Err(e) => debug!(domain, error = %e, "voltage not readable"),
            }
        }

        let mut clocks = Map::new();
        for &clock in CLOCKS {
            match self.local_command("vcgencmd", &["measure_clock", clock]).await {
                Ok(output) => {
                    if let Some(hz) = host::parse_measure_clock(&output) {
                        clocks.insert(clock.to_string(), json!(hz));
                    }
                }
                Err(e @ ToolError::MissingDependency(_)) => return Err(e),
                Err(e) => debug!(clock, error = %e, "clock not readable"),
            }
        }

        Ok(json!({ "volt": volt, "clocks": clocks }))
    }

    async fn i2c_scan(&mut self) -> Result<Value, ToolError> {
        let mut buses = Vec::new();
        let nodes = self.host.device_nodes("i2c-").await;
        for node in nodes {
            let path = node.display().to_string();
            let number = path.rsplit('-').next().unwrap_or_default().to_string();
            let entry = match self.local_command("i2cdetect", &["-y", number.as_str()]).await {
                Ok(output) => json!({ "bus": path, "devices": host::parse_i2cdetect(&output) }),
                Err(e @ ToolError::MissingDependency(_)) => return Err(e),
                Err(e) => json!({ "bus": path, "devices": [], "error": e.to_string() }),
            };
            buses.push(entry);
        }
        Ok(json!({ "buses": buses }))
    }
}

fn capability(caps: &Value, name: &str) -> bool {
    caps.get(name).and_then(Value::as_bool).unwrap_or(false)
}

/// Decode `throttled=0x50005` style output into named flags
pub fn decode_throttled(output: &str) -> Result<Value, ToolError> {
    let line = output.trim();
    let raw = line.rsplit('=').next().unwrap_or(line).trim();

    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => raw.parse::<u32>(),
    };
    let value = parsed.map_err(|_| {
        ToolError::Upstream(format!("unexpected vcgencmd get_throttled output: {line:?}"))
    })?;

    let flags: Map<String, Value> = THROTTLE_FLAGS
        .iter()
        .map(|&(bit, name)| (name.to_string(), Value::Bool(value & (1 << bit) != 0)))
        .collect();

    Ok(json!({ "available": true, "raw": raw, "flags": flags }))
}

/// Await `fut`, turning a panic into `internal-error`
pub async fn guarded<F>(fut: F) -> Result<Value, ToolError>
where
    F: Future<Output = Result<Value, ToolError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(%message, "tool handler panicked");
            Err(ToolError::Internal(format!("handler panicked: {}", message)))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
