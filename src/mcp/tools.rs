//! MCP tool definitions and registry
//!
//! Every tool is described once by a [`ToolDescriptor`]: canonical name,
//! legacy aliases, the handler tag the dispatcher matches on and a
//! declarative input shape used both for validation and for the advertised
//! JSON schema.

use crate::error::ToolError;
use crate::mcp::types::McpToolDefinition;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// A registered MCP tool
pub trait McpTool: Send + Sync {
    /// Canonical tool name
    fn name(&self) -> &str;
    /// Tool description
    fn description(&self) -> &str;
    /// Input schema as JSON
    fn input_schema(&self) -> Value;
    /// Get tool definition
    fn definition(&self) -> McpToolDefinition {
        McpToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Handler tag for a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// `GET /health`
    Health,
    /// `GET /cpu-temp`
    CpuTemp,
    /// `GET /system-info`
    SystemInfo,
    /// `GET /capabilities`
    Capabilities,
    /// GPU subsection of system info
    GpuInfo,
    /// Camera summary from system info and capabilities
    CameraInfo,
    /// Current USB device lines
    UsbList,
    /// USB hot-plug diff
    UsbWatch,
    /// `lsusb -t`
    UsbTree,
    /// `vcgencmd get_throttled`, decoded
    ThrottleStatus,
    /// Tail of the kernel ring buffer
    DmesgTail,
    /// cpufreq from sysfs
    CpuFreq,
    /// Thermal zones from sysfs
    ThermalZones,
    /// `ip -j addr`, sysfs names as fallback
    NetInterfaces,
    /// `iwgetid` and `iwconfig`
    WifiStatus,
    /// `v4l2-ctl --list-formats-ext` per video device
    V4l2Formats,
    /// `vcgencmd measure_volts` and `measure_clock`
    Power,
    /// `systemctl list-units --type=service`
    Services,
    /// `i2cdetect -y` per bus
    I2cScan,
}

/// Type of a declared argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// JSON boolean
    Boolean,
    /// JSON integer within an inclusive range
    Integer {
        /// Smallest accepted value
        min: i64,
        /// Largest accepted value
        max: i64,
    },
}

/// One declared argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Argument name
    pub name: &'static str,
    /// Expected type
    pub ty: FieldType,
    /// Schema description
    pub description: &'static str,
}

/// Declarative input shape. All fields are optional; anything undeclared is
/// rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape {
    /// Declared fields
    pub fields: &'static [FieldSpec],
}

impl InputShape {
    /// Shape with no arguments
    pub const EMPTY: InputShape = InputShape { fields: &[] };

    /// Check `arguments` against the shape and return them as an object.
    /// `null` is treated as `{}`; a `null` field counts as absent.
    pub fn validate(&self, arguments: &Value) -> Result<Map<String, Value>, ToolError> {
        let object = match arguments {
            Value::Null => return Ok(Map::new()),
            Value::Object(object) => object,
            other => {
                return Err(ToolError::invalid_arguments(
                    "arguments",
                    format!("expected an object, got {}", json_type_name(other)),
                ))
            }
        };

        for (name, value) in object {
            let spec = self
                .fields
                .iter()
                .find(|f| f.name == name.as_str())
                .ok_or_else(|| ToolError::invalid_arguments(name.as_str(), "unknown argument"))?;

            if value.is_null() {
                continue;
            }

            match spec.ty {
                FieldType::Boolean => {
                    if !value.is_boolean() {
                        return Err(ToolError::invalid_arguments(
                            name.as_str(),
                            format!("expected a boolean, got {}", json_type_name(value)),
                        ));
                    }
                }
                FieldType::Integer { min, max } => {
                    let n = value.as_i64().ok_or_else(|| {
                        ToolError::invalid_arguments(
                            name.as_str(),
                            format!("expected an integer, got {}", json_type_name(value)),
                        )
                    })?;
                    if n < min || n > max {
                        return Err(ToolError::invalid_arguments(
                            name.as_str(),
                            format!("must be between {} and {}", min, max),
                        ));
                    }
                }
            }
        }

        Ok(object
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// JSON schema advertised in `tools/list`
    pub fn to_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|field| {
                let schema = match field.ty {
                    FieldType::Boolean => json!({
                        "type": "boolean",
                        "description": field.description,
                    }),
                    FieldType::Integer { min, max } => json!({
                        "type": "integer",
                        "minimum": min,
                        "maximum": max,
                        "description": field.description,
                    }),
                };
                (field.name.to_string(), schema)
            })
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "additionalProperties": false,
        })
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Static description of one tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolDescriptor {
    /// Canonical (hyphenated) name
    pub name: &'static str,
    /// Accepted legacy names
    pub aliases: &'static [&'static str],
    /// Handler tag
    pub kind: ToolKind,
    /// Human description
    pub description: &'static str,
    /// Accepted arguments
    pub input: InputShape,
}

impl McpTool for ToolDescriptor {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn input_schema(&self) -> Value {
        self.input.to_schema()
    }
}

/// Default `lines` for `pi-dmesg-tail`
pub const DEFAULT_DMESG_LINES: i64 = 200;

const USB_WATCH_INPUT: InputShape = InputShape {
    fields: &[FieldSpec {
        name: "reset",
        ty: FieldType::Boolean,
        description: "Discard the stored snapshot and re-seed from the current device set",
    }],
};

const DMESG_TAIL_INPUT: InputShape = InputShape {
    fields: &[FieldSpec {
        name: "lines",
        ty: FieldType::Integer { min: 1, max: 5000 },
        description: "Number of trailing lines to return (default 200)",
    }],
};

/// Built-in tools, in `tools/list` order
pub const BUILTIN_TOOLS: &[ToolDescriptor] = &[
    ToolDescriptor {
        name: "pi-health",
        aliases: &["pi.health"],
        kind: ToolKind::Health,
        description: "Health of the local inspector HTTP API",
        input: InputShape::EMPTY,
    },
    ToolDescriptor {
        name: "pi-cpu-temp",
        aliases: &["pi.cpuTemp"],
        kind: ToolKind::CpuTemp,
        description: "CPU temperature in degrees Celsius",
        input: InputShape::EMPTY,
    },
    ToolDescriptor {
        name: "pi-system-info",
        aliases: &["pi.systemInfo"],
        kind: ToolKind::SystemInfo,
        description: "Aggregate system snapshot (cpu, memory, disk, network, gpu, peripherals)",
        input: InputShape::EMPTY,
    },
    ToolDescriptor {
        name: "pi-capabilities",
        aliases: &["pi.capabilities"],
        kind: ToolKind::Capabilities,
        description: "Which diagnostic tools and device interfaces are available",
        input: InputShape::EMPTY,
    },
    ToolDescriptor {
        name: "pi-gpu-info",
        aliases: &["pi.gpuInfo"],
        kind: ToolKind::GpuInfo,
        description: "GPU details extracted from system info",
        input: InputShape::EMPTY,
    },
    ToolDescriptor {
        name: "pi-camera-info",
        aliases: &["pi.cameraInfo"],
        kind: ToolKind::CameraInfo,
        description: "Camera and video device summary from system info and capabilities",
        input: InputShape::EMPTY,
    },
    ToolDescriptor {
        name: "pi-usb-list",
        aliases: &["pi.usbList"],
        kind: ToolKind::UsbList,
        description: "List USB devices (lsusb summary)",
        input: InputShape::EMPTY,
    },
    ToolDescriptor {
        name: "pi-usb-watch",
        aliases: &["pi.usbWatch"],
        kind: ToolKind::UsbWatch,
        description: "USB devices added or removed since the previous call",
        input: USB_WATCH_INPUT,
    },
    ToolDescriptor {
        name: "pi-usb-tree",
        aliases: &["pi.usbTree"],
        kind: ToolKind::UsbTree,
        description: "USB topology tree (lsusb -t)",
        input: InputShape::EMPTY,
    },
    ToolDescriptor {
        name: "pi-throttle-status",
        aliases: &["pi.throttleStatus"],
        kind: ToolKind::ThrottleStatus,
        description: "Under-voltage and throttling flags from vcgencmd get_throttled",
        input: InputShape::EMPTY,
    },
    ToolDescriptor {
        name: "pi-dmesg-tail",
        aliases: &["pi.dmesgTail"],
        kind: ToolKind::DmesgTail,
        description: "Last lines of the kernel ring buffer (dmesg)",
        input: DMESG_TAIL_INPUT,
    },
    ToolDescriptor {
        name: "pi-cpu-freq",
        aliases: &["pi.cpuFreq"],
        kind: ToolKind::CpuFreq,
        description: "CPU frequency (Hz) and scaling governor",
        input: InputShape::EMPTY,
    },
    ToolDescriptor {
        name: "pi-thermal-zones",
        aliases: &["pi.thermalZones"],
        kind: ToolKind::ThermalZones,
        description: "Thermal zones with type and temperature",
        input: InputShape::EMPTY,
    },
    ToolDescriptor {
        name: "pi-net-interfaces",
        aliases: &["pi.netInterfaces"],
        kind: ToolKind::NetInterfaces,
        description: "Network interfaces with MAC and addresses",
        input: InputShape::EMPTY,
    },
    ToolDescriptor {
        name: "pi-wifi-status",
        aliases: &["pi.wifiStatus"],
        kind: ToolKind::WifiStatus,
        description: "Wi-Fi interface, SSID, link quality and bitrate",
        input: InputShape::EMPTY,
    },
    ToolDescriptor {
        name: "pi-v4l2-formats",
        aliases: &["pi.v4l2Formats"],
        kind: ToolKind::V4l2Formats,
        description: "V4L2 pixel formats and discrete frame sizes per video device",
        input: InputShape::EMPTY,
    },
    ToolDescriptor {
        name: "pi-power",
        aliases: &["pi.power"],
        kind: ToolKind::Power,
        description: "Rail voltages and clock rates from vcgencmd",
        input: InputShape::EMPTY,
    },
    ToolDescriptor {
        name: "pi-services",
        aliases: &["pi.services"],
        kind: ToolKind::Services,
        description: "systemd service units and their state",
        input: InputShape::EMPTY,
    },
    ToolDescriptor {
        name: "pi-i2c-scan",
        aliases: &["pi.i2cScan"],
        kind: ToolKind::I2cScan,
        description: "Responding addresses on each I2C bus (i2cdetect)",
        input: InputShape::EMPTY,
    },
];

/// Canonical names of all built-in tools
pub const AVAILABLE_TOOLS: &[&str] = &[
    "pi-health",
    "pi-cpu-temp",
    "pi-system-info",
    "pi-capabilities",
    "pi-gpu-info",
    "pi-camera-info",
    "pi-usb-list",
    "pi-usb-watch",
    "pi-usb-tree",
    "pi-throttle-status",
    "pi-dmesg-tail",
    "pi-cpu-freq",
    "pi-thermal-zones",
    "pi-net-interfaces",
    "pi-wifi-status",
    "pi-v4l2-formats",
    "pi-power",
    "pi-services",
    "pi-i2c-scan",
];

/// Tool registry: canonical names plus an alias→canonical index
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    by_name: HashMap<&'static str, usize>,
    aliases: HashMap<&'static str, &'static str>,
}

impl ToolRegistry {
    /// Create a new tool registry with all built-in tools
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for tool in BUILTIN_TOOLS {
            registry.register(*tool);
        }
        registry
    }

    /// Registry with no tools
    pub fn empty() -> Self {
        Self {
            tools: Vec::new(),
            by_name: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Register a tool. A later registration under the same canonical name
    /// replaces the earlier one.
    pub fn register(&mut self, tool: ToolDescriptor) {
        match self.by_name.get(tool.name) {
            Some(&index) => self.tools[index] = tool,
            None => {
                self.by_name.insert(tool.name, self.tools.len());
                self.tools.push(tool);
            }
        }
        for &alias in tool.aliases {
            self.aliases.insert(alias, tool.name);
        }
    }

    /// Look up a tool by canonical name or alias. Matching is case-sensitive.
    pub fn resolve(&self, name: &str) -> Option<&ToolDescriptor> {
        let canonical = self.canonical_name(name)?;
        self.by_name.get(canonical).map(|&index| &self.tools[index])
    }

    /// Canonical name for `name`, if registered
    pub fn canonical_name(&self, name: &str) -> Option<&'static str> {
        if let Some((&canonical, _)) = self.by_name.get_key_value(name) {
            return Some(canonical);
        }
        self.aliases.get(name).copied()
    }

    /// Get all tool definitions, canonical names only
    pub fn definitions(&self) -> Vec<McpToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
