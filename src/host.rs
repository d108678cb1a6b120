//! Local host diagnostics
//!
//! Readers for the sysfs and devfs entries the local tools report on, and
//! parsers for what the helper binaries print. Every path hangs off
//! [`HostFs::root`], which is `/` outside of tests.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

const CPUFREQ_DIR: &str = "sys/devices/system/cpu/cpu0/cpufreq";
const THERMAL_DIR: &str = "sys/class/thermal";
const NET_DIR: &str = "sys/class/net";
const DEV_DIR: &str = "dev";

/// Rails queried with `vcgencmd measure_volts`
pub const VOLT_DOMAINS: &[&str] = &["core", "sdram_c", "sdram_i", "sdram_p"];

/// Clocks queried with `vcgencmd measure_clock`
pub const CLOCKS: &[&str] = &[
    "arm", "core", "h264", "isp", "v3d", "uart", "pwm", "emmc", "pixel", "hdmi",
];

static ESSID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"ESSID:"([^"]*)""#).expect("valid ESSID regex"));
static LINK_QUALITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Link Quality=(\d+)/(\d+)").expect("valid quality regex"));
static BIT_RATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Bit Rate[=:](\S+)").expect("valid bit rate regex"));
static PIXEL_FORMAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:Pixel Format:|\[\d+\]:)\s*'([^']+)'(?:\s*\(([^)]+)\))?")
        .expect("valid pixel format regex")
});
static FRAME_SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)x(\d+)").expect("valid frame size regex"));
static VOLT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"volt=([0-9.]+)V").expect("valid volt regex"));

/// Current and bounding frequency of cpu0
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuFreq {
    /// Current frequency
    pub cur_hz: Option<u64>,
    /// Scaling floor
    pub min_hz: Option<u64>,
    /// Scaling ceiling
    pub max_hz: Option<u64>,
    /// Scaling governor
    pub governor: Option<String>,
}

/// One `/sys/class/thermal/thermal_zone*` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalZone {
    /// Directory name, e.g. `thermal_zone0`
    pub zone: String,
    /// Contents of `type`
    #[serde(rename = "type")]
    pub zone_type: String,
    /// Temperature, if readable
    pub celsius: Option<f64>,
}

/// Address bound to an interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetAddress {
    /// `inet` or `inet6`
    pub family: String,
    /// Address without prefix length
    pub address: String,
}

/// Network interface summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetInterface {
    /// Interface name
    pub name: String,
    /// Link-layer address
    pub mac: Option<String>,
    /// Bound addresses
    pub addrs: Vec<NetAddress>,
}

/// Pixel format advertised by a V4L2 device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelFormat {
    /// FourCC code
    pub fourcc: String,
    /// Human-readable name
    pub description: Option<String>,
    /// Discrete frame sizes, `WxH`
    pub sizes: Vec<String>,
}

/// systemd service unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUnit {
    /// Unit name
    pub name: String,
    /// Load state
    pub load: String,
    /// High-level activation state
    pub active: String,
    /// Low-level state
    pub sub: String,
    /// Unit description
    pub description: String,
}

/// View of the host's sysfs and devfs
#[derive(Debug, Clone)]
pub struct HostFs {
    root: PathBuf,
}

impl Default for HostFs {
    fn default() -> Self {
        Self::new("/")
    }
}

impl HostFs {
    /// Host view rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Filesystem root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// cpu0 cpufreq values. Missing files read as `None`.
    pub async fn cpu_freq(&self) -> CpuFreq {
        let dir = self.root.join(CPUFREQ_DIR);
        let khz = |name: &'static str| {
            let path = dir.join(name);
            async move { read_trimmed(&path).await.and_then(|s| s.parse::<u64>().ok()) }
        };

        CpuFreq {
            cur_hz: khz("scaling_cur_freq").await.map(to_hz),
            min_hz: khz("scaling_min_freq").await.map(to_hz),
            max_hz: khz("scaling_max_freq").await.map(to_hz),
            governor: read_trimmed(&dir.join("scaling_governor")).await,
        }
    }

    /// All thermal zones, ordered by directory name
    pub async fn thermal_zones(&self) -> Vec<ThermalZone> {
        let dir = self.root.join(THERMAL_DIR);
        let mut zones = Vec::new();
        for name in list_dir(&dir, "thermal_zone").await {
            let zone_dir = dir.join(&name);
            let celsius = read_trimmed(&zone_dir.join("temp"))
                .await
                .and_then(|raw| raw.parse::<i64>().ok())
                .map(millidegrees_to_celsius);
            zones.push(ThermalZone {
                zone: name,
                zone_type: read_trimmed(&zone_dir.join("type")).await.unwrap_or_default(),
                celsius,
            });
        }
        zones
    }

    /// Interface names from `/sys/class/net`, sorted
    pub async fn net_interface_names(&self) -> Vec<String> {
        list_dir(&self.root.join(NET_DIR), "").await
    }

    /// Device nodes `/dev/<prefix>N`, sorted
    pub async fn device_nodes(&self, prefix: &str) -> Vec<PathBuf> {
        let dir = self.root.join(DEV_DIR);
        list_dir(&dir, prefix)
            .await
            .into_iter()
            .filter(|name| {
                let suffix = &name[prefix.len()..];
                !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit())
            })
            .map(|name| dir.join(name))
            .collect()
    }
}

async fn read_trimmed(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Some(text.trim().to_string()),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "unreadable host file");
            None
        }
    }
}

/// Entry names in `dir` starting with `prefix`, sorted. A missing directory
/// lists as empty.
async fn list_dir(dir: &Path, prefix: &str) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return names;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with(prefix) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    names
}

/// cpufreq reports kHz; anything already in the Hz range is kept
fn to_hz(value: u64) -> u64 {
    if value < 10_000_000 {
        value * 1000
    } else {
        value
    }
}

/// Thermal zones report millidegrees; small values are taken as degrees
fn millidegrees_to_celsius(raw: i64) -> f64 {
    if raw > 1000 {
        (raw as f64 / 100.0).round() / 10.0
    } else {
        raw as f64
    }
}

#[derive(Deserialize)]
struct IpLink {
    #[serde(default)]
    ifname: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    addr_info: Option<Vec<IpAddrInfo>>,
}

#[derive(Deserialize)]
struct IpAddrInfo {
    family: Option<String>,
    local: Option<String>,
}

/// Parse `ip -j addr` output
pub fn parse_ip_addr(output: &str) -> Result<Vec<NetInterface>, serde_json::Error> {
    let output = output.trim();
    let links: Vec<IpLink> = if output.is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(output)?
    };

    Ok(links
        .into_iter()
        .map(|link| NetInterface {
            name: link.ifname,
            mac: link.address,
            addrs: link
                .addr_info
                .unwrap_or_default()
                .into_iter()
                .filter_map(|a| {
                    Some(NetAddress {
                        family: a.family?,
                        address: a.local?,
                    })
                })
                .collect(),
        })
        .collect())
}

/// Interface and SSID from `iwgetid` output, e.g. `wlan0  ESSID:"home"`
pub fn parse_iwgetid(output: &str) -> (String, String) {
    let line = output.lines().next().unwrap_or("").trim();
    let iface = line.split_whitespace().next().unwrap_or("").to_string();
    let ssid = ESSID_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    (iface, ssid)
}

/// Link quality (percent) and bit rate from `iwconfig <iface>` output
pub fn parse_iwconfig(output: &str) -> (Option<u32>, Option<String>) {
    let quality = LINK_QUALITY_RE.captures(output).and_then(|c| {
        let num: f64 = c.get(1)?.as_str().parse().ok()?;
        let den: f64 = c.get(2)?.as_str().parse().ok()?;
        Some((num / den.max(1.0) * 100.0).round() as u32)
    });
    let bitrate = BIT_RATE_RE
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    (quality, bitrate)
}

/// Formats and discrete sizes from `v4l2-ctl --list-formats-ext`
pub fn parse_v4l2_formats(output: &str) -> Vec<PixelFormat> {
    let mut formats: Vec<PixelFormat> = Vec::new();
    for line in output.lines().map(str::trim) {
        if let Some(caps) = PIXEL_FORMAT_RE.captures(line) {
            formats.push(PixelFormat {
                fourcc: caps[1].to_string(),
                description: caps.get(2).map(|m| m.as_str().to_string()),
                sizes: Vec::new(),
            });
        } else if let Some(rest) = line.strip_prefix("Pixel Format:") {
            formats.push(PixelFormat {
                fourcc: rest.trim().to_string(),
                description: None,
                sizes: Vec::new(),
            });
        } else if line.starts_with("Size:") && line.contains("Discrete") {
            if let (Some(format), Some(caps)) = (formats.last_mut(), FRAME_SIZE_RE.captures(line)) {
                format.sizes.push(format!("{}x{}", &caps[1], &caps[2]));
            }
        }
    }
    formats
}

/// Units from `systemctl list-units --type=service --all --no-legend`
pub fn parse_systemctl_units(output: &str) -> Vec<ServiceUnit> {
    output
        .lines()
        .filter_map(|line| {
            // Failed units are prefixed with a status bullet
            let line = line.trim().trim_start_matches('●').trim_start();
            let mut cols = line.split_whitespace();
            let name = cols.next()?.to_string();
            let load = cols.next().unwrap_or_default().to_string();
            let active = cols.next().unwrap_or_default().to_string();
            let sub = cols.next().unwrap_or_default().to_string();
            let description = cols.collect::<Vec<_>>().join(" ");
            Some(ServiceUnit {
                name,
                load,
                active,
                sub,
                description,
            })
        })
        .collect()
}

/// Responding addresses from an `i2cdetect -y N` grid, lowercase and sorted.
/// `UU` (claimed by a driver) and `--` cells are skipped.
pub fn parse_i2cdetect(output: &str) -> Vec<String> {
    let mut addrs: Vec<String> = output
        .lines()
        .filter_map(|line| line.trim().split_once(':'))
        .flat_map(|(_, cells)| cells.split_whitespace())
        .filter(|cell| cell.len() == 2 && cell.bytes().all(|b| b.is_ascii_hexdigit()))
        .map(str::to_ascii_lowercase)
        .collect();
    addrs.sort();
    addrs
}

/// Volts from `vcgencmd measure_volts`, e.g. `volt=0.8600V`
pub fn parse_measure_volts(output: &str) -> Option<f64> {
    VOLT_RE
        .captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Hz from `vcgencmd measure_clock`, e.g. `frequency(48)=1500398464`
pub fn parse_measure_clock(output: &str) -> Option<u64> {
    output.trim().rsplit('=').next()?.trim().parse().ok()
}
