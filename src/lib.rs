//! inspector-raspi: Raspberry Pi diagnostics over MCP
//!
//! This crate provides an MCP (Model Context Protocol) stdio server that
//! exposes read-only diagnostics of a single-board computer (health, CPU
//! temperature, capabilities, GPU, camera, USB hot-plug, network, power)
//! to AI coding assistants. Most data comes from the local inspector HTTP
//! API on a loopback port; the rest is read from sysfs or from local helper
//! binaries.
//!
//! # Architecture
//!
//! ```text
//! stdin ──▶ StdioTransport ──▶ McpServer ──▶ Dispatcher ──▶ ToolRegistry
//!                ▲                                │
//!                │               ┌────────────┬───────┴────┬────────────┐
//!                │               ▼            ▼            ▼            ▼
//! stdout ◀───────┘         ProbeCache     UsbWatch   BackendClient    HostFs
//!                          (TTL, cmds)    (diffs)   (127.0.0.1 GET)  (sysfs)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use inspector_raspi::config::{ConfigOverrides, ServerConfig};
//! use inspector_raspi::mcp::{McpServer, StdioTransport};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::from_env(ConfigOverrides::default())?;
//!     let mut server = McpServer::from_config(&config)?;
//!     server.run(&mut StdioTransport::stdio()).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backend;
pub mod config;
pub mod error;
pub mod host;
pub mod mcp;
pub mod probe;
pub mod usb;

// Re-exports for convenience
pub use backend::BackendClient;
pub use config::{ConfigOverrides, ServerConfig};
pub use error::{Error, Result};
pub use mcp::{Dispatcher, McpServer, McpTool};
pub use host::HostFs;
pub use probe::{CommandRunner, ProbeCache, SystemCommands};
pub use usb::{UsbWatch, UsbWatchReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
